// src/packet_queue.rs - Blocking FIFO handoff between encoder threads and the sender
//
// Core features:
// - Strict FIFO ordering across any number of producer threads
// - Working-state gating: a stopped queue drops pushed items instead of keeping them
// - Blocking pop that wakes within one cycle of set_working(false)
// - Drain on shutdown so unsent items never outlive the pipeline

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

struct Inner<T> {
    items: VecDeque<T>,
    working: bool,
}

/// Thread-safe FIFO decoupling bursty producers from a single network-bound
/// consumer.
///
/// Items are move-only: pushed in, popped out, and dropped exactly once —
/// either by the consumer after transmission or by the queue itself when the
/// item arrives while the queue is stopped or is still pending at
/// [`drain`](PacketQueue::drain) time.
///
/// None of the operations fail. Pushing onto a stopped queue silently drops
/// the item: late packets after stop are meaningless.
pub struct PacketQueue<T> {
    inner: Mutex<Inner<T>>,
    available: Condvar,
}

impl<T> PacketQueue<T> {
    /// Creates a queue in the stopped state. Items pushed before
    /// [`set_working(true)`](PacketQueue::set_working) are dropped.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(64),
                working: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Enqueues an item and wakes one waiting consumer, or drops the item if
    /// the queue is not working. Safe to call from any number of threads.
    pub fn push(&self, item: T) {
        let mut inner = self.inner.lock();
        if inner.working {
            inner.items.push_back(item);
            self.available.notify_one();
        }
        // Not working: `item` falls out of scope here and is released.
    }

    /// Removes and returns the front item, blocking while the queue is
    /// working but empty.
    ///
    /// Returns `None` only once the queue has been stopped and no item is
    /// left; this is how the sender loop observes shutdown.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        while inner.working && inner.items.is_empty() {
            self.available.wait(&mut inner);
        }
        inner.items.pop_front()
    }

    /// Toggles the working state and wakes every waiter. Transitioning to
    /// not-working unblocks any pending [`pop`](PacketQueue::pop) immediately.
    pub fn set_working(&self, working: bool) {
        let mut inner = self.inner.lock();
        inner.working = working;
        self.available.notify_all();
    }

    /// Removes and drops every queued item. Used on shutdown so packet
    /// payloads that were never sent do not outlive the session.
    pub fn drain(&self) {
        let mut inner = self.inner.lock();
        inner.items.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }
}

impl<T> Default for PacketQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
