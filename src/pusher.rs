// src/pusher.rs - Push controller
//
// Owns the connection lifecycle and the single sender thread. State machine:
// Idle -> Connecting -> Streaming -> Stopping -> Idle. Packets flow from the
// packetizers through the shared queue to the sender, which resolves
// at-send timestamps against the session origin and transmits in FIFO order.

use crate::audio::AudioPacketizer;
use crate::packet::{MediaPacket, Timestamp};
use crate::packet_queue::PacketQueue;
use crate::transport::{Connector, PacketMeta};
use crossbeam_channel::{Receiver, Sender};
use log::{debug, error, info};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Session establishment timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Lifecycle events are lossy past this backlog.
const EVENT_CAPACITY: usize = 64;

/// Controller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushState {
    /// No session; the queue is not working.
    Idle,
    /// The sender thread is establishing the session.
    Connecting,
    /// Connected; the sender loop is consuming the queue.
    Streaming,
    /// Tearing down: draining the queue and closing the session.
    Stopping,
}

/// Lifecycle notification, observable via [`Pusher::events`]. Diagnostic
/// only: the authoritative failure signal is the state returning to
/// [`PushState::Idle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushEvent {
    Connected,
    ConnectFailed,
    /// A mid-stream send failed; the session is being torn down.
    Disconnected,
    Stopped,
}

struct Shared {
    state: Mutex<PushState>,
    queue: Arc<PacketQueue<MediaPacket>>,
    audio: Arc<AudioPacketizer>,
    connector: Box<dyn Connector>,
    /// Fast-path flag the sender loop polls between packets.
    streaming: AtomicBool,
    /// Set by `stop` so a stop that races the connection attempt still wins.
    stop_requested: AtomicBool,
    events: Sender<PushEvent>,
}

/// The push controller.
///
/// `start` and `stop` are safe to call from any thread. The session handle
/// never leaves the sender thread; control calls communicate with it only
/// through flags and the queue's working state.
pub struct Pusher {
    shared: Arc<Shared>,
    events_rx: Receiver<PushEvent>,
    sender_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Pusher {
    /// Wires the controller to the queue the packetizers feed and to the
    /// audio packetizer whose configuration packet is re-sent at stream start.
    pub fn new(
        connector: Box<dyn Connector>,
        queue: Arc<PacketQueue<MediaPacket>>,
        audio: Arc<AudioPacketizer>,
    ) -> Self {
        let (events, events_rx) = crossbeam_channel::bounded(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(PushState::Idle),
                queue,
                audio,
                connector,
                streaming: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
                events,
            }),
            events_rx,
            sender_thread: Mutex::new(None),
        }
    }

    /// Spawns the sender thread and begins connecting to `url`. A no-op
    /// unless the controller is idle.
    pub fn start(&self, url: &str) {
        {
            let mut state = self.shared.state.lock();
            if *state != PushState::Idle {
                debug!("start ignored: pusher is {:?}", *state);
                return;
            }
            // Reset under the state lock so a concurrent stop() cannot be lost
            // between the guard check and the spawn.
            self.shared.stop_requested.store(false, Ordering::Release);
            *state = PushState::Connecting;
        }

        let shared = self.shared.clone();
        let url = url.to_owned();
        let result = std::thread::Builder::new()
            .name("push-sender".to_string())
            .spawn(move || sender_task(shared, url));
        match result {
            Ok(handle) => {
                // A previous handle here belongs to a finished session; joining
                // it cannot block.
                if let Some(old) = self.sender_thread.lock().replace(handle) {
                    let _ = old.join();
                }
            }
            Err(e) => {
                error!("failed to spawn sender thread: {e}");
                *self.shared.state.lock() = PushState::Idle;
            }
        }
    }

    /// Requests teardown. Takes effect within one queue wake: the sender
    /// thread drains the queue, closes the session and returns the controller
    /// to idle. Never blocks on the sender thread; a no-op while idle.
    pub fn stop(&self) {
        if *self.shared.state.lock() == PushState::Idle {
            return;
        }
        self.shared.stop_requested.store(true, Ordering::Release);
        self.shared.streaming.store(false, Ordering::Release);
        self.shared.queue.set_working(false);
    }

    pub fn state(&self) -> PushState {
        *self.shared.state.lock()
    }

    pub fn is_streaming(&self) -> bool {
        self.shared.streaming.load(Ordering::Acquire)
    }

    /// Lifecycle event stream. Events are lossy under backlog; poll
    /// [`state`](Pusher::state) for the authoritative view.
    pub fn events(&self) -> Receiver<PushEvent> {
        self.events_rx.clone()
    }
}

impl Drop for Pusher {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.sender_thread.lock().take() {
            let _ = handle.join();
        }
    }
}

fn sender_task(shared: Arc<Shared>, url: String) {
    info!("connecting to {url}");
    let mut session = match shared.connector.connect(&url, CONNECT_TIMEOUT) {
        Ok(session) => session,
        Err(e) => {
            error!("start aborted: {e}");
            let _ = shared.events.try_send(PushEvent::ConnectFailed);
            *shared.state.lock() = PushState::Idle;
            return;
        }
    };

    if shared.stop_requested.load(Ordering::Acquire) {
        // stop() raced the connection attempt; never enter Streaming.
        *shared.state.lock() = PushState::Idle;
        let _ = shared.events.try_send(PushEvent::Stopped);
        return;
    }

    // Timestamp origin for every at-send packet of this session.
    let origin = Instant::now();

    // The queue must be working before anything signals Streaming, or a
    // producer observing the state could still have its packets discarded.
    shared.queue.set_working(true);

    // Audio may have been configured and encoding before the connection was
    // ready; its sequence header goes out ahead of anything in flight.
    if let Some(packet) = shared.audio.config_packet() {
        shared.queue.push(packet);
    }

    *shared.state.lock() = PushState::Streaming;
    shared.streaming.store(true, Ordering::Release);

    // A stop landing between the check above and these stores would have its
    // flag writes overwritten; re-check so that interleaving still tears down
    // within one cycle instead of leaving the loop parked in pop.
    if shared.stop_requested.load(Ordering::Acquire) {
        shared.streaming.store(false, Ordering::Release);
    } else {
        let _ = shared.events.try_send(PushEvent::Connected);
        info!("streaming started");
    }

    while shared.streaming.load(Ordering::Acquire) {
        let Some(packet) = shared.queue.pop() else {
            break;
        };
        if !shared.streaming.load(Ordering::Acquire) {
            // Stop arrived while waiting; the packet is dropped with the rest
            // of the backlog.
            break;
        }

        let timestamp_ms = match packet.timestamp {
            Timestamp::AtSend => origin.elapsed().as_millis() as u32,
            Timestamp::Millis(ms) => ms,
        };
        let meta = PacketMeta {
            track: packet.track,
            channel_id: packet.channel_id,
            timestamp_ms,
            is_config: packet.is_config,
            large_header: packet.large_header,
        };
        if let Err(e) = session.send(&packet.payload, &meta) {
            error!("send failed, tearing down session: {e}");
            let _ = shared.events.try_send(PushEvent::Disconnected);
            break;
        }
        // Sent packet dropped here; drained packets take the same path.
    }

    *shared.state.lock() = PushState::Stopping;
    shared.streaming.store(false, Ordering::Release);
    shared.queue.set_working(false);
    shared.queue.drain();
    drop(session);
    *shared.state.lock() = PushState::Idle;
    let _ = shared.events.try_send(PushEvent::Stopped);
    info!("streaming stopped");
}
