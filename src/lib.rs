//! **rtmp-pusher** is the real-time delivery pipeline of a live-streaming
//! pusher: it drives external audio/video encoders, frames their output into
//! wire-ready RTMP/FLV tag bodies, and ships the packets over a persistent
//! session in capture order with bounded latency.
//!
//! # Architecture
//!
//! ```text
//! capture threads          sender thread
//!       |                        |
//!  VideoPacketizer --\           |
//!                     +--> PacketQueue --> Pusher --> Session
//!  AudioPacketizer --/    (FIFO, blocking)
//! ```
//!
//! ## Key Components
//!
//! - [`PacketQueue`]: thread-safe FIFO handoff between the producer encoder
//!   threads and the single sender thread, with working-state gating, drain
//!   and discard-on-stop semantics
//! - [`VideoPacketizer`] / [`AudioPacketizer`]: convert raw frame/sample
//!   buffers into encoder input and encoder output into container packets
//!   (sequence headers vs. frame payloads, key-frame tagging)
//! - [`Pusher`]: the push state machine (`Idle -> Connecting -> Streaming ->
//!   Stopping`) owning connection lifecycle, ordered emission and shutdown
//!
//! The encoders and the transport are collaborators injected behind the
//! traits in [`encoder`] and [`transport`]; the pipeline itself never touches
//! a codec library or a socket.
//!
//! # Ordering guarantees
//!
//! The queue is strictly FIFO and each packetizer enqueues a track's
//! configuration packet before its media packet for the same encode call, so
//! every receiver sees configuration before media per track, in submission
//! order across tracks.
//!
//! # Example
//!
//! ```rust,ignore
//! let queue = Arc::new(PacketQueue::new());
//! let video = VideoPacketizer::new(queue.clone(), Box::new(X264Opener));
//! let audio = Arc::new(AudioPacketizer::new(queue.clone(), Box::new(FaacOpener)));
//!
//! video.configure(VideoConfig::new(640, 480, 20, 800_000))?;
//! audio.configure(44_100, 2)?;
//!
//! let pusher = Pusher::new(Box::new(LibRtmpConnector), queue, audio.clone());
//! pusher.start("rtmp://ingest.example.com/live/stream-key");
//!
//! // capture threads:
//! video.encode(&nv21_frame);
//! audio.encode(&sample_block);
//!
//! pusher.stop();
//! ```

pub mod audio;
pub mod encoder;
pub mod error;
pub mod packet;
pub mod packet_queue;
pub mod pusher;
pub mod transport;
pub mod video;

pub use audio::AudioPacketizer;
pub use error::{Error, Result};
pub use packet::{MediaPacket, Timestamp, Track};
pub use packet_queue::PacketQueue;
pub use pusher::{PushEvent, PushState, Pusher};
pub use video::{VideoConfig, VideoPacketizer};
