// src/transport.rs - Collaborator contract for the streaming session layer
//
// The pipeline treats the transport as opaque: connect, send one packet,
// close. Handshakes, URL parsing and keep-alive live behind `Connector`.

use crate::error::Result;
use crate::packet::Track;
use std::time::Duration;

/// Out-of-band metadata accompanying one packet body on the wire. Nothing in
/// here is serialized into the payload; the transport maps it onto its own
/// message headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketMeta {
    pub track: Track,
    /// Transport channel id distinguishing the two streams.
    pub channel_id: u8,
    /// Relative timestamp in milliseconds from session start; 0 for
    /// configuration packets.
    pub timestamp_ms: u32,
    pub is_config: bool,
    /// Hint that the transport should use its largest header format.
    pub large_header: bool,
}

/// Establishes sessions to a remote ingest endpoint.
///
/// `connect` performs the whole establishment sequence (resolve, handshake,
/// stream binding) bounded by `timeout`; a failure at any sub-step surfaces as
/// one [`Error::Connect`](crate::error::Error::Connect) with nothing left
/// behind.
pub trait Connector: Send + Sync {
    fn connect(&self, url: &str, timeout: Duration) -> Result<Box<dyn Session>>;
}

/// One established session, owned exclusively by the sender thread.
///
/// Packets arrive strictly in queue order. Dropping the session closes it;
/// there is no separate close call.
pub trait Session: Send {
    fn send(&mut self, body: &[u8], meta: &PacketMeta) -> Result<()>;
}
