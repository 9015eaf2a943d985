use thiserror::Error;

/// Error type shared across the push pipeline and its collaborator traits.
///
/// Failures are handled close to where they occur: packetizers and the push
/// controller log and transition state rather than propagating errors across
/// the queue boundary. `Error` therefore only surfaces where the caller
/// initiated the operation (`configure`, `connect`, `send`) or through the
/// collaborator traits in [`crate::encoder`] and [`crate::transport`].
#[derive(Error, Debug)]
pub enum Error {
    /// The video encoder rejected its settings or failed to open.
    #[error("failed to open video encoder: {0}")]
    VideoEncoderOpen(String),

    /// The audio encoder rejected its settings or failed to open.
    #[error("failed to open audio encoder: {0}")]
    AudioEncoderOpen(String),

    /// A single encode call failed. The call is a no-op; no packet is emitted.
    #[error("encode failed: {0}")]
    Encode(String),

    /// Session establishment failed at some sub-step. The start attempt is
    /// aborted and the controller returns to idle.
    #[error("connect failed: {0}")]
    Connect(String),

    /// A mid-stream send failed. Fatal for the current session.
    #[error("send failed: {0}")]
    Send(String),
}

pub type Result<T> = std::result::Result<T, Error>;
