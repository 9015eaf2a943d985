// src/packet.rs - Container packet flowing through the queue
//
// A `MediaPacket` owns its framed payload exclusively from creation until it
// is either sent by the sender thread or dropped by the queue's drain path.
// "Discard" and "send-then-free" share the same code path: `Drop`.

use bytes::Bytes;

/// RTMP chunk stream id used for video packets.
pub const VIDEO_CHANNEL_ID: u8 = 0x10;
/// RTMP chunk stream id used for audio packets.
pub const AUDIO_CHANNEL_ID: u8 = 0x11;

/// Which elementary stream a packet belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Track {
    Audio,
    Video,
}

/// Packet timestamp, relative to session start.
///
/// Media packets are created before the sender knows the session clock, so
/// they carry [`Timestamp::AtSend`] and the sender resolves it to
/// "now minus session origin" just before transmission. Configuration packets
/// carry an explicit zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    /// Resolve to the current relative session time at send.
    AtSend,
    /// Explicit relative time in milliseconds from session start.
    Millis(u32),
}

/// One wire-ready container packet.
///
/// The payload is the fully framed FLV tag body (see [`crate::video`] and
/// [`crate::audio`] for the framing layouts); everything else is out-of-band
/// metadata consumed by the transport when the packet is sent.
#[derive(Debug)]
pub struct MediaPacket {
    pub track: Track,
    /// Codec configuration (sequence header) rather than frame data.
    pub is_config: bool,
    pub timestamp: Timestamp,
    /// Transport-level channel id distinguishing the two streams.
    pub channel_id: u8,
    /// Hint that the transport should use its largest header format.
    pub large_header: bool,
    pub payload: Bytes,
}

impl MediaPacket {
    /// A video codec configuration packet (timestamp pinned to zero).
    pub fn video_config(payload: Bytes) -> Self {
        Self {
            track: Track::Video,
            is_config: true,
            timestamp: Timestamp::Millis(0),
            channel_id: VIDEO_CHANNEL_ID,
            large_header: true,
            payload,
        }
    }

    /// A video frame packet, stamped at send time.
    pub fn video_frame(payload: Bytes) -> Self {
        Self {
            track: Track::Video,
            is_config: false,
            timestamp: Timestamp::AtSend,
            channel_id: VIDEO_CHANNEL_ID,
            large_header: true,
            payload,
        }
    }

    /// An audio codec configuration packet (timestamp pinned to zero).
    pub fn audio_config(payload: Bytes) -> Self {
        Self {
            track: Track::Audio,
            is_config: true,
            timestamp: Timestamp::Millis(0),
            channel_id: AUDIO_CHANNEL_ID,
            large_header: true,
            payload,
        }
    }

    /// An audio frame packet, stamped at send time.
    pub fn audio_frame(payload: Bytes) -> Self {
        Self {
            track: Track::Audio,
            is_config: false,
            timestamp: Timestamp::AtSend,
            channel_id: AUDIO_CHANNEL_ID,
            large_header: true,
            payload,
        }
    }
}
