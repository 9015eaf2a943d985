// src/video.rs - Video packetizer
//
// Bridges raw NV21 frame buffers to the external video encoder and translates
// its coded units into container packets:
// - SPS + PPS pairs become one configuration packet (sent with each key frame,
//   since the encoder repeats headers)
// - every other unit becomes one media packet, start code stripped

use crate::encoder::{CodedUnitKind, PlanarImage, VideoEncoder, VideoEncoderOpener, VideoEncoderSettings};
use crate::error::Result;
use crate::packet::MediaPacket;
use crate::packet_queue::PacketQueue;
use bytes::{BufMut, Bytes, BytesMut};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;

const KEY_FRAME_TAG: u8 = 0x17;
const INTER_FRAME_TAG: u8 = 0x27;

/// User-facing video configuration. Everything not set explicitly is derived
/// in [`resolve`](VideoConfig::resolve).
#[derive(Debug, Clone)]
pub struct VideoConfig {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    /// Target bitrate in bits per second.
    pub bitrate: u32,
    /// Frames between key frames; defaults to one key frame every 2 seconds.
    pub keyframe_interval: Option<u32>,
    /// Instantaneous bitrate ceiling; defaults to 1.2x the target.
    pub max_bitrate: Option<u32>,
}

impl VideoConfig {
    pub fn new(width: u32, height: u32, frame_rate: u32, bitrate: u32) -> Self {
        Self {
            width,
            height,
            frame_rate,
            bitrate,
            keyframe_interval: None,
            max_bitrate: None,
        }
    }

    pub fn keyframe_interval(mut self, frames: u32) -> Self {
        self.keyframe_interval = Some(frames);
        self
    }

    pub fn max_bitrate(mut self, bits_per_second: u32) -> Self {
        self.max_bitrate = Some(bits_per_second);
        self
    }

    /// Resolves the defaults into concrete encoder settings. The fixed fields
    /// bound latency and ordering: no B-frames (nothing to reorder on either
    /// end), one encoding thread (output stays in submission order), repeated
    /// headers (every key frame re-carries SPS/PPS).
    fn resolve(&self) -> VideoEncoderSettings {
        VideoEncoderSettings {
            width: self.width,
            height: self.height,
            frame_rate: self.frame_rate,
            bitrate: self.bitrate,
            max_bitrate: self
                .max_bitrate
                .unwrap_or((self.bitrate as u64 * 12 / 10) as u32),
            vbv_buffer: self.bitrate,
            keyframe_interval: self.keyframe_interval.unwrap_or(self.frame_rate * 2),
            bframes: 0,
            threads: 1,
            repeat_headers: true,
        }
    }
}

struct Inner {
    encoder: Option<Box<dyn VideoEncoder>>,
    picture: Option<PlanarImage>,
}

/// Converts raw captured frames into container video packets.
///
/// One mutex serializes [`configure`](VideoPacketizer::configure) and
/// [`encode`](VideoPacketizer::encode); the encoder handle and the reusable
/// input picture are owned exclusively behind it. Packets are handed to the
/// queue injected at construction.
pub struct VideoPacketizer {
    queue: Arc<PacketQueue<MediaPacket>>,
    opener: Box<dyn VideoEncoderOpener>,
    inner: Mutex<Inner>,
}

impl VideoPacketizer {
    pub fn new(queue: Arc<PacketQueue<MediaPacket>>, opener: Box<dyn VideoEncoderOpener>) -> Self {
        Self {
            queue,
            opener,
            inner: Mutex::new(Inner {
                encoder: None,
                picture: None,
            }),
        }
    }

    /// (Re)opens the video encoder. Any previous encoder instance is torn
    /// down first, so repeated configuration fully supersedes the earlier one.
    ///
    /// On failure the packetizer is left without an encoder and
    /// [`encode`](VideoPacketizer::encode) calls are no-ops until a later
    /// `configure` succeeds.
    pub fn configure(&self, config: VideoConfig) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.encoder = None;
        inner.picture = None;

        let settings = config.resolve();
        match self.opener.open(&settings) {
            Ok(encoder) => {
                inner.picture = Some(PlanarImage::new(settings.width, settings.height));
                inner.encoder = Some(encoder);
                info!(
                    "video encoder opened: {}x{} @{}fps, {}bps (max {}bps), keyint {}",
                    settings.width,
                    settings.height,
                    settings.frame_rate,
                    settings.bitrate,
                    settings.max_bitrate,
                    settings.keyframe_interval
                );
                Ok(())
            }
            Err(e) => {
                error!("video encoder open failed: {e}");
                Err(e)
            }
        }
    }

    /// Encodes one NV21 frame and enqueues the resulting packets.
    ///
    /// A failed encode call emits nothing and leaves no state behind; the
    /// next frame starts clean.
    pub fn encode(&self, nv21: &[u8]) {
        let mut inner = self.inner.lock();
        let Inner { encoder, picture } = &mut *inner;
        let (Some(encoder), Some(picture)) = (encoder.as_mut(), picture.as_mut()) else {
            debug!("video frame dropped: encoder not configured");
            return;
        };

        if nv21.len() < picture.nv21_len() {
            warn!(
                "video frame dropped: {} bytes, expected {}",
                nv21.len(),
                picture.nv21_len()
            );
            return;
        }
        picture.load_nv21(nv21);

        let units = match encoder.encode(picture) {
            Ok(units) => units,
            Err(e) => {
                warn!("video encode failed: {e}");
                return;
            }
        };

        // SPS and PPS arrive as separate units; the configuration packet needs
        // both, so the SPS is held until its PPS follows.
        let mut pending_sps: Option<Bytes> = None;
        for unit in units {
            let payload = strip_start_code(&unit.data);
            match unit.kind {
                CodedUnitKind::SequenceParameterSet => {
                    pending_sps = Some(payload);
                }
                CodedUnitKind::PictureParameterSet => match pending_sps.take() {
                    Some(sps) if sps.len() >= 4 => {
                        let body = build_sequence_header(&sps, &payload);
                        self.queue.push(MediaPacket::video_config(body));
                    }
                    Some(sps) => {
                        warn!("sequence header dropped: SPS too short ({} bytes)", sps.len());
                    }
                    None => {
                        warn!("sequence header dropped: PPS without a preceding SPS");
                    }
                },
                CodedUnitKind::KeyFrame => {
                    let body = build_frame_body(KEY_FRAME_TAG, &payload);
                    self.queue.push(MediaPacket::video_frame(body));
                }
                CodedUnitKind::InterFrame => {
                    let body = build_frame_body(INTER_FRAME_TAG, &payload);
                    self.queue.push(MediaPacket::video_frame(body));
                }
            }
        }
    }
}

/// Strips a leading Annex B start code (`00 00 01` or `00 00 00 01`) if
/// present. Zero-copy: the result is a slice of the input.
pub fn strip_start_code(data: &Bytes) -> Bytes {
    if data.len() >= 4 && data[..4] == [0x00, 0x00, 0x00, 0x01] {
        data.slice(4..)
    } else if data.len() >= 3 && data[..3] == [0x00, 0x00, 0x01] {
        data.slice(3..)
    } else {
        data.clone()
    }
}

/// AVC sequence header tag body:
/// `17 00 00 00 00 | 01 profile compat level FF E1 | sps_len sps | 01 pps_len pps`.
/// Profile, compatibility and level are the first three bytes of the SPS after
/// its NAL header byte.
fn build_sequence_header(sps: &[u8], pps: &[u8]) -> Bytes {
    let mut body = BytesMut::with_capacity(16 + sps.len() + pps.len());
    body.put_u8(KEY_FRAME_TAG);
    body.put_u8(0x00); // 0: sequence header, not frame data
    body.put_bytes(0x00, 3); // composition time
    body.put_u8(0x01); // configuration record version
    body.put_u8(sps[1]);
    body.put_u8(sps[2]);
    body.put_u8(sps[3]);
    body.put_u8(0xFF); // 4-byte NAL length fields
    body.put_u8(0xE1); // one SPS follows
    body.put_u16(sps.len() as u16);
    body.put_slice(sps);
    body.put_u8(0x01); // one PPS follows
    body.put_u16(pps.len() as u16);
    body.put_slice(pps);
    body.freeze()
}

/// Video frame tag body:
/// `[17|27] 01 00 00 00 | payload_len:u32 | payload` (start code stripped).
fn build_frame_body(frame_tag: u8, payload: &[u8]) -> Bytes {
    let mut body = BytesMut::with_capacity(9 + payload.len());
    body.put_u8(frame_tag);
    body.put_u8(0x01); // 1: frame data, not sequence header
    body.put_bytes(0x00, 3); // composition time
    body.put_u32(payload.len() as u32);
    body.put_slice(payload);
    body.freeze()
}
