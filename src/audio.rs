// src/audio.rs - Audio packetizer
//
// Mirror of the video packetizer for the audio elementary stream. One
// deliberate asymmetry: the configuration packet is re-sent ahead of every
// media packet instead of being cached per session. That costs a few bytes per
// frame and removes every first-packet-timing edge case around late joins and
// audio that starts before the connection is up.

use crate::encoder::{AudioEncoder, AudioEncoderOpener, AudioEncoderSettings};
use crate::error::Result;
use crate::packet::MediaPacket;
use crate::packet_queue::PacketQueue;
use bytes::{BufMut, Bytes, BytesMut};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;

const STEREO_TAG: u8 = 0xAF;
const MONO_TAG: u8 = 0xAE;

struct Inner {
    encoder: Option<Box<dyn AudioEncoder>>,
    channels: u8,
    /// Reusable output buffer, sized to the encoder's max output at open time.
    out_buf: Vec<u8>,
}

/// Converts raw PCM sample blocks into container audio packets.
///
/// One mutex serializes [`configure`](AudioPacketizer::configure) and
/// [`encode`](AudioPacketizer::encode). Packets are handed to the queue
/// injected at construction.
pub struct AudioPacketizer {
    queue: Arc<PacketQueue<MediaPacket>>,
    opener: Box<dyn AudioEncoderOpener>,
    inner: Mutex<Inner>,
}

impl AudioPacketizer {
    pub fn new(queue: Arc<PacketQueue<MediaPacket>>, opener: Box<dyn AudioEncoderOpener>) -> Self {
        Self {
            queue,
            opener,
            inner: Mutex::new(Inner {
                encoder: None,
                channels: 0,
                out_buf: Vec::new(),
            }),
        }
    }

    /// (Re)opens the audio encoder: 16-bit input samples, raw headerless
    /// output, noise shaping on. Allocates the reusable output buffer at the
    /// encoder's reported maximum output size.
    pub fn configure(&self, sample_rate: u32, channels: u8) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.encoder = None;

        let settings = AudioEncoderSettings {
            sample_rate,
            channels,
            sample_bits: 16,
            raw_output: true,
            noise_shaping: true,
        };
        match self.opener.open(&settings) {
            Ok(encoder) => {
                info!(
                    "audio encoder opened: {}Hz, {} channel(s), {} samples per block",
                    sample_rate,
                    channels,
                    encoder.input_samples()
                );
                inner.out_buf = vec![0; encoder.max_output_bytes()];
                inner.channels = channels;
                inner.encoder = Some(encoder);
                Ok(())
            }
            Err(e) => {
                error!("audio encoder open failed: {e}");
                Err(e)
            }
        }
    }

    /// Samples required per [`encode`](AudioPacketizer::encode) call, or
    /// `None` before a successful [`configure`](AudioPacketizer::configure).
    /// The capture side buffers raw PCM up to exactly this size.
    pub fn input_samples(&self) -> Option<usize> {
        self.inner
            .lock()
            .encoder
            .as_ref()
            .map(|encoder| encoder.input_samples())
    }

    /// The current audio configuration packet, or `None` before a successful
    /// [`configure`](AudioPacketizer::configure).
    ///
    /// The push controller enqueues this once at stream start, covering audio
    /// that began encoding before the connection was ready.
    pub fn config_packet(&self) -> Option<MediaPacket> {
        let inner = self.inner.lock();
        let encoder = inner.encoder.as_ref()?;
        Some(MediaPacket::audio_config(build_config_body(
            inner.channels,
            &encoder.decoder_specific_info(),
        )))
    }

    /// Encodes one sample block and enqueues the resulting packets: the
    /// configuration packet, then exactly one media packet.
    ///
    /// The block must be exactly the encoder's required input size; anything
    /// else is logged and dropped. An encode that produces no output bytes
    /// emits nothing.
    pub fn encode(&self, samples: &[i16]) {
        let mut inner = self.inner.lock();
        let Inner {
            encoder,
            channels,
            out_buf,
        } = &mut *inner;
        let Some(encoder) = encoder.as_mut() else {
            debug!("audio block dropped: encoder not configured");
            return;
        };

        if samples.len() != encoder.input_samples() {
            warn!(
                "audio block dropped: {} samples, expected {}",
                samples.len(),
                encoder.input_samples()
            );
            return;
        }

        let written = match encoder.encode(samples, out_buf) {
            Ok(written) => written,
            Err(e) => {
                warn!("audio encode failed: {e}");
                return;
            }
        };
        if written == 0 {
            // Encoder buffered the input; nothing to packetize this call.
            return;
        }

        let config = build_config_body(*channels, &encoder.decoder_specific_info());
        self.queue.push(MediaPacket::audio_config(config));

        let media = build_media_body(*channels, &out_buf[..written]);
        self.queue.push(MediaPacket::audio_frame(media));
    }
}

fn channel_tag(channels: u8) -> u8 {
    if channels == 1 {
        MONO_TAG
    } else {
        STEREO_TAG
    }
}

/// Audio sequence header tag body: `[AF|AE] 00 | decoder-specific-info`.
fn build_config_body(channels: u8, decoder_info: &[u8]) -> Bytes {
    let mut body = BytesMut::with_capacity(2 + decoder_info.len());
    body.put_u8(channel_tag(channels));
    body.put_u8(0x00); // 0: sequence header
    body.put_slice(decoder_info);
    body.freeze()
}

/// Audio frame tag body: `[AF|AE] 01 | encoded payload`.
fn build_media_body(channels: u8, payload: &[u8]) -> Bytes {
    let mut body = BytesMut::with_capacity(2 + payload.len());
    body.put_u8(channel_tag(channels));
    body.put_u8(0x01); // 1: frame data
    body.put_slice(payload);
    body.freeze()
}
