// src/encoder.rs - Collaborator contracts for the external bitstream encoders
//
// The pipeline drives the encoders but never implements them: a video encoder
// turns one planar picture into coded units, an audio encoder turns one sample
// block into encoded bytes. Both are injected behind these traits.

use crate::error::Result;
use bytes::Bytes;

/// Discriminant for one unit of video encoder output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodedUnitKind {
    /// Sequence parameter set (decoder configuration, half of it).
    SequenceParameterSet,
    /// Picture parameter set (decoder configuration, the other half).
    PictureParameterSet,
    /// Self-contained frame, decodable without prior frames.
    KeyFrame,
    /// Predicted frame.
    InterFrame,
}

/// One unit of video encoder output: a byte payload plus its discriminant.
///
/// Payloads may carry a 3- or 4-byte Annex B start code prefix; the video
/// packetizer strips it before framing.
#[derive(Debug, Clone)]
pub struct CodedUnit {
    pub kind: CodedUnitKind,
    pub data: Bytes,
}

impl CodedUnit {
    pub fn new(kind: CodedUnitKind, data: impl Into<Bytes>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }
}

/// Resolved settings handed to the video encoder at open time.
///
/// Derived by [`VideoPacketizer::configure`](crate::video::VideoPacketizer::configure)
/// from a [`VideoConfig`](crate::video::VideoConfig): the bitrate ceiling gets
/// a headroom factor over the target, the key-frame interval defaults to one
/// key frame every two seconds, and the latency-bounding fields are fixed
/// (no B-frames, one encoding thread, parameter sets repeated on every key
/// frame).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoEncoderSettings {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    /// Target bitrate in bits per second.
    pub bitrate: u32,
    /// Instantaneous bitrate ceiling in bits per second.
    pub max_bitrate: u32,
    /// Rate-control buffer size in bits per second.
    pub vbv_buffer: u32,
    /// Frames between key frames.
    pub keyframe_interval: u32,
    /// Always 0: B-frames would add reordering latency on both ends.
    pub bframes: u32,
    /// Always 1: a single encoding thread keeps output in submission order.
    pub threads: u32,
    /// Every key frame re-carries its parameter sets.
    pub repeat_headers: bool,
}

/// Settings handed to the audio encoder at open time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioEncoderSettings {
    pub sample_rate: u32,
    pub channels: u8,
    /// Input samples are 16-bit signed PCM.
    pub sample_bits: u8,
    /// Raw (headerless) bitstream output; the container framing is ours.
    pub raw_output: bool,
    /// Temporal noise shaping.
    pub noise_shaping: bool,
}

/// Opens video encoder instances. Implemented over the actual codec library;
/// injected into the video packetizer at construction.
pub trait VideoEncoderOpener: Send + Sync {
    fn open(&self, settings: &VideoEncoderSettings) -> Result<Box<dyn VideoEncoder>>;
}

/// One opened video encoder instance. Owned exclusively by its packetizer and
/// only ever called under the packetizer's lock. Closing is dropping.
pub trait VideoEncoder: Send {
    /// Encodes one picture, returning the emitted coded units (possibly more
    /// than one: parameter sets accompany each key frame).
    fn encode(&mut self, picture: &PlanarImage) -> Result<Vec<CodedUnit>>;
}

/// Opens audio encoder instances; injected into the audio packetizer.
pub trait AudioEncoderOpener: Send + Sync {
    fn open(&self, settings: &AudioEncoderSettings) -> Result<Box<dyn AudioEncoder>>;
}

/// One opened audio encoder instance.
pub trait AudioEncoder: Send {
    /// Number of input samples the encoder requires per encode call. The
    /// capture side buffers raw samples up to exactly this size.
    fn input_samples(&self) -> usize;

    /// Upper bound on the encoded output of one call; sizes the packetizer's
    /// reusable output buffer.
    fn max_output_bytes(&self) -> usize;

    /// Encodes one sample block into `out`, returning the number of bytes
    /// produced. Zero means the encoder buffered the input and produced no
    /// output this call.
    fn encode(&mut self, samples: &[i16], out: &mut [u8]) -> Result<usize>;

    /// Decoder-specific initialization metadata, the body of the audio
    /// configuration packet.
    fn decoder_specific_info(&self) -> Bytes;
}

/// Reusable I420 picture buffer fed to the video encoder.
///
/// Planes are stored contiguously per plane with no row padding: the Y plane
/// is `width * height` bytes, U and V are `width * height / 4` bytes each, in
/// that order.
pub struct PlanarImage {
    width: usize,
    height: usize,
    y: Vec<u8>,
    u: Vec<u8>,
    v: Vec<u8>,
}

impl PlanarImage {
    pub fn new(width: u32, height: u32) -> Self {
        let luma = width as usize * height as usize;
        Self {
            width: width as usize,
            height: height as usize,
            y: vec![0; luma],
            u: vec![0; luma / 4],
            v: vec![0; luma / 4],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn y_plane(&self) -> &[u8] {
        &self.y
    }

    pub fn u_plane(&self) -> &[u8] {
        &self.u
    }

    pub fn v_plane(&self) -> &[u8] {
        &self.v
    }

    /// Source buffer length this image expects from the capture side.
    pub fn nv21_len(&self) -> usize {
        self.y.len() + self.y.len() / 2
    }

    /// Fills the planes from an NV21 source buffer.
    ///
    /// NV21 is the luma plane followed by interleaved chroma pairs in V-then-U
    /// order. The luma plane is copied directly; the chroma pairs are
    /// de-interleaved so that `u[i]` takes the second byte of pair `i` and
    /// `v[i]` the first.
    ///
    /// `src` must be at least [`nv21_len`](PlanarImage::nv21_len) bytes.
    pub fn load_nv21(&mut self, src: &[u8]) {
        let luma = self.y.len();
        self.y.copy_from_slice(&src[..luma]);
        let chroma = &src[luma..];
        for i in 0..self.u.len() {
            self.v[i] = chroma[2 * i];
            self.u[i] = chroma[2 * i + 1];
        }
    }
}
