// End-to-end pipeline test: mock encoders and a recording transport, real
// queue, packetizers and push controller.

use bytes::Bytes;
use parking_lot::Mutex;
use rtmp_pusher::encoder::{
    AudioEncoder, AudioEncoderOpener, AudioEncoderSettings, CodedUnit, CodedUnitKind, PlanarImage,
    VideoEncoder, VideoEncoderOpener, VideoEncoderSettings,
};
use rtmp_pusher::transport::{Connector, PacketMeta, Session};
use rtmp_pusher::{
    AudioPacketizer, MediaPacket, PacketQueue, PushState, Pusher, Result, Track, VideoConfig,
    VideoPacketizer,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

const AUDIO_BLOCK: usize = 1024;

struct FakeH264Encoder {
    frames_seen: u32,
}

impl VideoEncoder for FakeH264Encoder {
    fn encode(&mut self, picture: &PlanarImage) -> Result<Vec<CodedUnit>> {
        assert_eq!(picture.width(), 640);
        assert_eq!(picture.height(), 480);
        self.frames_seen += 1;
        if self.frames_seen == 1 {
            // First frame is a key frame accompanied by its parameter sets,
            // each with an Annex B start code the packetizer must strip.
            Ok(vec![
                CodedUnit::new(
                    CodedUnitKind::SequenceParameterSet,
                    Bytes::from_static(&[0, 0, 0, 1, 0x67, 0x42, 0x00, 0x1F]),
                ),
                CodedUnit::new(
                    CodedUnitKind::PictureParameterSet,
                    Bytes::from_static(&[0, 0, 0, 1, 0x68, 0xCE, 0x38, 0x80]),
                ),
                CodedUnit::new(
                    CodedUnitKind::KeyFrame,
                    Bytes::from_static(&[0, 0, 0, 1, 0x65, 0x88, 0x84]),
                ),
            ])
        } else {
            Ok(vec![CodedUnit::new(
                CodedUnitKind::InterFrame,
                Bytes::from_static(&[0, 0, 1, 0x41, 0x9A]),
            )])
        }
    }
}

struct FakeH264Opener;

impl VideoEncoderOpener for FakeH264Opener {
    fn open(&self, settings: &VideoEncoderSettings) -> Result<Box<dyn VideoEncoder>> {
        // Latency-bounding settings derived by the packetizer.
        assert_eq!(settings.bframes, 0);
        assert_eq!(settings.threads, 1);
        assert!(settings.repeat_headers);
        assert_eq!(settings.keyframe_interval, 2 * settings.frame_rate);
        Ok(Box::new(FakeH264Encoder { frames_seen: 0 }))
    }
}

struct FakeAacEncoder;

impl AudioEncoder for FakeAacEncoder {
    fn input_samples(&self) -> usize {
        AUDIO_BLOCK
    }
    fn max_output_bytes(&self) -> usize {
        768
    }
    fn encode(&mut self, samples: &[i16], out: &mut [u8]) -> Result<usize> {
        assert_eq!(samples.len(), AUDIO_BLOCK);
        out[..4].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        Ok(4)
    }
    fn decoder_specific_info(&self) -> Bytes {
        Bytes::from_static(&[0x12, 0x10])
    }
}

struct FakeAacOpener;

impl AudioEncoderOpener for FakeAacOpener {
    fn open(&self, settings: &AudioEncoderSettings) -> Result<Box<dyn AudioEncoder>> {
        assert_eq!(settings.sample_rate, 44_100);
        assert_eq!(settings.channels, 2);
        Ok(Box::new(FakeAacEncoder))
    }
}

#[derive(Debug, Clone)]
struct SentRecord {
    body: Vec<u8>,
    meta: PacketMeta,
}

type Sink = Arc<Mutex<Vec<SentRecord>>>;

struct RecordingSession {
    sink: Sink,
}

impl Session for RecordingSession {
    fn send(&mut self, body: &[u8], meta: &PacketMeta) -> Result<()> {
        self.sink.lock().push(SentRecord {
            body: body.to_vec(),
            meta: *meta,
        });
        Ok(())
    }
}

struct RecordingConnector {
    sink: Sink,
}

impl Connector for RecordingConnector {
    fn connect(&self, url: &str, _timeout: Duration) -> Result<Box<dyn Session>> {
        assert!(url.starts_with("rtmp://"));
        Ok(Box::new(RecordingSession {
            sink: self.sink.clone(),
        }))
    }
}

fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn configure_stream_and_push_one_frame_of_each_track() {
    init_logging();
    let sink: Sink = Default::default();
    let queue: Arc<PacketQueue<MediaPacket>> = Arc::new(PacketQueue::new());

    let video = VideoPacketizer::new(queue.clone(), Box::new(FakeH264Opener));
    let audio = Arc::new(AudioPacketizer::new(queue.clone(), Box::new(FakeAacOpener)));
    video.configure(VideoConfig::new(640, 480, 20, 800_000)).unwrap();
    audio.configure(44_100, 2).unwrap();

    let pusher = Pusher::new(
        Box::new(RecordingConnector { sink: sink.clone() }),
        queue,
        audio.clone(),
    );
    pusher.start("rtmp://ingest.example.invalid/live/key");
    wait_until("streaming", || pusher.is_streaming());

    // One captured frame per track, submitted video first.
    video.encode(&vec![0x80u8; 640 * 480 * 3 / 2]);
    audio.encode(&[0i16; AUDIO_BLOCK]);

    // startup audio config + (video config, video key) + (audio config, audio media)
    wait_until("five sends", || sink.lock().len() == 5);
    pusher.stop();
    wait_until("idle after stop", || pusher.state() == PushState::Idle);

    let records = sink.lock();

    // Stream-start audio sequence header leads.
    assert_eq!(records[0].meta.track, Track::Audio);
    assert!(records[0].meta.is_config);
    assert_eq!(records[0].body, vec![0xAF, 0x00, 0x12, 0x10]);

    // Per-track order: configuration strictly before media.
    let video_config = records
        .iter()
        .position(|r| r.meta.track == Track::Video && r.meta.is_config)
        .expect("video sequence header was sent");
    let video_media = records
        .iter()
        .position(|r| r.meta.track == Track::Video && !r.meta.is_config)
        .expect("video frame was sent");
    assert!(video_config < video_media);
    let audio_media = records
        .iter()
        .position(|r| r.meta.track == Track::Audio && !r.meta.is_config)
        .expect("audio frame was sent");
    let audio_config_before = records[..audio_media]
        .iter()
        .any(|r| r.meta.track == Track::Audio && r.meta.is_config);
    assert!(audio_config_before);

    // Video was submitted first, so its frame precedes the audio frame.
    assert!(video_media < audio_media);

    // Key frame tag and stripped payload length in the video frame body.
    let frame = &records[video_media];
    assert_eq!(frame.body[0], 0x17);
    assert_eq!(&frame.body[5..9], &[0, 0, 0, 3]);
    assert_eq!(&frame.body[9..], &[0x65, 0x88, 0x84]);

    // Audio media body carries the encoded bytes behind the stereo tag.
    assert_eq!(
        records[audio_media].body,
        vec![0xAF, 0x01, 0xDE, 0xAD, 0xBE, 0xEF]
    );

    // Config packets are pinned to zero; media timestamps are non-decreasing.
    let media_timestamps: Vec<u32> = records
        .iter()
        .filter(|r| !r.meta.is_config)
        .map(|r| r.meta.timestamp_ms)
        .collect();
    assert!(media_timestamps.windows(2).all(|w| w[0] <= w[1]));
    assert!(records
        .iter()
        .filter(|r| r.meta.is_config)
        .all(|r| r.meta.timestamp_ms == 0));

    // Channel ids separate the tracks at the transport layer.
    assert!(records
        .iter()
        .all(|r| match r.meta.track {
            Track::Video => r.meta.channel_id == 0x10,
            Track::Audio => r.meta.channel_id == 0x11,
        }));
}

#[test]
fn packets_encoded_while_idle_are_discarded_not_sent() {
    init_logging();
    let sink: Sink = Default::default();
    let queue: Arc<PacketQueue<MediaPacket>> = Arc::new(PacketQueue::new());
    let audio = Arc::new(AudioPacketizer::new(queue.clone(), Box::new(FakeAacOpener)));
    audio.configure(44_100, 2).unwrap();

    // Encoding before the pusher is started: the queue is not working, so
    // both emitted packets are dropped rather than retained.
    audio.encode(&[0i16; AUDIO_BLOCK]);
    assert!(queue.is_empty());

    let pusher = Pusher::new(
        Box::new(RecordingConnector { sink: sink.clone() }),
        queue,
        audio.clone(),
    );
    pusher.start("rtmp://ingest.example.invalid/live/key");
    wait_until("streaming", || pusher.is_streaming());
    // Only the stream-start audio config goes out; the pre-start packets are gone.
    wait_until("startup config", || sink.lock().len() == 1);
    audio.encode(&[0i16; AUDIO_BLOCK]);
    wait_until("pair after start", || sink.lock().len() == 3);

    pusher.stop();
    wait_until("idle", || pusher.state() == PushState::Idle);
    assert_eq!(sink.lock().len(), 3);
}
