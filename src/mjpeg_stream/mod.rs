//! MjpegStreamer - multipart/x-mixed-replace stream loop
//!
//! ## Responsibilities
//!
//! - Prime a stream connection (illumination on, streaming flag set)
//! - Loop acquire → encode → boundary/header/bytes → release → measure
//! - Terminate on the first failed step, switching illumination off
//!
//! ## Design
//!
//! The loop runs on a blocking thread and writes through a `ChunkSink`.
//! Each iteration owns at most one frame; the lease (or the re-encoded
//! heap buffer) is dropped at the end of the iteration whatever the send
//! outcome was. The only way out of the loop is an error.

use crate::camera_driver::FrameTimestamp;
use crate::encoding::{to_encoded_frame, EncodeError, TargetFormat, DEFAULT_JPEG_QUALITY};
use crate::frame_buffer::{FrameBufferManager, FrameError};
use crate::illumination::Illuminator;
use crate::running_average::FrameRateMonitor;
use crate::transport::{ChunkSink, TransportError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Multipart boundary token
pub const STREAM_BOUNDARY: &str = "123456789000000000000987654321";

/// Advertised in the `X-Framerate` response header
pub const STREAM_FRAMERATE: &str = "60";

/// Response content type for `/stream`
pub fn stream_content_type() -> String {
    format!("multipart/x-mixed-replace;boundary={}", STREAM_BOUNDARY)
}

/// Delimiter sent before every part
pub fn part_boundary() -> String {
    format!("\r\n--{}\r\n", STREAM_BOUNDARY)
}

/// Part header for one JPEG of `len` bytes
pub fn part_header(len: usize, timestamp: FrameTimestamp) -> String {
    format!(
        "Content-Type: image/jpeg\r\nContent-Length: {}\r\nX-Timestamp: {}\r\n\r\n",
        len, timestamp
    )
}

/// Stream connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Priming,
    Looping,
    Terminated,
}

/// Why a stream loop ended
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("frame acquisition failed: {0}")]
    Acquisition(#[from] FrameError),

    #[error("frame encoding failed: {0}")]
    Encode(#[from] EncodeError),

    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),
}

/// Outcome of one stream connection
#[derive(Debug)]
pub struct StreamReport {
    /// Parts written completely
    pub frames_sent: u64,
    pub bytes_sent: u64,
    /// Terminal error; the loop has no other exit
    pub error: StreamError,
}

/// Frame-interval monitor shared by all stream connections
pub type SharedFrameMonitor = Arc<Mutex<FrameRateMonitor>>;

/// One stream connection's loop
pub struct MjpegStreamer {
    frames: FrameBufferManager,
    illuminator: Arc<Illuminator>,
    monitor: SharedFrameMonitor,
    quality: u8,
    state: StreamState,
}

impl MjpegStreamer {
    pub fn new(frames: FrameBufferManager, illuminator: Arc<Illuminator>, monitor: SharedFrameMonitor) -> Self {
        Self {
            frames,
            illuminator,
            monitor,
            quality: DEFAULT_JPEG_QUALITY,
            state: StreamState::Idle,
        }
    }

    /// Re-encode quality for non-JPEG sensors
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Run until a step fails. Blocks the calling thread for the whole
    /// connection lifetime.
    pub fn run<S: ChunkSink>(&mut self, sink: &mut S) -> StreamReport {
        self.state = StreamState::Priming;
        let streaming = self.illuminator.begin_stream();
        self.lock_monitor().prime(Instant::now());
        tracing::info!(boundary = STREAM_BOUNDARY, quality = self.quality, "Stream started");

        self.state = StreamState::Looping;
        let mut frames_sent = 0u64;
        let mut bytes_sent = 0u64;

        let error = loop {
            let result = self.send_frame(sink);
            let interval = self.lock_monitor().record(Instant::now());

            match result {
                Ok(len) => {
                    frames_sent += 1;
                    bytes_sent += len as u64;
                    tracing::info!(
                        frame_len = len,
                        frame_ms = interval.frame_ms,
                        fps = interval.fps(),
                        avg_ms = interval.avg_ms,
                        avg_fps = interval.avg_fps(),
                        "MJPG frame sent"
                    );
                }
                Err(e) => break e,
            }
        };

        drop(streaming);
        self.state = StreamState::Terminated;

        match &error {
            StreamError::Transport(e) => tracing::info!(frames_sent, error = %e, "Stream closed by peer"),
            e => tracing::error!(frames_sent, error = %e, "Stream terminated"),
        }

        StreamReport {
            frames_sent,
            bytes_sent,
            error,
        }
    }

    /// One iteration; the frame is released before this returns
    fn send_frame<S: ChunkSink>(&self, sink: &mut S) -> Result<usize, StreamError> {
        let lease = self.frames.acquire()?;
        let frame = to_encoded_frame(&self.frames, lease, TargetFormat::Jpeg, self.quality)?;

        sink.accept(part_boundary().as_bytes())?;
        sink.accept(part_header(frame.len(), frame.timestamp()).as_bytes())?;
        sink.accept(frame.data())?;
        Ok(frame.len())
    }

    fn lock_monitor(&self) -> std::sync::MutexGuard<'_, FrameRateMonitor> {
        self.monitor.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera_driver::{FrameSize, PixelFormat, SimulatedCamera, SimulatedCameraConfig};
    use crate::illumination::SimulatedLed;
    use crate::transport::body_channel;
    use http_body_util::BodyExt;

    /// Accepts `limit` chunks, then reports the peer gone
    struct ScriptedSink {
        chunks: Vec<Vec<u8>>,
        limit: usize,
    }

    impl ScriptedSink {
        fn new(limit: usize) -> Self {
            Self {
                chunks: Vec::new(),
                limit,
            }
        }
    }

    impl ChunkSink for ScriptedSink {
        fn accept(&mut self, chunk: &[u8]) -> Result<(), TransportError> {
            if self.chunks.len() >= self.limit {
                return Err(TransportError::PeerClosed);
            }
            self.chunks.push(chunk.to_vec());
            Ok(())
        }
    }

    struct Fixture {
        cam: Arc<SimulatedCamera>,
        led: Arc<SimulatedLed>,
        illuminator: Arc<Illuminator>,
        frames: FrameBufferManager,
        monitor: SharedFrameMonitor,
    }

    impl Fixture {
        fn new(format: PixelFormat) -> Self {
            let cam = Arc::new(SimulatedCamera::new(SimulatedCameraConfig {
                pixel_format: format,
                frame_size: FrameSize::Qqvga,
                ..Default::default()
            }));
            let led = Arc::new(SimulatedLed::new());
            let illuminator = Arc::new(Illuminator::new(led.clone()));
            illuminator.set_intensity(180);
            Self {
                frames: FrameBufferManager::new(cam.clone()),
                cam,
                led,
                illuminator,
                monitor: Arc::new(Mutex::new(FrameRateMonitor::new(20))),
            }
        }

        fn streamer(&self) -> MjpegStreamer {
            MjpegStreamer::new(self.frames.clone(), self.illuminator.clone(), self.monitor.clone())
        }
    }

    #[test]
    fn test_part_header_format() {
        let header = part_header(1234, FrameTimestamp { sec: 5, usec: 42 });
        assert_eq!(
            header,
            "Content-Type: image/jpeg\r\nContent-Length: 1234\r\nX-Timestamp: 5.000042\r\n\r\n"
        );
        assert_eq!(
            stream_content_type(),
            "multipart/x-mixed-replace;boundary=123456789000000000000987654321"
        );
    }

    #[test]
    fn test_five_frames_then_failing_write() {
        let fx = Fixture::new(PixelFormat::Jpeg);
        let mut streamer = fx.streamer();
        assert_eq!(streamer.state(), StreamState::Idle);

        // Three writes per part; the 16th write fails
        let mut sink = ScriptedSink::new(15);
        let report = streamer.run(&mut sink);

        assert_eq!(report.frames_sent, 5);
        assert!(matches!(report.error, StreamError::Transport(TransportError::PeerClosed)));
        assert_eq!(streamer.state(), StreamState::Terminated);

        let boundary = part_boundary().into_bytes();
        assert_eq!(sink.chunks.iter().filter(|c| **c == boundary).count(), 5);
        for part in sink.chunks.chunks(3) {
            let header = String::from_utf8(part[1].clone()).unwrap();
            assert!(header.contains(&format!("Content-Length: {}\r\n", part[2].len())));
            assert_eq!(&part[2][..2], &[0xFF, 0xD8]);
        }

        assert!(!fx.illuminator.is_streaming());
        assert_eq!(fx.led.duty(), 0);

        let ledger = fx.frames.ledger();
        assert_eq!(ledger.acquired, 6);
        assert!(ledger.is_balanced());
        assert_eq!(ledger.heap_allocated, 0);
        assert_eq!(fx.cam.outstanding(), 0);
    }

    #[test]
    fn test_failure_mid_payload_releases_frame() {
        let fx = Fixture::new(PixelFormat::Jpeg);
        let mut sink = ScriptedSink::new(2);
        let report = fx.streamer().run(&mut sink);

        assert_eq!(report.frames_sent, 0);
        assert_eq!(report.bytes_sent, 0);
        assert_eq!(fx.cam.outstanding(), 0);
        assert!(fx.frames.ledger().is_balanced());
    }

    #[test]
    fn test_reencode_buffers_freed_on_every_path() {
        let fx = Fixture::new(PixelFormat::Rgb565);
        let mut sink = ScriptedSink::new(6);
        let report = fx.streamer().with_quality(60).run(&mut sink);

        assert_eq!(report.frames_sent, 2);
        let ledger = fx.frames.ledger();
        assert_eq!(ledger.acquired, 3);
        assert_eq!(ledger.heap_allocated, 3);
        assert!(ledger.is_balanced());
        assert_eq!(&sink.chunks[2][..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_encode_failure_terminates_and_releases() {
        let fx = Fixture::new(PixelFormat::Rgb565);
        fx.cam.corrupt_next_frames(1);
        let mut sink = ScriptedSink::new(usize::MAX);
        let mut streamer = fx.streamer();
        let report = streamer.run(&mut sink);

        assert_eq!(report.frames_sent, 0);
        assert!(matches!(report.error, StreamError::Encode(EncodeError::ShortFrame { .. })));
        assert_eq!(streamer.state(), StreamState::Terminated);
        assert!(sink.chunks.is_empty());

        let ledger = fx.frames.ledger();
        assert_eq!(ledger.acquired, 1);
        assert_eq!(ledger.heap_allocated, 0);
        assert!(ledger.is_balanced());
        assert_eq!(fx.cam.outstanding(), 0);
        assert_eq!(fx.led.duty(), 0);
    }

    #[test]
    fn test_acquisition_failure_terminates() {
        let fx = Fixture::new(PixelFormat::Jpeg);
        fx.cam.fail_next_frames(1);
        let mut sink = ScriptedSink::new(usize::MAX);
        let report = fx.streamer().run(&mut sink);

        assert_eq!(report.frames_sent, 0);
        assert!(matches!(report.error, StreamError::Acquisition(FrameError::SensorUnavailable)));
        assert!(sink.chunks.is_empty());
        assert_eq!(fx.frames.ledger().acquired, 0);
        assert!(!fx.illuminator.is_streaming());

        // Interval still measured for the failed iteration
        assert!(fx.monitor.lock().unwrap().average().is_some());
    }

    #[test]
    fn test_led_lit_while_streaming() {
        let fx = Fixture::new(PixelFormat::Jpeg);
        let illuminator = fx.illuminator.clone();
        let led = fx.led.clone();

        struct LedCheckSink {
            illuminator: Arc<Illuminator>,
            led: Arc<SimulatedLed>,
            seen: Option<(bool, u32)>,
        }
        impl ChunkSink for LedCheckSink {
            fn accept(&mut self, _chunk: &[u8]) -> Result<(), TransportError> {
                self.seen = Some((self.illuminator.is_streaming(), self.led.duty()));
                Err(TransportError::PeerClosed)
            }
        }

        let mut sink = LedCheckSink {
            illuminator,
            led,
            seen: None,
        };
        fx.streamer().run(&mut sink);
        assert_eq!(sink.seen, Some((true, 180)));
        assert_eq!(fx.led.duty(), 0);
    }

    #[tokio::test]
    async fn test_dropped_body_ends_stream() {
        let fx = Fixture::new(PixelFormat::Jpeg);
        let mut streamer = fx.streamer();
        let (mut sink, mut body) = body_channel();

        let task = tokio::task::spawn_blocking(move || streamer.run(&mut sink));

        let first = body.frame().await.unwrap().unwrap().into_data().unwrap();
        assert_eq!(&first[..], part_boundary().as_bytes());
        drop(body);

        let report = task.await.unwrap();
        assert!(matches!(report.error, StreamError::Transport(TransportError::PeerClosed)));
        assert!(fx.frames.ledger().is_balanced());
        assert_eq!(fx.cam.outstanding(), 0);
    }
}
