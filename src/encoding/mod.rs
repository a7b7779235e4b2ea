//! Encoding - captured frame to wire format
//!
//! ## Responsibilities
//!
//! - Pass-through when the captured format already is the target format
//! - Whole-image re-encode into one heap buffer (stream parts, `/bmp`)
//! - Chunked JPEG encode straight into a `ChunkSink` (`/capture`)

mod pixels;

use crate::camera_driver::{FrameTimestamp, PixelFormat};
use crate::frame_buffer::{FrameBufferManager, FrameLease, HeapBuffer};
use crate::transport::{ChunkSink, TransportError};
use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use std::io::{self, Write};

/// Default re-encode quality (1-100)
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Encoder output chunk size
pub const CHUNK_LEN: usize = 4096;

/// Encoding failure
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("image codec error: {0}")]
    Codec(#[from] image::ImageError),

    #[error("frame buffer too short: expected {expected} bytes, got {actual}")]
    ShortFrame { expected: usize, actual: usize },

    /// Chunk sink rejected a chunk; chunks already sent stay sent
    #[error("chunk sink failed after {emitted} bytes: {source}")]
    Sink {
        emitted: usize,
        #[source]
        source: TransportError,
    },
}

/// Wire format requested by a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetFormat {
    Jpeg,
    Bmp,
}

impl TargetFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Bmp => "image/x-windows-bmp",
        }
    }

    /// Whether a captured frame can go out unchanged
    pub fn matches(&self, format: PixelFormat) -> bool {
        matches!((self, format), (Self::Jpeg, PixelFormat::Jpeg))
    }
}

/// Bytes for one picture, in one of two ownership regimes
#[derive(Debug)]
pub enum EncodedFrame {
    /// Driver buffer sent as-is; returned to the driver on drop
    PassThrough(FrameLease),
    /// Encoder output; the driver buffer was already returned
    Reencoded {
        buffer: HeapBuffer,
        timestamp: FrameTimestamp,
    },
}

impl EncodedFrame {
    pub fn data(&self) -> &[u8] {
        match self {
            Self::PassThrough(lease) => lease.data(),
            Self::Reencoded { buffer, .. } => buffer.data(),
        }
    }

    pub fn len(&self) -> usize {
        self.data().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data().is_empty()
    }

    pub fn timestamp(&self) -> FrameTimestamp {
        match self {
            Self::PassThrough(lease) => lease.timestamp(),
            Self::Reencoded { timestamp, .. } => *timestamp,
        }
    }

    pub fn is_pass_through(&self) -> bool {
        matches!(self, Self::PassThrough(_))
    }
}

impl AsRef<[u8]> for EncodedFrame {
    fn as_ref(&self) -> &[u8] {
        self.data()
    }
}

/// Turn a captured frame into the bytes to send.
///
/// Pass-through keeps the lease. Re-encoding returns the lease to the
/// driver as soon as the encoder is done with it, success or not.
pub fn to_encoded_frame(
    manager: &FrameBufferManager,
    lease: FrameLease,
    target: TargetFormat,
    quality: u8,
) -> Result<EncodedFrame, EncodeError> {
    if target.matches(lease.format()) {
        return Ok(EncodedFrame::PassThrough(lease));
    }

    let timestamp = lease.timestamp();
    let encoded = encode_whole(&lease, target, quality);
    drop(lease);

    Ok(EncodedFrame::Reencoded {
        buffer: manager.heap_buffer(encoded?),
        timestamp,
    })
}

/// Encode a whole frame into one buffer
pub fn encode_whole(lease: &FrameLease, target: TargetFormat, quality: u8) -> Result<Vec<u8>, EncodeError> {
    let input = pixels::encoder_input(lease.data(), lease.format(), lease.width(), lease.height())?;
    let mut out = Vec::new();
    write_image(&mut out, target, &input, quality)?;
    Ok(out)
}

/// Encode a frame as JPEG, forwarding each chunk to `sink` as it is produced.
///
/// Returns the number of bytes emitted.
pub fn encode_chunked<S: ChunkSink>(lease: &FrameLease, quality: u8, sink: &mut S) -> Result<usize, EncodeError> {
    let input = pixels::encoder_input(lease.data(), lease.format(), lease.width(), lease.height())?;
    let mut writer = ChunkWriter::new(sink);

    let result = write_image(&mut writer, TargetFormat::Jpeg, &input, quality).and_then(|()| {
        writer.emit().map_err(image::ImageError::IoError)
    });

    match (result, writer.failure.take()) {
        (Ok(()), _) => Ok(writer.emitted),
        (Err(_), Some(source)) => Err(EncodeError::Sink {
            emitted: writer.emitted,
            source,
        }),
        (Err(e), None) => Err(e.into()),
    }
}

fn write_image<W: Write>(
    mut writer: W,
    target: TargetFormat,
    input: &pixels::EncoderInput<'_>,
    quality: u8,
) -> image::ImageResult<()> {
    match target {
        TargetFormat::Jpeg => JpegEncoder::new_with_quality(writer, quality.clamp(1, 100)).encode(
            &input.data,
            input.width,
            input.height,
            input.color,
        ),
        TargetFormat::Bmp => BmpEncoder::new(&mut writer).encode(&input.data, input.width, input.height, input.color),
    }
}

/// `Write` adapter that hands fixed-size chunks to a sink
struct ChunkWriter<'s, S: ChunkSink> {
    sink: &'s mut S,
    buf: Vec<u8>,
    emitted: usize,
    failure: Option<TransportError>,
}

impl<'s, S: ChunkSink> ChunkWriter<'s, S> {
    fn new(sink: &'s mut S) -> Self {
        Self {
            sink,
            buf: Vec::with_capacity(CHUNK_LEN),
            emitted: 0,
            failure: None,
        }
    }

    fn emit(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        match self.sink.accept(&self.buf) {
            Ok(()) => {
                self.emitted += self.buf.len();
                self.buf.clear();
                Ok(())
            }
            Err(e) => {
                self.failure = Some(e.clone());
                Err(io::Error::new(io::ErrorKind::BrokenPipe, e))
            }
        }
    }
}

impl<S: ChunkSink> Write for ChunkWriter<'_, S> {
    fn write(&mut self, mut data: &[u8]) -> io::Result<usize> {
        if self.failure.is_some() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "chunk sink closed"));
        }
        let total = data.len();
        while !data.is_empty() {
            let take = (CHUNK_LEN - self.buf.len()).min(data.len());
            self.buf.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.buf.len() == CHUNK_LEN {
                self.emit()?;
            }
        }
        Ok(total)
    }

    /// Partial chunks go out only when encoding finishes
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera_driver::{FrameSize, SimulatedCamera, SimulatedCameraConfig};
    use std::sync::Arc;

    struct RecordingSink {
        chunks: Vec<Vec<u8>>,
        fail_after: Option<usize>,
    }

    impl ChunkSink for RecordingSink {
        fn accept(&mut self, chunk: &[u8]) -> Result<(), TransportError> {
            if self.fail_after.is_some_and(|n| self.chunks.len() >= n) {
                return Err(TransportError::PeerClosed);
            }
            self.chunks.push(chunk.to_vec());
            Ok(())
        }
    }

    fn setup(format: PixelFormat, size: FrameSize) -> (Arc<SimulatedCamera>, FrameBufferManager) {
        let cam = Arc::new(SimulatedCamera::new(SimulatedCameraConfig {
            pixel_format: format,
            frame_size: size,
            ..Default::default()
        }));
        let manager = FrameBufferManager::new(cam.clone());
        (cam, manager)
    }

    #[test]
    fn test_pass_through_allocates_nothing() {
        let (cam, manager) = setup(PixelFormat::Jpeg, FrameSize::Qqvga);
        let lease = manager.acquire().unwrap();
        let raw_len = lease.len();

        let encoded = to_encoded_frame(&manager, lease, TargetFormat::Jpeg, 80).unwrap();
        assert!(encoded.is_pass_through());
        assert_eq!(encoded.len(), raw_len);
        assert_eq!(manager.ledger().heap_allocated, 0);
        assert_eq!(cam.outstanding(), 1);

        drop(encoded);
        assert_eq!(cam.outstanding(), 0);
        assert!(manager.ledger().is_balanced());
    }

    #[test]
    fn test_reencode_returns_driver_buffer_first() {
        let (cam, manager) = setup(PixelFormat::Rgb565, FrameSize::Qqvga);
        let lease = manager.acquire().unwrap();
        let ts = lease.timestamp();

        let encoded = to_encoded_frame(&manager, lease, TargetFormat::Jpeg, 80).unwrap();
        assert!(!encoded.is_pass_through());
        assert_eq!(encoded.timestamp(), ts);
        assert_eq!(&encoded.data()[..2], &[0xFF, 0xD8]);
        assert_eq!(cam.outstanding(), 0);

        let ledger = manager.ledger();
        assert_eq!(ledger.heap_allocated, 1);
        assert_eq!(ledger.heap_freed, 0);

        drop(encoded);
        assert_eq!(manager.ledger().heap_freed, 1);
    }

    #[test]
    fn test_bmp_from_jpeg_and_gray() {
        let (_cam, manager) = setup(PixelFormat::Jpeg, FrameSize::R96x96);
        let lease = manager.acquire().unwrap();
        let bmp = encode_whole(&lease, TargetFormat::Bmp, 80).unwrap();
        assert_eq!(&bmp[..2], b"BM");

        let (_cam, manager) = setup(PixelFormat::Grayscale, FrameSize::R96x96);
        let lease = manager.acquire().unwrap();
        let bmp = encode_whole(&lease, TargetFormat::Bmp, 80).unwrap();
        assert_eq!(&bmp[..2], b"BM");
    }

    #[test]
    fn test_chunked_encode_reassembles() {
        let (_cam, manager) = setup(PixelFormat::Yuv422, FrameSize::Qvga);
        let lease = manager.acquire().unwrap();
        let mut sink = RecordingSink {
            chunks: Vec::new(),
            fail_after: None,
        };

        let emitted = encode_chunked(&lease, 80, &mut sink).unwrap();
        let joined: Vec<u8> = sink.chunks.concat();
        assert_eq!(emitted, joined.len());
        assert!(sink.chunks.iter().all(|c| c.len() <= CHUNK_LEN));
        assert_eq!(&joined[..2], &[0xFF, 0xD8]);
        assert_eq!(&joined[joined.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn test_chunked_encode_aborts_on_sink_failure() {
        let (cam, manager) = setup(PixelFormat::Rgb888, FrameSize::Vga);
        let lease = manager.acquire().unwrap();
        let mut sink = RecordingSink {
            chunks: Vec::new(),
            fail_after: Some(1),
        };

        let err = encode_chunked(&lease, 80, &mut sink).unwrap_err();
        match err {
            EncodeError::Sink { emitted, source } => {
                assert_eq!(emitted, CHUNK_LEN);
                assert_eq!(source, TransportError::PeerClosed);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(sink.chunks.len(), 1);

        drop(lease);
        assert_eq!(cam.outstanding(), 0);
    }
}
