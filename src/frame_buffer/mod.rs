//! FrameBufferManager - Frame buffer ownership
//!
//! ## Responsibilities
//!
//! - Acquire frames from the driver pool as RAII leases
//! - Return every driver buffer exactly once (lease drop)
//! - Account for heap buffers produced by re-encoding
//!
//! Two ownership regimes exist per in-flight frame: a `FrameLease`
//! (driver-owned, returned through `CameraDriver::frame_return`) and a
//! `HeapBuffer` (allocated by the encoder, freed on drop). The types
//! never convert into each other, so a buffer can only leave through its
//! own release path.

use crate::camera_driver::{CameraDriver, FrameTimestamp, PixelFormat, RawFrame};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Acquisition failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// Driver reported no frame (pool exhausted or hardware fault)
    #[error("sensor unavailable: no frame from driver")]
    SensorUnavailable,
}

/// Buffer accounting counters
#[derive(Debug, Default)]
pub struct BufferLedger {
    acquired: AtomicU64,
    released: AtomicU64,
    heap_allocated: AtomicU64,
    heap_freed: AtomicU64,
}

/// Point-in-time copy of the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LedgerSnapshot {
    pub acquired: u64,
    pub released: u64,
    pub heap_allocated: u64,
    pub heap_freed: u64,
}

impl LedgerSnapshot {
    /// Every acquired frame returned and every heap buffer freed
    pub fn is_balanced(&self) -> bool {
        self.acquired == self.released && self.heap_allocated == self.heap_freed
    }
}

impl BufferLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            acquired: self.acquired.load(Ordering::SeqCst),
            released: self.released.load(Ordering::SeqCst),
            heap_allocated: self.heap_allocated.load(Ordering::SeqCst),
            heap_freed: self.heap_freed.load(Ordering::SeqCst),
        }
    }
}

/// Hands out frame leases from a driver
#[derive(Clone)]
pub struct FrameBufferManager {
    driver: Arc<dyn CameraDriver>,
    ledger: Arc<BufferLedger>,
}

impl FrameBufferManager {
    pub fn new(driver: Arc<dyn CameraDriver>) -> Self {
        Self {
            driver,
            ledger: Arc::new(BufferLedger::new()),
        }
    }

    /// Acquire one frame. On failure nothing is held and nothing must be released.
    pub fn acquire(&self) -> Result<FrameLease, FrameError> {
        let frame = self.driver.frame_get().ok_or(FrameError::SensorUnavailable)?;
        self.ledger.acquired.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(slot = frame.slot, len = frame.len(), "Frame acquired");

        Ok(FrameLease {
            frame: Some(frame),
            driver: Arc::clone(&self.driver),
            ledger: Arc::clone(&self.ledger),
        })
    }

    /// Wrap encoder output so its release is accounted for
    pub fn heap_buffer(&self, data: Vec<u8>) -> HeapBuffer {
        self.ledger.heap_allocated.fetch_add(1, Ordering::SeqCst);
        HeapBuffer {
            data,
            ledger: Arc::clone(&self.ledger),
        }
    }

    pub fn ledger(&self) -> LedgerSnapshot {
        self.ledger.snapshot()
    }
}

/// Driver-owned frame. Dropping the lease returns the buffer to the driver.
pub struct FrameLease {
    frame: Option<RawFrame>,
    driver: Arc<dyn CameraDriver>,
    ledger: Arc<BufferLedger>,
}

impl FrameLease {
    fn raw(&self) -> &RawFrame {
        // Only `Drop` takes the frame out
        self.frame
            .as_ref()
            .unwrap_or_else(|| unreachable!("frame lease used after release"))
    }

    pub fn data(&self) -> &[u8] {
        &self.raw().buf
    }

    pub fn len(&self) -> usize {
        self.raw().len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw().is_empty()
    }

    pub fn format(&self) -> PixelFormat {
        self.raw().format
    }

    pub fn width(&self) -> u32 {
        self.raw().width
    }

    pub fn height(&self) -> u32 {
        self.raw().height
    }

    pub fn timestamp(&self) -> FrameTimestamp {
        self.raw().timestamp
    }

    /// Return the buffer now rather than at end of scope
    pub fn release(self) {}
}

impl AsRef<[u8]> for FrameLease {
    fn as_ref(&self) -> &[u8] {
        self.data()
    }
}

impl fmt::Debug for FrameLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.frame {
            Some(frame) => f
                .debug_struct("FrameLease")
                .field("slot", &frame.slot)
                .field("len", &frame.len())
                .field("format", &frame.format)
                .finish(),
            None => f.write_str("FrameLease(released)"),
        }
    }
}

impl Drop for FrameLease {
    fn drop(&mut self) {
        if let Some(frame) = self.frame.take() {
            let slot = frame.slot;
            self.driver.frame_return(frame);
            self.ledger.released.fetch_add(1, Ordering::SeqCst);
            tracing::trace!(slot, "Frame returned to driver");
        }
    }
}

/// Encoder-owned buffer, freed exactly once on drop
pub struct HeapBuffer {
    data: Vec<u8>,
    ledger: Arc<BufferLedger>,
}

impl HeapBuffer {
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl AsRef<[u8]> for HeapBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl fmt::Debug for HeapBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeapBuffer").field("len", &self.data.len()).finish()
    }
}

impl Drop for HeapBuffer {
    fn drop(&mut self) {
        self.ledger.heap_freed.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera_driver::{FrameSize, SimulatedCamera, SimulatedCameraConfig};

    fn manager() -> (Arc<SimulatedCamera>, FrameBufferManager) {
        let cam = Arc::new(SimulatedCamera::new(SimulatedCameraConfig {
            pixel_format: PixelFormat::Grayscale,
            frame_size: FrameSize::R96x96,
            ..Default::default()
        }));
        let manager = FrameBufferManager::new(cam.clone());
        (cam, manager)
    }

    #[test]
    fn test_lease_drop_returns_frame_once() {
        let (cam, manager) = manager();
        let lease = manager.acquire().unwrap();
        assert_eq!(lease.len(), 96 * 96);
        assert_eq!(cam.outstanding(), 1);

        drop(lease);
        assert_eq!(cam.outstanding(), 0);
        assert_eq!(cam.frames_returned(), 1);
        assert_eq!(cam.bad_returns(), 0);
        assert!(manager.ledger().is_balanced());
    }

    #[test]
    fn test_failed_acquire_holds_nothing() {
        let (cam, manager) = manager();
        cam.fail_next_frames(1);
        assert_eq!(manager.acquire().unwrap_err(), FrameError::SensorUnavailable);

        let snapshot = manager.ledger();
        assert_eq!(snapshot.acquired, 0);
        assert_eq!(snapshot.released, 0);
        assert_eq!(cam.frames_returned(), 0);
    }

    #[test]
    fn test_explicit_release() {
        let (cam, manager) = manager();
        let lease = manager.acquire().unwrap();
        lease.release();
        assert_eq!(cam.frames_returned(), 1);
        assert_eq!(manager.ledger().released, 1);
    }

    #[test]
    fn test_heap_buffer_accounting() {
        let (_cam, manager) = manager();
        let buf = manager.heap_buffer(vec![1, 2, 3]);
        assert_eq!(manager.ledger().heap_allocated, 1);
        assert_eq!(manager.ledger().heap_freed, 0);
        drop(buf);
        assert_eq!(manager.ledger().heap_freed, 1);
    }
}
