//! camhttpd Library
//!
//! HTTP camera server: MJPEG streaming plus a sensor control plane.
//!
//! ## Architecture
//!
//! 1. CameraDriver - sensor acquisition and settings (trait + simulated sensor)
//! 2. FrameBufferManager - exactly-once frame release, heap buffer accounting
//! 3. Encoding - pass-through, chunked and whole-image JPEG/BMP encoding
//! 4. Transport - chunk sinks feeding streaming HTTP bodies
//! 5. MjpegStreamer - multipart stream loop
//! 6. RunningAverage - frame interval smoothing
//! 7. Illumination - LED intensity and streaming flag
//! 8. ControlPlane - `/control` dispatcher, status, raw register access
//! 9. Preferences - persisted camera-enabled flag
//! 10. DeviceLifecycle - deferred restart
//! 11. WebAPI - control and stream listeners
//!
//! ## Design Principles
//!
//! - Every driver buffer leaves through exactly one release path (RAII)
//! - A stream ends only when a step fails
//! - Restart is requested by handlers and performed by `main`

pub mod camera_driver;
pub mod control_plane;
pub mod device_lifecycle;
pub mod encoding;
pub mod error;
pub mod frame_buffer;
pub mod illumination;
pub mod mjpeg_stream;
pub mod models;
pub mod preferences;
pub mod running_average;
pub mod state;
pub mod transport;
pub mod web_api;

pub use error::{Error, Result};
pub use state::AppState;
