//! CameraDriver - Sensor acquisition and configuration interface
//!
//! ## Responsibilities
//!
//! - Hand out filled frame buffers from the driver pool and take them back
//! - Apply sensor settings (one setter per control-plane variable)
//! - Raw register / clock / PLL / window access for diagnostics
//!
//! Register semantics are the driver's business. This crate only sees the
//! calls and their integer result codes.

mod simulated;
mod types;

pub use simulated::{SimulatedCamera, SimulatedCameraConfig};
pub use types::*;

/// Failure code returned by a driver call
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{operation} failed with code {code}")]
pub struct DriverError {
    pub operation: &'static str,
    pub code: i32,
}

impl DriverError {
    pub fn new(operation: &'static str, code: i32) -> Self {
        Self { operation, code }
    }
}

/// Driver result alias
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Hardware camera driver.
///
/// All methods take `&self`; implementations serialize access to the
/// sensor internally, one call at a time.
pub trait CameraDriver: Send + Sync {
    /// Take a filled buffer from the pool. `None` means no frame is
    /// available (pool exhausted or sensor fault).
    fn frame_get(&self) -> Option<RawFrame>;

    /// Give a buffer obtained from `frame_get` back to the pool
    fn frame_return(&self, frame: RawFrame);

    /// Current sensor configuration, `None` when no sensor is attached
    fn status(&self) -> Option<SensorStatus>;

    /// Current output pixel format, `None` when no sensor is attached
    fn pixel_format(&self) -> Option<PixelFormat>;

    /// Apply one sensor setting
    fn set_control(&self, control: SensorControl, value: i32) -> DriverResult<()>;

    /// Set the sensor master clock in MHz
    fn set_xclk(&self, mhz: i32) -> DriverResult<()>;

    /// Read `reg & mask`
    fn get_reg(&self, reg: i32, mask: i32) -> DriverResult<i32>;

    /// Write the bits of `value` selected by `mask` into `reg`
    fn set_reg(&self, reg: i32, mask: i32, value: i32) -> DriverResult<()>;

    fn set_pll(&self, pll: &PllConfig) -> DriverResult<()>;

    fn set_window(&self, window: &SensorWindow) -> DriverResult<()>;
}
