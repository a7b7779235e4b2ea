//! ControlPlane - sensor configuration commands
//!
//! ## Responsibilities
//!
//! - Dispatch `/control` `(var, val)` pairs to driver setters and
//!   lifecycle actions
//! - Build the `/status` report
//! - Raw clock / register / PLL / window access for diagnostics
//!
//! ## Concurrency
//!
//! No lock is held across commands. Each driver call is serialized by the
//! driver itself, so a command issued mid-stream lands between two frames.

mod command;

pub use command::{atoi, Command};

use crate::camera_driver::{CameraDriver, PixelFormat, PllConfig, SensorControl, SensorWindow};
use crate::error::{Error, Result};
use crate::illumination::Illuminator;
use crate::models::{ActionResponse, StatusReport};
use crate::preferences::{PreferenceStore, CAMERA_ENABLED_KEY};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide camera-enabled flag, fixed at boot
#[derive(Debug, Clone)]
pub struct CameraEnabled(Arc<AtomicBool>);

impl CameraEnabled {
    pub fn new(enabled: bool) -> Self {
        Self(Arc::new(AtomicBool::new(enabled)))
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of a successful `/control` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Setting applied; empty 200 response
    Applied,
    /// Lifecycle command acknowledged with a JSON body
    Acknowledged(ActionResponse),
    /// Send the body, then restart the device
    Restart(ActionResponse),
}

/// Control-plane command dispatcher
pub struct ControlPlane {
    driver: Arc<dyn CameraDriver>,
    illuminator: Arc<Illuminator>,
    preferences: Arc<dyn PreferenceStore>,
    camera_enabled: CameraEnabled,
}

impl ControlPlane {
    pub fn new(
        driver: Arc<dyn CameraDriver>,
        illuminator: Arc<Illuminator>,
        preferences: Arc<dyn PreferenceStore>,
        camera_enabled: CameraEnabled,
    ) -> Self {
        Self {
            driver,
            illuminator,
            preferences,
            camera_enabled,
        }
    }

    /// Handle one `/control` request. `value` is parsed like C `atoi`.
    pub fn handle(&self, variable: &str, value: &str) -> Result<CommandOutcome> {
        let val = atoi(value);
        let command = Command::parse(variable).ok_or_else(|| {
            tracing::info!(variable, "Unknown command");
            Error::CommandUnrecognized(variable.to_string())
        })?;

        tracing::info!(variable, val, "Control command");

        match command {
            Command::Sensor(SensorControl::FrameSize) => {
                // Resolution can only change while the sensor outputs JPEG
                if self.driver.pixel_format() == Some(PixelFormat::Jpeg) {
                    self.driver.set_control(SensorControl::FrameSize, val)?;
                } else {
                    tracing::debug!(val, "framesize ignored: sensor is not in JPEG mode");
                }
                Ok(CommandOutcome::Applied)
            }
            Command::Sensor(control) => {
                self.driver.set_control(control, val)?;
                Ok(CommandOutcome::Applied)
            }
            Command::LedIntensity => {
                self.illuminator.set_intensity(val);
                Ok(CommandOutcome::Applied)
            }
            Command::EnableCamera => {
                self.preferences.put_bool(CAMERA_ENABLED_KEY, true)?;
                tracing::info!("Camera will be enabled on next restart");
                Ok(CommandOutcome::Acknowledged(ActionResponse::success(
                    "Camera will be enabled after restart",
                )))
            }
            Command::DisableCamera => {
                self.preferences.put_bool(CAMERA_ENABLED_KEY, false)?;
                tracing::info!("Camera will be disabled on next restart");
                Ok(CommandOutcome::Acknowledged(ActionResponse::success(
                    "Camera will be disabled after restart",
                )))
            }
            Command::Restart => {
                tracing::info!("Restarting system...");
                Ok(CommandOutcome::Restart(ActionResponse::success("Restarting system...")))
            }
        }
    }

    /// Current configuration, or the unavailable indicator
    pub fn status(&self) -> StatusReport {
        let enabled = self.camera_enabled.get();
        match self.driver.status() {
            Some(sensor) if enabled => StatusReport {
                camera_enabled: true,
                sensor: Some(sensor),
                led_intensity: Some(self.illuminator.intensity()),
                led_status: Some(u8::from(self.illuminator.is_streaming())),
                msg: None,
            },
            _ => StatusReport::unavailable(enabled),
        }
    }

    pub fn camera_enabled(&self) -> bool {
        self.camera_enabled.get()
    }

    pub fn set_xclk(&self, mhz: i32) -> Result<()> {
        self.driver.set_xclk(mhz)?;
        tracing::info!(mhz, "Set XCLK");
        Ok(())
    }

    pub fn set_register(&self, reg: i32, mask: i32, value: i32) -> Result<()> {
        self.driver.set_reg(reg, mask, value)?;
        tracing::info!(reg = %format!("{:#x}", reg), mask = %format!("{:#x}", mask), value, "Set register");
        Ok(())
    }

    pub fn get_register(&self, reg: i32, mask: i32) -> Result<i32> {
        let value = self.driver.get_reg(reg, mask)?;
        tracing::info!(reg = %format!("{:#x}", reg), mask = %format!("{:#x}", mask), value, "Get register");
        Ok(value)
    }

    pub fn set_pll(&self, pll: &PllConfig) -> Result<()> {
        self.driver.set_pll(pll)?;
        tracing::info!(?pll, "Set PLL");
        Ok(())
    }

    pub fn set_window(&self, window: &SensorWindow) -> Result<()> {
        self.driver.set_window(window)?;
        tracing::info!(?window, "Set window");
        Ok(())
    }
}
