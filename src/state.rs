//! Application state
//!
//! Holds all shared components and state

use crate::camera_driver::{CameraDriver, FrameSize, PixelFormat};
use crate::control_plane::{CameraEnabled, ControlPlane};
use crate::device_lifecycle::{RestartCoordinator, DEFAULT_RESTART_DELAY};
use crate::encoding::DEFAULT_JPEG_QUALITY;
use crate::frame_buffer::FrameBufferManager;
use crate::illumination::{Illuminator, LedDriver};
use crate::mjpeg_stream::SharedFrameMonitor;
use crate::preferences::{PreferenceStore, CAMERA_ENABLED_KEY};
use crate::running_average::{FrameRateMonitor, DEFAULT_WINDOW};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Control listener port; the stream listener uses `port + 1`
    pub port: u16,
    /// Boot value of the camera-enabled flag when no preference is stored
    pub camera_enabled: bool,
    /// Sensor output format
    pub pixel_format: PixelFormat,
    /// Boot frame size
    pub frame_size: FrameSize,
    /// Preference file
    pub preferences_path: PathBuf,
    /// JPEG quality used when re-encoding
    pub jpeg_quality: u8,
    /// Running-average window for frame intervals
    pub frame_avg_window: usize,
    /// Pause between the restart response and the restart
    pub restart_delay: Duration,
    /// Illumination lead time before a single-shot capture
    pub led_warmup: Duration,
}

impl AppConfig {
    pub fn stream_port(&self) -> u16 {
        self.port.saturating_add(1)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(80),
            camera_enabled: std::env::var("CAMERA_ENABLED")
                .ok()
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(true),
            pixel_format: std::env::var("CAMERA_PIXFORMAT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(PixelFormat::Jpeg),
            frame_size: std::env::var("CAMERA_FRAMESIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .and_then(FrameSize::from_index)
                .unwrap_or(FrameSize::Vga),
            preferences_path: std::env::var("PREFERENCES_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./camhttpd-prefs.json")),
            jpeg_quality: std::env::var("STREAM_JPEG_QUALITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_JPEG_QUALITY),
            frame_avg_window: std::env::var("FRAME_AVG_WINDOW")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_WINDOW),
            restart_delay: std::env::var("RESTART_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_RESTART_DELAY),
            led_warmup: std::env::var("LED_WARMUP_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(Duration::from_millis(150)),
        }
    }
}

/// Application state shared across handlers of both listeners
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Frame acquisition and buffer accounting
    pub frames: FrameBufferManager,
    /// LED flash
    pub illuminator: Arc<Illuminator>,
    /// `/control`, `/status` and raw sensor access
    pub control: Arc<ControlPlane>,
    /// Frame interval statistics, shared by all stream connections
    pub frame_monitor: SharedFrameMonitor,
    /// Restart requests from the control plane
    pub restart: RestartCoordinator,
}

impl AppState {
    /// Wire up all components.
    ///
    /// A stored `camera_en` preference overrides `config.camera_enabled`.
    pub fn new(
        config: AppConfig,
        driver: Arc<dyn CameraDriver>,
        led: Arc<dyn LedDriver>,
        preferences: Arc<dyn PreferenceStore>,
    ) -> Self {
        let enabled = preferences
            .get_bool(CAMERA_ENABLED_KEY)
            .unwrap_or(config.camera_enabled);
        tracing::info!(camera_enabled = enabled, "Camera enabled flag loaded");

        let illuminator = Arc::new(Illuminator::new(led));
        let control = Arc::new(ControlPlane::new(
            Arc::clone(&driver),
            Arc::clone(&illuminator),
            preferences,
            CameraEnabled::new(enabled),
        ));

        Self {
            frames: FrameBufferManager::new(driver),
            illuminator,
            control,
            frame_monitor: Arc::new(Mutex::new(FrameRateMonitor::new(config.frame_avg_window))),
            restart: RestartCoordinator::new(),
            config,
        }
    }

    pub fn camera_enabled(&self) -> bool {
        self.control.camera_enabled()
    }
}
