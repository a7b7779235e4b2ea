//! Shared models and types for camhttpd
//!
//! JSON bodies shared by the control plane and the HTTP layer.

use crate::camera_driver::SensorStatus;
use serde::{Deserialize, Serialize};

/// Body returned by capture endpoints while the camera is disabled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraDisabledResponse {
    pub error: String,
    pub message: String,
}

impl Default for CameraDisabledResponse {
    fn default() -> Self {
        Self {
            error: "Camera is disabled".to_string(),
            message: "The camera function has been disabled. Please enable it in settings and restart the device."
                .to_string(),
        }
    }
}

/// Acknowledgement of a lifecycle command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub status: String,
    pub msg: String,
}

impl ActionResponse {
    pub fn success(msg: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            msg: msg.into(),
        }
    }
}

/// `/status` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub camera_enabled: bool,
    #[serde(flatten)]
    pub sensor: Option<SensorStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub led_intensity: Option<i32>,
    /// 1 while a stream is running
    #[serde(skip_serializing_if = "Option::is_none")]
    pub led_status: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl StatusReport {
    pub const UNAVAILABLE_MSG: &'static str = "Camera is disabled or sensor not available";

    pub fn unavailable(camera_enabled: bool) -> Self {
        Self {
            camera_enabled,
            sensor: None,
            led_intensity: None,
            led_status: None,
            msg: Some(Self::UNAVAILABLE_MSG.to_string()),
        }
    }
}
