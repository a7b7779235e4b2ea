//! Error handling for camhttpd

use crate::camera_driver::DriverError;
use crate::encoding::EncodeError;
use crate::frame_buffer::FrameError;
use crate::mjpeg_stream::StreamError;
use crate::preferences::PreferencesError;
use crate::transport::TransportError;
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Driver had no frame to hand out
    #[error("Frame acquisition failed")]
    AcquisitionFailure,

    /// Format conversion failed
    #[error("Encode error: {0}")]
    EncodeFailure(String),

    /// Write to peer failed
    #[error("Transport error: {0}")]
    TransportFailure(String),

    /// `/control` variable not in the command table
    #[error("Unknown command: {0}")]
    CommandUnrecognized(String),

    /// Driver call returned a failure code
    #[error("Hardware rejected {operation}: code {code}")]
    HardwareRejected { operation: &'static str, code: i32 },

    /// Missing or empty query parameters
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// Preference store error
    #[error("Preferences error: {0}")]
    Preferences(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::MalformedRequest(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Error::AcquisitionFailure => "ACQUISITION_FAILURE",
            Error::EncodeFailure(_) => "ENCODE_FAILURE",
            Error::TransportFailure(_) => "TRANSPORT_FAILURE",
            Error::CommandUnrecognized(_) => "COMMAND_UNRECOGNIZED",
            Error::HardwareRejected { .. } => "HARDWARE_REJECTED",
            Error::MalformedRequest(_) => "MALFORMED_REQUEST",
            Error::Preferences(_) => "PREFERENCES_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<FrameError> for Error {
    fn from(_: FrameError) -> Self {
        Error::AcquisitionFailure
    }
}

impl From<EncodeError> for Error {
    fn from(e: EncodeError) -> Self {
        match e {
            EncodeError::Sink { source, .. } => Error::TransportFailure(source.to_string()),
            other => Error::EncodeFailure(other.to_string()),
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::TransportFailure(e.to_string())
    }
}

impl From<DriverError> for Error {
    fn from(e: DriverError) -> Self {
        Error::HardwareRejected {
            operation: e.operation,
            code: e.code,
        }
    }
}

impl From<PreferencesError> for Error {
    fn from(e: PreferencesError) -> Self {
        Error::Preferences(e.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(e: tokio::task::JoinError) -> Self {
        Error::Internal(format!("blocking task failed: {}", e))
    }
}

impl From<StreamError> for Error {
    fn from(e: StreamError) -> Self {
        match e {
            StreamError::Acquisition(e) => e.into(),
            StreamError::Encode(e) => e.into(),
            StreamError::Transport(e) => e.into(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_code = self.error_code();
        let message = self.to_string();

        if status == StatusCode::NOT_FOUND {
            tracing::warn!(status = %status, error_code = %error_code, message = %message, "Request error");
        } else {
            tracing::error!(status = %status, error_code = %error_code, message = %message, "Request error");
        }

        // Plain bodies, like the firmware's httpd_resp_send_404/500
        let body = status.canonical_reason().unwrap_or("Error");
        (status, [(header::CONTENT_TYPE, "text/plain")], body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            Error::MalformedRequest("missing var".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::from(DriverError::new("set_quality", -1)).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(Error::from(FrameError::SensorUnavailable).error_code(), "ACQUISITION_FAILURE");
    }

    #[test]
    fn test_sink_failure_is_transport() {
        let err = Error::from(EncodeError::Sink {
            emitted: 4096,
            source: TransportError::PeerClosed,
        });
        assert!(matches!(err, Error::TransportFailure(_)));
    }
}
