//! Stream listener endpoint (`/stream`)

use super::camera_disabled_response;
use crate::mjpeg_stream::{stream_content_type, MjpegStreamer, StreamError, STREAM_FRAMERATE};
use crate::state::AppState;
use crate::transport::body_channel;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};

/// GET /stream - multipart JPEG stream until the client goes away.
///
/// The loop occupies one blocking thread for the life of the connection.
pub async fn stream(State(state): State<AppState>) -> Response {
    if !state.camera_enabled() {
        return camera_disabled_response();
    }

    let (mut sink, body) = body_channel();
    let mut streamer = MjpegStreamer::new(
        state.frames.clone(),
        state.illuminator.clone(),
        state.frame_monitor.clone(),
    )
    .with_quality(state.config.jpeg_quality);

    tokio::task::spawn_blocking(move || {
        let report = streamer.run(&mut sink);
        if !matches!(report.error, StreamError::Transport(_)) {
            tracing::warn!(
                frames_sent = report.frames_sent,
                bytes_sent = report.bytes_sent,
                "Stream ended without a client disconnect"
            );
        }
    });

    let headers = [
        (header::CONTENT_TYPE, stream_content_type()),
        (header::HeaderName::from_static("x-framerate"), STREAM_FRAMERATE.to_string()),
    ];
    (headers, body).into_response()
}
