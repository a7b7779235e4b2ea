//! Single-shot capture endpoints (`/capture`, `/bmp`)

use super::{camera_disabled_response, run_blocking};
use crate::camera_driver::PixelFormat;
use crate::encoding::{encode_chunked, to_encoded_frame, TargetFormat};
use crate::error::Result;
use crate::state::AppState;
use crate::transport::body_channel;
use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use std::time::Instant;

/// GET /capture - one JPEG, LED lit for the exposure
pub async fn capture(State(state): State<AppState>) -> Result<Response> {
    if !state.camera_enabled() {
        return Ok(camera_disabled_response());
    }
    let started = Instant::now();

    let flash = state.illuminator.flash();
    tokio::time::sleep(state.config.led_warmup).await;
    let frames = state.frames.clone();
    let acquired = run_blocking(move || Ok(frames.acquire())).await;
    drop(flash);

    let lease = acquired?.map_err(|e| {
        tracing::error!(error = %e, "Camera capture failed");
        e
    })?;
    let timestamp = lease.timestamp().to_string();
    let headers = [
        (header::CONTENT_TYPE, "image/jpeg".to_string()),
        (header::CONTENT_DISPOSITION, "inline; filename=capture.jpg".to_string()),
        (header::HeaderName::from_static("x-timestamp"), timestamp),
    ];

    if lease.format() == PixelFormat::Jpeg {
        tracing::info!(
            frame_len = lease.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "JPG captured"
        );
        // The lease goes back to the driver once the body is dropped
        return Ok((headers, Body::from(Bytes::from_owner(lease))).into_response());
    }

    let (mut sink, body) = body_channel();
    let quality = state.config.jpeg_quality;
    tokio::task::spawn_blocking(move || {
        match encode_chunked(&lease, quality, &mut sink) {
            Ok(len) => tracing::info!(
                frame_len = len,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "JPG captured"
            ),
            Err(e) => tracing::error!(error = %e, "JPEG compression failed"),
        }
        drop(lease);
    });

    Ok((headers, body).into_response())
}

/// GET /bmp - one frame converted to a bitmap. Not gated on the enabled flag.
pub async fn bmp(State(state): State<AppState>) -> Result<Response> {
    let started = Instant::now();
    let frames = state.frames.clone();
    let quality = state.config.jpeg_quality;

    // Driver frame is returned before the bitmap is sent
    let encoded = run_blocking(move || {
        let lease = frames.acquire().map_err(|e| {
            tracing::error!(error = %e, "Camera capture failed");
            e
        })?;
        to_encoded_frame(&frames, lease, TargetFormat::Bmp, quality).map_err(|e| {
            tracing::error!(error = %e, "BMP conversion failed");
            e.into()
        })
    })
    .await?;

    tracing::info!(
        frame_len = encoded.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "BMP captured"
    );

    let headers = [
        (header::CONTENT_TYPE, TargetFormat::Bmp.content_type().to_string()),
        (header::CONTENT_DISPOSITION, "inline; filename=capture.bmp".to_string()),
        (header::HeaderName::from_static("x-timestamp"), encoded.timestamp().to_string()),
    ];
    Ok((headers, Body::from(Bytes::from_owner(encoded))).into_response())
}
