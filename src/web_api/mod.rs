//! WebAPI - HTTP endpoints
//!
//! ## Responsibilities
//!
//! - Route tables for the control listener and the stream listener
//! - Query-string validation
//! - Response formatting (`Access-Control-Allow-Origin: *` on everything)

mod capture_routes;
mod control_routes;
mod stream_routes;

use crate::control_plane::atoi;
use crate::error::{Error, Result};
use crate::models::CameraDisabledResponse;
use crate::state::AppState;
use axum::http::{header, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use std::collections::HashMap;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Router for the control listener (`PORT`)
pub fn create_control_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/capture", get(capture_routes::capture))
        .route("/bmp", get(capture_routes::bmp))
        .route("/control", get(control_routes::control))
        .route("/status", get(control_routes::status))
        .route("/xclk", get(control_routes::xclk))
        .route("/reg", get(control_routes::set_register))
        .route("/greg", get(control_routes::get_register))
        .route("/pll", get(control_routes::pll))
        .route("/resolution", get(control_routes::resolution))
        .with_state(state);
    with_common_layers(router)
}

/// Router for the stream listener (`PORT + 1`)
pub fn create_stream_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/stream", get(stream_routes::stream))
        .with_state(state);
    with_common_layers(router)
}

fn with_common_layers(router: Router) -> Router {
    router
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(TraceLayer::new_for_http())
}

/// 200 with the JSON "disabled" body, returned instead of an HTTP error
pub(crate) fn camera_disabled_response() -> Response {
    tracing::warn!("Camera is disabled, request rejected");
    Json(CameraDisabledResponse::default()).into_response()
}

/// Decoded query string. An empty query string is rejected outright.
pub(crate) struct QueryParams(HashMap<String, String>);

impl QueryParams {
    pub fn new(query: HashMap<String, String>) -> Result<Self> {
        if query.is_empty() {
            return Err(Error::MalformedRequest("empty query string".to_string()));
        }
        Ok(Self(query))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn required(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| Error::MalformedRequest(format!("missing query parameter '{}'", key)))
    }

    pub fn required_int(&self, key: &str) -> Result<i32> {
        self.required(key).map(atoi)
    }

    /// Absent parameters count as 0
    pub fn int_or_zero(&self, key: &str) -> i32 {
        self.get(key).map(atoi).unwrap_or(0)
    }
}

/// Run blocking driver work off the async workers
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_empty_query_rejected() {
        assert!(matches!(
            QueryParams::new(HashMap::new()),
            Err(Error::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_param_lookup() {
        let params = QueryParams::new(query(&[("reg", "0x12"), ("mask", "255")])).unwrap();
        // atoi stops at the 'x'
        assert_eq!(params.required_int("reg").unwrap(), 0);
        assert_eq!(params.required_int("mask").unwrap(), 255);
        assert_eq!(params.int_or_zero("val"), 0);
        assert!(params.required("val").is_err());
    }
}
