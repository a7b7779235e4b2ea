//! camhttpd - HTTP camera server
//!
//! Main entry point: control listener on `PORT`, stream listener on `PORT + 1`.

use camhttpd::{
    camera_driver::{SimulatedCamera, SimulatedCameraConfig},
    device_lifecycle::{run_restart, DeviceRestart, ProcessExit},
    illumination::SimulatedLed,
    preferences::FilePreferences,
    state::{AppConfig, AppState},
    web_api,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "camhttpd=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting camhttpd v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        host = %config.host,
        port = config.port,
        stream_port = config.stream_port(),
        pixel_format = %config.pixel_format,
        frame_size = ?config.frame_size,
        preferences = %config.preferences_path.display(),
        "Configuration loaded"
    );

    // Initialize components
    let camera = Arc::new(SimulatedCamera::new(SimulatedCameraConfig {
        pixel_format: config.pixel_format,
        frame_size: config.frame_size,
        ..Default::default()
    }));
    let led = Arc::new(SimulatedLed::new());
    let preferences = Arc::new(FilePreferences::open(&config.preferences_path)?);

    let state = AppState::new(config.clone(), camera, led, preferences);

    // Restart is performed here, never inside a request handler
    let device: Arc<dyn DeviceRestart> = Arc::new(ProcessExit::default());
    tokio::spawn(run_restart(state.restart.clone(), config.restart_delay, device));

    let control_app = web_api::create_control_router(state.clone());
    let stream_app = web_api::create_stream_router(state.clone());

    // Start servers
    let control_addr = format!("{}:{}", config.host, config.port);
    let control_listener = tokio::net::TcpListener::bind(&control_addr).await?;
    tracing::info!("Control server listening on {}", control_addr);

    let stream_addr = format!("{}:{}", config.host, config.stream_port());
    let stream_listener = tokio::net::TcpListener::bind(&stream_addr).await?;
    tracing::info!("Stream server listening on {}", stream_addr);

    tokio::try_join!(
        async { axum::serve(control_listener, control_app).await },
        async { axum::serve(stream_listener, stream_app).await },
    )?;

    Ok(())
}
