use anyhow::{anyhow, Context, Result};
use stallsense::api::{create_sensor_router, create_ws_router, SensorAppState, WsAppState};
use stallsense::config::{load_config, StallSenseConfig};
use stallsense::directory::SensorDirectory;
use stallsense::engine::ReconcileEngine;
use stallsense::mqtt::MqttClient;
use stallsense::reset::ResetCoordinator;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stallsense=info".into()),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => load_config(&path)
            .map_err(|e| anyhow!("Failed to load config from {}: {}", path, e))?,
        None => StallSenseConfig::default(),
    };

    info!("StallSense server starting...");

    let directory = Arc::new(
        SensorDirectory::open(&config.directory.db_path)
            .context("Failed to open sensor directory")?,
    );
    let engine = Arc::new(ReconcileEngine::new(
        Arc::clone(&directory),
        config.classifier.firmware_tag.clone(),
    ));

    // MQTT: the event loop subscribes to everything on connect, the engine
    // classifies downstream
    let mqtt = MqttClient::new(&config.mqtt);
    let publisher = Arc::new(mqtt.publisher());

    let (msg_tx, msg_rx) = mpsc::channel(256);
    tokio::spawn(mqtt.run(msg_tx));
    tokio::spawn(Arc::clone(&engine).run(msg_rx));

    let reset = Arc::new(ResetCoordinator::new(Arc::clone(&directory), publisher));

    // HTTP/WebSocket API
    let sensor_state = Arc::new(SensorAppState {
        directory: Arc::clone(&directory),
        reset,
    });
    let ws_state = Arc::new(WsAppState {
        engine: Arc::clone(&engine),
    });

    let app = create_sensor_router(sensor_state)
        .merge(create_ws_router(ws_state))
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.api.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.api.bind_addr))?;
    info!(addr = %config.api.bind_addr, "HTTP API listening");

    axum::serve(listener, app).await.context("HTTP server failed")?;

    Ok(())
}
