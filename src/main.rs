//! Order book feed - control server and live book publisher
//!
//! Connects to the book feed, keeps the published book current and exposes
//! health, metrics, the book itself and the feed controls over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, Registry, TextEncoder};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use orderbook_feed::{AppState, BookView, Config, FeedRuntime, FeedStatus, Instrument};

type SharedState = Arc<AppState>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting order book feed");

    let config = Arc::new(Config::load()?);
    info!(
        instruments = ?config.instruments,
        flush_interval_ms = config.flush_interval_ms,
        "Configuration loaded"
    );

    let registry = Registry::new();
    let (feed, session_task) = FeedRuntime::start(&config, &registry)?;

    let state = Arc::new(AppState {
        feed: feed.clone(),
        registry,
        config: config.clone(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    info!(addr = %addr, "Starting control server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Err(e) = feed.shutdown() {
        warn!(error = %e, "Feed session already stopped");
    }
    session_task.await?;

    Ok(())
}

fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/book", get(book))
        .route("/status", get(status))
        .route("/reconnect", post(reconnect))
        .route("/instrument", post(select_instrument))
        .route("/instrument/toggle", post(toggle_instrument))
        .route("/visibility", post(visibility))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for ctrl-c");
    }
    info!("Shutdown signal received");
}

async fn health_check(State(state): State<SharedState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "component": "orderbook-feed",
        "connected": state.feed.connected(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics(State(state): State<SharedState>) -> Result<String, StatusCode> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&state.registry.gather(), &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn book(State(state): State<SharedState>) -> Json<BookView> {
    Json(state.feed.book_view())
}

async fn status(State(state): State<SharedState>) -> Json<FeedStatus> {
    Json(state.feed.status())
}

async fn reconnect(State(state): State<SharedState>) -> StatusCode {
    command_status(state.feed.reconnect())
}

async fn toggle_instrument(State(state): State<SharedState>) -> StatusCode {
    command_status(state.feed.toggle_instrument())
}

#[derive(Debug, Deserialize)]
struct SelectInstrument {
    product_id: Instrument,
}

async fn select_instrument(
    State(state): State<SharedState>,
    Json(body): Json<SelectInstrument>,
) -> StatusCode {
    let requested = Instrument::normalized(body.product_id.as_str());
    if !state.config.instruments.contains(&requested) {
        return StatusCode::NOT_FOUND;
    }
    command_status(state.feed.select_instrument(requested))
}

#[derive(Debug, Deserialize)]
struct Visibility {
    visible: bool,
}

async fn visibility(State(state): State<SharedState>, Json(body): Json<Visibility>) -> StatusCode {
    command_status(state.feed.set_visibility(body.visible))
}

fn command_status(result: orderbook_feed::Result<()>) -> StatusCode {
    match result {
        Ok(()) => StatusCode::ACCEPTED,
        Err(e) => {
            warn!(error = %e, "Feed command failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
