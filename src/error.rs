//! Error types for the order book feed

use thiserror::Error;

/// Order book feed errors
#[derive(Error, Debug)]
pub enum FeedError {
    #[error("WebSocket connection error: {0}")]
    WebSocketConnection(String),

    #[error("WebSocket message error: {0}")]
    WebSocketMessage(String),

    #[error("Failed to parse message: {0}")]
    Parse(String),

    #[error("Not connected: frame dropped")]
    NotConnected,

    #[error("Transform worker error: {0}")]
    Worker(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("Feed event channel closed")]
    ChannelClosed,
}

impl From<tokio_tungstenite::tungstenite::Error> for FeedError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        FeedError::WebSocketConnection(err.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(err: serde_json::Error) -> Self {
        FeedError::Parse(err.to_string())
    }
}

impl From<std::io::Error> for FeedError {
    fn from(err: std::io::Error) -> Self {
        FeedError::Worker(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;
