//! Configuration module for the order book feed

use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::error::{FeedError, Result};
use crate::instrument::{first_duplicate, Instrument};

const DEFAULT_WS_ENDPOINT: &str = "wss://www.cryptofacilities.com/ws/v1";
const DEFAULT_INSTRUMENTS: &str = "PI_XBTUSD,PI_ETHUSD";
const DEFAULT_FEED: &str = "book_ui_1";

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// WebSocket endpoint of the book feed
    pub ws_endpoint: String,

    /// Selectable instruments; the first one is subscribed at startup
    pub instruments: Vec<Instrument>,

    /// Feed name used in subscribe/unsubscribe frames
    pub feed: String,

    /// Period of the flush timer that publishes buffered book updates
    pub flush_interval_ms: u64,

    /// Order book depth levels kept per side by the transform
    pub depth_levels: usize,

    /// Port of the control and health HTTP server
    pub http_port: u16,

    /// Close the connection when the consumer stops observing the book
    pub close_on_hidden: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let instruments = parse_instruments(
            &env::var("INSTRUMENTS").unwrap_or_else(|_| DEFAULT_INSTRUMENTS.to_string()),
        );

        let config = Self {
            ws_endpoint: env::var("WS_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_WS_ENDPOINT.to_string()),
            instruments,
            feed: env::var("FEED_NAME").unwrap_or_else(|_| DEFAULT_FEED.to_string()),
            flush_interval_ms: env::var("FLUSH_INTERVAL_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
            depth_levels: env::var("DEPTH_LEVELS")
                .unwrap_or_else(|_| "25".to_string())
                .parse()
                .unwrap_or(25),
            http_port: env::var("HTTP_PORT")
                .unwrap_or_else(|_| "9090".to_string())
                .parse()
                .unwrap_or(9090),
            close_on_hidden: env::var("CLOSE_ON_HIDDEN")
                .map(|v| !matches!(v.trim().to_lowercase().as_str(), "0" | "false" | "no"))
                .unwrap_or(true),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the feed cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.instruments.is_empty() {
            return Err(FeedError::Config(
                "at least one instrument is required".to_string(),
            ));
        }
        if let Some(duplicate) = first_duplicate(&self.instruments) {
            return Err(FeedError::Config(format!(
                "instrument {} is listed more than once",
                duplicate
            )));
        }
        if self.flush_interval_ms == 0 {
            return Err(FeedError::Config(
                "flush interval must be greater than zero".to_string(),
            ));
        }
        if self.depth_levels == 0 {
            return Err(FeedError::Config(
                "depth levels must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_endpoint: DEFAULT_WS_ENDPOINT.to_string(),
            instruments: parse_instruments(DEFAULT_INSTRUMENTS),
            feed: DEFAULT_FEED.to_string(),
            flush_interval_ms: 1000,
            depth_levels: 25,
            http_port: 9090,
            close_on_hidden: true,
        }
    }
}

fn parse_instruments(raw: &str) -> Vec<Instrument> {
    raw.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(Instrument::normalized)
        .collect()
}
