//! Order book feed client library
//!
//! Maintains a locally published order book from a streaming subscription
//! feed: one WebSocket connection at a time, subscription resync on
//! instrument change, idle shedding when nobody observes the book, and a
//! timer-driven flush that caps how often observers see a new book.

use std::sync::Arc;

pub mod config;
pub mod error;
pub mod feed;
pub mod instrument;
pub mod metrics;
pub mod orderbook;
pub mod protocol;
pub mod runtime;
pub mod websocket;
pub mod worker;

pub use config::Config;
pub use error::{FeedError, Result};
pub use feed::{FeedCommand, FeedEvent, FeedSession, FeedStatus};
pub use instrument::{Generation, Instrument, InstrumentChange, InstrumentSelection};
pub use metrics::FeedMetrics;
pub use orderbook::{BookLevel, BookObserver, BookView, ConsolidatedUpdate, Spread};
pub use protocol::{InboundFrame, SubscriptionFrame};
pub use runtime::{FeedHandle, FeedRuntime};
pub use websocket::{ConnectionId, ConnectionManager, LinkState, WsConnector};
pub use worker::{TransformDispatch, TransformJob, TransformWorker};

/// Application state shared across HTTP handlers
pub struct AppState {
    pub feed: FeedHandle,
    pub registry: prometheus::Registry,
    pub config: Arc<Config>,
}
