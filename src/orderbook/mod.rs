//! Order book module
//!
//! Consolidated book representation shared between the transform worker,
//! the update buffer and the published book state.

mod book;
mod state;
mod transform;

pub use book::LevelBook;
pub use state::{BookObserver, SharedBookState};
pub use transform::{BookTransform, LevelBookTransform};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

/// A single consolidated level: price, size and cumulative size from the best price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub size: Decimal,
    pub total: Decimal,
}

/// Distance between best ask and best bid
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Spread {
    pub value: Decimal,
    /// Spread as a percentage of the best ask
    pub percent: Decimal,
}

/// Fully-formed book view produced by the transform
///
/// Fields are partial: an empty side, a missing spread or a zero highest
/// total mean "no change" when merged into the published state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedUpdate {
    pub asks: Vec<BookLevel>,
    pub bids: Vec<BookLevel>,
    pub spread: Option<Spread>,
    pub highest_total: Decimal,
}

impl ConsolidatedUpdate {
    /// True when merging would change nothing
    pub fn is_empty(&self) -> bool {
        self.asks.is_empty()
            && self.bids.is_empty()
            && self.spread.is_none()
            && self.highest_total.is_zero()
    }
}

/// Published order book view read by observers
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BookView {
    pub asks: Vec<BookLevel>,
    pub bids: Vec<BookLevel>,
    pub spread: Spread,
    pub highest_total: Decimal,
    pub updated_at: Option<DateTime<Utc>>,
}
