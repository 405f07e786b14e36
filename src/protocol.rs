//! Wire protocol for the book feed
//!
//! Outbound subscription frames and deserialization of inbound snapshots,
//! deltas and control events.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

use crate::error::{FeedError, Result};
use crate::instrument::Instrument;

/// Subscription request kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionEvent {
    Subscribe,
    Unsubscribe,
}

/// Outbound subscribe/unsubscribe frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionFrame {
    pub event: SubscriptionEvent,
    pub feed: String,
    pub product_ids: Vec<Instrument>,
}

impl SubscriptionFrame {
    pub fn subscribe(feed: &str, instrument: &Instrument) -> Self {
        Self {
            event: SubscriptionEvent::Subscribe,
            feed: feed.to_string(),
            product_ids: vec![instrument.clone()],
        }
    }

    pub fn unsubscribe(feed: &str, instrument: &Instrument) -> Self {
        Self {
            event: SubscriptionEvent::Unsubscribe,
            feed: feed.to_string(),
            product_ids: vec![instrument.clone()],
        }
    }

    /// Encode as a JSON text frame
    pub fn to_text(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| FeedError::Serialization(e.to_string()))
    }
}

/// Price level (price, size pair)
#[derive(Debug, Clone, PartialEq)]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: Decimal,
}

/// Full book for one product, sent right after subscribing
#[derive(Debug, Clone, Deserialize)]
pub struct BookSnapshot {
    pub product_id: Instrument,

    #[serde(rename = "numLevels", default)]
    pub num_levels: Option<usize>,

    #[serde(deserialize_with = "deserialize_price_levels")]
    pub bids: Vec<PriceLevel>,

    #[serde(deserialize_with = "deserialize_price_levels")]
    pub asks: Vec<PriceLevel>,
}

/// Incremental level changes; a size of zero removes the level
#[derive(Debug, Clone, Deserialize)]
pub struct BookDelta {
    pub product_id: Instrument,

    #[serde(default, deserialize_with = "deserialize_price_levels")]
    pub bids: Vec<PriceLevel>,

    #[serde(default, deserialize_with = "deserialize_price_levels")]
    pub asks: Vec<PriceLevel>,
}

/// Control event (info, subscribed, unsubscribed, alert, error)
#[derive(Debug, Clone, Deserialize)]
pub struct ControlEvent {
    pub event: String,

    #[serde(default)]
    pub feed: Option<String>,

    #[serde(default)]
    pub product_ids: Vec<Instrument>,

    #[serde(default)]
    pub message: Option<String>,
}

/// Parsed inbound frame
#[derive(Debug, Clone)]
pub enum InboundFrame {
    Snapshot(BookSnapshot),
    Delta(BookDelta),
    Control(ControlEvent),
    Unknown(String),
}

impl InboundFrame {
    /// Parse a raw text frame published on `feed`
    pub fn parse(raw: &str, feed: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)?;

        if value.get("event").is_some() {
            let control: ControlEvent = serde_json::from_value(value)?;
            return Ok(InboundFrame::Control(control));
        }

        let frame_feed = value.get("feed").and_then(|f| f.as_str()).unwrap_or_default();
        if frame_feed.is_empty() {
            return Ok(InboundFrame::Unknown(raw.to_string()));
        }

        if frame_feed == snapshot_feed(feed) {
            let snapshot: BookSnapshot = serde_json::from_value(value)?;
            Ok(InboundFrame::Snapshot(snapshot))
        } else if frame_feed == feed {
            let delta: BookDelta = serde_json::from_value(value)?;
            Ok(InboundFrame::Delta(delta))
        } else {
            Ok(InboundFrame::Unknown(raw.to_string()))
        }
    }
}

fn snapshot_feed(feed: &str) -> String {
    format!("{}_snapshot", feed)
}

/// Custom deserializer for price levels from `[[price, size], ...]`
///
/// Prices and sizes arrive as JSON numbers; numeric strings are accepted too.
fn deserialize_price_levels<'de, D>(deserializer: D) -> std::result::Result<Vec<PriceLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Vec<serde_json::Value>> = Deserialize::deserialize(deserializer)?;
    raw.into_iter()
        .map(|pair| {
            if pair.len() != 2 {
                return Err(serde::de::Error::custom("Invalid price level format"));
            }
            Ok(PriceLevel {
                price: decimal_from_value(&pair[0]).map_err(serde::de::Error::custom)?,
                size: decimal_from_value(&pair[1]).map_err(serde::de::Error::custom)?,
            })
        })
        .collect()
}

fn decimal_from_value(value: &serde_json::Value) -> std::result::Result<Decimal, String> {
    match value {
        serde_json::Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .map_err(|e| e.to_string()),
        serde_json::Value::String(s) => Decimal::from_str(s).map_err(|e| e.to_string()),
        other => Err(format!("expected number, got {}", other)),
    }
}
