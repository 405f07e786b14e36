//! Level book folded from feed snapshots and deltas
//!
//! Uses BTreeMap for sorted price level management.

use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::BTreeMap;

use super::{BookLevel, ConsolidatedUpdate, Side, Spread};
use crate::instrument::Instrument;
use crate::protocol::{BookDelta, BookSnapshot, PriceLevel};

/// Order book for a single product
#[derive(Debug)]
pub struct LevelBook {
    product: Option<Instrument>,
    /// Bids sorted by price descending (highest first)
    bids: BTreeMap<Reverse<Decimal>, Decimal>,
    /// Asks sorted by price ascending (lowest first)
    asks: BTreeMap<Decimal, Decimal>,
    /// Maximum depth levels to maintain
    max_depth: usize,
}

impl LevelBook {
    /// Create a new empty order book
    pub fn new(max_depth: usize) -> Self {
        Self {
            product: None,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            max_depth,
        }
    }

    /// Replace the whole book with a snapshot
    pub fn apply_snapshot(&mut self, snapshot: &BookSnapshot) {
        self.bids.clear();
        self.asks.clear();

        for level in &snapshot.bids {
            if level.size > Decimal::ZERO {
                self.bids.insert(Reverse(level.price), level.size);
            }
        }

        for level in &snapshot.asks {
            if level.size > Decimal::ZERO {
                self.asks.insert(level.price, level.size);
            }
        }

        self.product = Some(snapshot.product_id.clone());
        self.trim_depth();
    }

    /// Apply a delta
    ///
    /// Returns false if the book has no snapshot yet or the delta is for
    /// another product.
    pub fn apply_delta(&mut self, delta: &BookDelta) -> bool {
        match &self.product {
            Some(product) if *product == delta.product_id => {}
            _ => return false,
        }

        for level in &delta.bids {
            self.update_side(Side::Bid, level);
        }

        for level in &delta.asks {
            self.update_side(Side::Ask, level);
        }

        self.trim_depth();
        true
    }

    fn update_side(&mut self, side: Side, level: &PriceLevel) {
        match side {
            Side::Bid => {
                if level.size.is_zero() {
                    self.bids.remove(&Reverse(level.price));
                } else {
                    self.bids.insert(Reverse(level.price), level.size);
                }
            }
            Side::Ask => {
                if level.size.is_zero() {
                    self.asks.remove(&level.price);
                } else {
                    self.asks.insert(level.price, level.size);
                }
            }
        }
    }

    fn trim_depth(&mut self) {
        while self.bids.len() > self.max_depth {
            self.bids.pop_last();
        }
        while self.asks.len() > self.max_depth {
            self.asks.pop_last();
        }
    }

    /// Drop all levels and forget the product
    pub fn clear(&mut self) {
        self.product = None;
        self.bids.clear();
        self.asks.clear();
    }

    pub fn product(&self) -> Option<&Instrument> {
        self.product.as_ref()
    }

    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first_key_value().map(|(Reverse(p), _)| *p)
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first_key_value().map(|(p, _)| *p)
    }

    /// Spread between best ask and best bid, as value and percent of the ask
    pub fn spread(&self) -> Option<Spread> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) if ask > Decimal::ZERO => {
                let value = ask - bid;
                Some(Spread {
                    value,
                    percent: (value / ask * Decimal::ONE_HUNDRED).round_dp(4),
                })
            }
            _ => None,
        }
    }

    /// Consolidated view with cumulative totals, best price first
    pub fn consolidated(&self) -> ConsolidatedUpdate {
        let asks = accumulate(self.asks.iter().map(|(p, s)| (*p, *s)));
        let bids = accumulate(self.bids.iter().map(|(Reverse(p), s)| (*p, *s)));

        let highest_total = asks
            .last()
            .map(|l| l.total)
            .into_iter()
            .chain(bids.last().map(|l| l.total))
            .max()
            .unwrap_or(Decimal::ZERO);

        ConsolidatedUpdate {
            asks,
            bids,
            spread: self.spread(),
            highest_total,
        }
    }
}

fn accumulate(levels: impl Iterator<Item = (Decimal, Decimal)>) -> Vec<BookLevel> {
    let mut total = Decimal::ZERO;
    levels
        .map(|(price, size)| {
            total += size;
            BookLevel { price, size, total }
        })
        .collect()
}
