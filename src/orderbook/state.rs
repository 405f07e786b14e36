//! Shared book state
//!
//! The published view lives in a `watch` channel: any number of observers
//! read the latest value, and the flush scheduler is the only writer.

use chrono::Utc;
use tokio::sync::watch;

use super::{BookView, ConsolidatedUpdate};

/// Read-only handle on the published book
pub type BookObserver = watch::Receiver<BookView>;

/// Published order book, written only through [`SharedBookState::merge`]
/// and [`SharedBookState::clear_levels`]
#[derive(Debug)]
pub struct SharedBookState {
    tx: watch::Sender<BookView>,
}

impl SharedBookState {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(BookView::default());
        Self { tx }
    }

    /// New observer of the published book
    pub fn observe(&self) -> BookObserver {
        self.tx.subscribe()
    }

    /// Copy of the current view
    pub fn current(&self) -> BookView {
        self.tx.borrow().clone()
    }

    /// Merge a partial update field by field
    ///
    /// Empty sides, a missing spread and a zero highest total leave the
    /// published value untouched. Returns whether anything changed.
    pub fn merge(&self, update: ConsolidatedUpdate) -> bool {
        if update.is_empty() {
            return false;
        }

        self.tx.send_if_modified(|view| {
            let mut changed = false;

            if !update.asks.is_empty() {
                view.asks = update.asks;
                changed = true;
            }
            if !update.bids.is_empty() {
                view.bids = update.bids;
                changed = true;
            }
            if let Some(spread) = update.spread {
                view.spread = spread;
                changed = true;
            }
            if !update.highest_total.is_zero() {
                view.highest_total = update.highest_total;
                changed = true;
            }

            if changed {
                view.updated_at = Some(Utc::now());
            }
            changed
        })
    }

    /// Empty both sides, keeping spread and highest total
    pub fn clear_levels(&self) {
        self.tx.send_if_modified(|view| {
            if view.asks.is_empty() && view.bids.is_empty() {
                return false;
            }
            view.asks.clear();
            view.bids.clear();
            view.updated_at = Some(Utc::now());
            true
        });
    }
}

impl Default for SharedBookState {
    fn default() -> Self {
        Self::new()
    }
}
