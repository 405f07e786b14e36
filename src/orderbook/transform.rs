//! Raw feed message to consolidated update transform

use tracing::{debug, trace, warn};

use super::{ConsolidatedUpdate, LevelBook};
use crate::error::Result;
use crate::protocol::InboundFrame;

/// Folds raw feed messages into consolidated book updates
///
/// Runs on the transform worker, never on the event loop.
pub trait BookTransform: Send + 'static {
    /// Returns `None` when the message carries no book change.
    fn transform(&mut self, raw: &str) -> Result<Option<ConsolidatedUpdate>>;

    /// Forget all folded state
    fn reset(&mut self);
}

/// Default transform backed by a [`LevelBook`]
pub struct LevelBookTransform {
    feed: String,
    book: LevelBook,
}

impl LevelBookTransform {
    pub fn new(feed: &str, max_depth: usize) -> Self {
        Self {
            feed: feed.to_string(),
            book: LevelBook::new(max_depth),
        }
    }
}

impl BookTransform for LevelBookTransform {
    fn transform(&mut self, raw: &str) -> Result<Option<ConsolidatedUpdate>> {
        match InboundFrame::parse(raw, &self.feed)? {
            InboundFrame::Snapshot(snapshot) => {
                debug!(
                    product = %snapshot.product_id,
                    bids = snapshot.bids.len(),
                    asks = snapshot.asks.len(),
                    "Book snapshot received"
                );
                self.book.apply_snapshot(&snapshot);
                Ok(Some(self.book.consolidated()))
            }
            InboundFrame::Delta(delta) => {
                if self.book.apply_delta(&delta) {
                    Ok(Some(self.book.consolidated()))
                } else {
                    trace!(product = %delta.product_id, "Delta without matching snapshot");
                    Ok(None)
                }
            }
            InboundFrame::Control(control) => {
                match control.event.as_str() {
                    "alert" | "error" => {
                        warn!(event = %control.event, message = ?control.message, "Feed alert")
                    }
                    _ => debug!(
                        event = %control.event,
                        products = ?control.product_ids,
                        "Feed control event"
                    ),
                }
                Ok(None)
            }
            InboundFrame::Unknown(_) => Ok(None),
        }
    }

    fn reset(&mut self) {
        self.book.clear();
    }
}
