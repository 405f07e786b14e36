//! Subscription controller
//!
//! Derives subscribe/unsubscribe frames from the selected instrument and
//! re-synchronises the remote subscription when the selection changes.

use tracing::debug;

use crate::instrument::{Instrument, InstrumentChange};
use crate::protocol::SubscriptionFrame;

pub struct SubscriptionController {
    feed: String,
    /// Last instrument the controller has seen; `None` until the baseline is set
    baseline: Option<Instrument>,
}

impl SubscriptionController {
    pub fn new(feed: &str) -> Self {
        Self {
            feed: feed.to_string(),
            baseline: None,
        }
    }

    pub fn subscribe_message(&self, instrument: &Instrument) -> SubscriptionFrame {
        SubscriptionFrame::subscribe(&self.feed, instrument)
    }

    pub fn unsubscribe_message(&self, instrument: &Instrument) -> SubscriptionFrame {
        SubscriptionFrame::unsubscribe(&self.feed, instrument)
    }

    /// Record the first observed instrument without producing any frames
    pub fn establish(&mut self, instrument: &Instrument) {
        if self.baseline.is_none() {
            self.baseline = Some(instrument.clone());
        }
    }

    /// Frame to send once a connection opens
    pub fn on_open(&mut self, current: &Instrument) -> SubscriptionFrame {
        self.establish(current);
        self.subscribe_message(current)
    }

    /// Frames that move the remote subscription to the new instrument,
    /// unsubscribe first
    ///
    /// The first observed value only sets the baseline; a change back to
    /// the instrument already observed produces nothing.
    pub fn resync(&mut self, change: &InstrumentChange) -> Option<[SubscriptionFrame; 2]> {
        match &self.baseline {
            None => {
                self.baseline = Some(change.current.clone());
                return None;
            }
            Some(observed) if *observed == change.current => return None,
            Some(_) => {}
        }

        debug!(
            previous = %change.previous,
            current = %change.current,
            generation = %change.generation,
            "Resynchronising subscription"
        );
        self.baseline = Some(change.current.clone());

        Some([
            self.unsubscribe_message(&change.previous),
            self.subscribe_message(&change.current),
        ])
    }
}
