//! Latest-wins update buffer and the timer-driven flush
//!
//! Bursts of consolidated updates collapse into at most one published state
//! transition per flush tick.

use tracing::{debug, trace};

use crate::orderbook::{BookObserver, BookView, ConsolidatedUpdate, SharedBookState};

/// Holds at most one pending update
#[derive(Debug, Default)]
pub struct UpdateBuffer {
    pending: Option<ConsolidatedUpdate>,
}

impl UpdateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an update, overwriting any unconsumed one
    ///
    /// Returns true when a pending update was superseded.
    pub fn store(&mut self, update: ConsolidatedUpdate) -> bool {
        self.pending.replace(update).is_some()
    }

    pub fn take(&mut self) -> Option<ConsolidatedUpdate> {
        self.pending.take()
    }

    /// Drop the pending update; returns whether there was one
    pub fn clear(&mut self) -> bool {
        self.pending.take().is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_none()
    }

    pub fn pending(&self) -> Option<&ConsolidatedUpdate> {
        self.pending.as_ref()
    }
}

/// Result of one flush tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Buffered update merged into the published book
    Published,
    /// Buffered update consumed but it changed no field
    Unchanged,
    /// Nothing buffered
    Idle,
    /// Connection not open; the buffered update is kept
    Held,
}

/// Owns the buffer and is the only writer of the published book
#[derive(Debug, Default)]
pub struct FlushScheduler {
    buffer: UpdateBuffer,
    book: SharedBookState,
}

impl FlushScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer a consolidated update; returns true if one was superseded
    pub fn store(&mut self, update: ConsolidatedUpdate) -> bool {
        let superseded = self.buffer.store(update);
        if superseded {
            trace!("Buffered update superseded");
        }
        superseded
    }

    /// Publish the buffered update if the connection is open
    pub fn tick(&mut self, connection_open: bool) -> FlushOutcome {
        if !connection_open {
            return if self.buffer.is_empty() {
                FlushOutcome::Idle
            } else {
                FlushOutcome::Held
            };
        }

        match self.buffer.take() {
            Some(update) => {
                if self.book.merge(update) {
                    debug!("Published buffered book update");
                    FlushOutcome::Published
                } else {
                    FlushOutcome::Unchanged
                }
            }
            None => FlushOutcome::Idle,
        }
    }

    /// Drop pending work and the published levels of the old instrument
    pub fn reset_for_instrument_change(&mut self) {
        if self.buffer.clear() {
            debug!("Discarded buffered update on instrument change");
        }
        self.book.clear_levels();
    }

    pub fn buffer(&self) -> &UpdateBuffer {
        &self.buffer
    }

    pub fn observe(&self) -> BookObserver {
        self.book.observe()
    }

    pub fn current(&self) -> BookView {
        self.book.current()
    }
}
