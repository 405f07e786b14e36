//! Instrument selection
//!
//! Exactly one instrument is current at a time. Every change bumps the
//! selection generation, which tags in-flight transform work so results
//! computed for a previous instrument can be recognised and dropped.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{FeedError, Result};

/// Opaque product identifier as used by the feed (e.g. `PI_XBTUSD`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Instrument(String);

impl Instrument {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse a product id the way configuration spells it
    pub fn normalized(raw: &str) -> Self {
        Self(raw.trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// First instrument listed more than once, if any
pub fn first_duplicate(instruments: &[Instrument]) -> Option<&Instrument> {
    let mut seen = HashSet::new();
    instruments.iter().find(|i| !seen.insert(*i))
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Instrument-selection epoch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Generation(u64);

impl Generation {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A change of the selected instrument
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentChange {
    pub previous: Instrument,
    pub current: Instrument,
    pub generation: Generation,
}

/// The currently selected instrument out of a fixed set
#[derive(Debug, Clone)]
pub struct InstrumentSelection {
    available: Vec<Instrument>,
    current: usize,
    generation: Generation,
}

impl InstrumentSelection {
    /// Create a selection starting at the first available instrument
    pub fn new(available: Vec<Instrument>) -> Result<Self> {
        if available.is_empty() {
            return Err(FeedError::Config(
                "instrument selection needs at least one instrument".to_string(),
            ));
        }
        if let Some(duplicate) = first_duplicate(&available) {
            return Err(FeedError::Config(format!(
                "instrument {} is listed more than once",
                duplicate
            )));
        }
        Ok(Self {
            available,
            current: 0,
            generation: Generation::default(),
        })
    }

    pub fn current(&self) -> &Instrument {
        &self.available[self.current]
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Select a specific instrument
    ///
    /// Matched after the same normalisation configured ids get. Returns
    /// `None` when the instrument is already current.
    pub fn select(&mut self, instrument: &Instrument) -> Result<Option<InstrumentChange>> {
        let wanted = Instrument::normalized(instrument.as_str());
        let index = self
            .available
            .iter()
            .position(|i| *i == wanted)
            .ok_or_else(|| FeedError::UnknownInstrument(instrument.to_string()))?;

        Ok(self.switch_to(index))
    }

    /// Advance to the next instrument, wrapping around
    pub fn toggle(&mut self) -> Option<InstrumentChange> {
        let next = (self.current + 1) % self.available.len();
        self.switch_to(next)
    }

    fn switch_to(&mut self, index: usize) -> Option<InstrumentChange> {
        if self.available[index] == *self.current() {
            return None;
        }

        let previous = self.current().clone();
        self.current = index;
        self.generation = self.generation.next();

        Some(InstrumentChange {
            previous,
            current: self.current().clone(),
            generation: self.generation,
        })
    }
}
