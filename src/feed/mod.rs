//! Feed core
//!
//! Everything that reacts to the feed runs on one event loop: transport
//! events, transform results, flush ticks and consumer commands are all
//! [`FeedEvent`]s handled in order by a single [`FeedSession`].

mod buffer;
mod session;
mod subscription;
mod visibility;

pub use buffer::{FlushOutcome, FlushScheduler, UpdateBuffer};
pub use session::{FeedSession, FeedStatus};
pub use subscription::SubscriptionController;
pub use visibility::{GateAction, VisibilityGate, VisibilityState};

use crate::instrument::{Generation, Instrument};
use crate::orderbook::ConsolidatedUpdate;
use crate::websocket::TransportEvent;
use crate::worker::TransformOutput;

/// Consumer-issued command
#[derive(Debug, Clone, PartialEq)]
pub enum FeedCommand {
    Reconnect,
    ToggleInstrument,
    SelectInstrument(Instrument),
    /// Consumer visibility signal: true while the book is being observed
    Visibility(bool),
    Shutdown,
}

/// Input of the feed event loop
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Transport(TransportEvent),
    Transformed {
        generation: Generation,
        update: ConsolidatedUpdate,
    },
    Tick,
    Command(FeedCommand),
}

impl From<TransportEvent> for FeedEvent {
    fn from(event: TransportEvent) -> Self {
        FeedEvent::Transport(event)
    }
}

impl From<TransformOutput> for FeedEvent {
    fn from(output: TransformOutput) -> Self {
        FeedEvent::Transformed {
            generation: output.generation,
            update: output.update,
        }
    }
}

impl From<FeedCommand> for FeedEvent {
    fn from(command: FeedCommand) -> Self {
        FeedEvent::Command(command)
    }
}
