//! Runtime wiring and the consumer-facing feed handle

use prometheus::Registry;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::Config;
use crate::error::{FeedError, Result};
use crate::feed::{FeedCommand, FeedEvent, FeedSession, FeedStatus};
use crate::instrument::Instrument;
use crate::metrics::FeedMetrics;
use crate::orderbook::{BookObserver, BookView, LevelBookTransform};
use crate::websocket::WsConnector;
use crate::worker::TransformWorker;

/// Cloneable handle used by the presentation layer
#[derive(Clone)]
pub struct FeedHandle {
    events: mpsc::UnboundedSender<FeedEvent>,
    status: watch::Receiver<FeedStatus>,
    book: BookObserver,
}

impl FeedHandle {
    pub fn new(
        events: mpsc::UnboundedSender<FeedEvent>,
        status: watch::Receiver<FeedStatus>,
        book: BookObserver,
    ) -> Self {
        Self {
            events,
            status,
            book,
        }
    }

    pub fn connected(&self) -> bool {
        self.status.borrow().connected
    }

    pub fn status(&self) -> FeedStatus {
        self.status.borrow().clone()
    }

    /// Replace the connection with a fresh one and resubscribe on open
    pub fn reconnect(&self) -> Result<()> {
        self.command(FeedCommand::Reconnect)
    }

    pub fn toggle_instrument(&self) -> Result<()> {
        self.command(FeedCommand::ToggleInstrument)
    }

    pub fn select_instrument(&self, instrument: Instrument) -> Result<()> {
        self.command(FeedCommand::SelectInstrument(instrument))
    }

    /// Report whether the consumer is currently observing the book
    pub fn set_visibility(&self, visible: bool) -> Result<()> {
        self.command(FeedCommand::Visibility(visible))
    }

    pub fn shutdown(&self) -> Result<()> {
        self.command(FeedCommand::Shutdown)
    }

    /// Observer of the published book
    pub fn book(&self) -> BookObserver {
        self.book.clone()
    }

    pub fn book_view(&self) -> BookView {
        self.book.borrow().clone()
    }

    fn command(&self, command: FeedCommand) -> Result<()> {
        self.events
            .send(command.into())
            .map_err(|_| FeedError::ChannelClosed)
    }
}

/// Starts the feed pipeline on the current tokio runtime
pub struct FeedRuntime;

impl FeedRuntime {
    /// Open the single initial connection, start the transform worker and
    /// spawn the session loop
    pub fn start(config: &Config, registry: &Registry) -> Result<(FeedHandle, JoinHandle<()>)> {
        config.validate()?;

        let metrics = FeedMetrics::new(registry)
            .map_err(|e| FeedError::Config(format!("metrics registration failed: {}", e)))?;

        let (tx, rx) = mpsc::unbounded_channel::<FeedEvent>();

        let transform = LevelBookTransform::new(&config.feed, config.depth_levels);
        let worker = TransformWorker::spawn(transform, tx.clone())?;
        let connector = WsConnector::new(tx.clone());

        let session = FeedSession::new(config, connector, worker, metrics)?;
        let handle = FeedHandle::new(tx, session.status(), session.book());

        info!(
            endpoint = %config.ws_endpoint,
            instrument = %session.current_instrument(),
            "Feed runtime started"
        );

        let task = tokio::spawn(session.run(rx, config.flush_interval()));
        Ok((handle, task))
    }
}
