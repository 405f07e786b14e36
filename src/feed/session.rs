//! Feed session: the single event loop tying the pipeline together

use serde::Serialize;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{
    FeedCommand, FeedEvent, FlushOutcome, FlushScheduler, GateAction, SubscriptionController,
    VisibilityGate,
};
use crate::config::Config;
use crate::error::{FeedError, Result};
use crate::instrument::{Generation, Instrument, InstrumentChange, InstrumentSelection};
use crate::metrics::FeedMetrics;
use crate::orderbook::{BookObserver, BookView, ConsolidatedUpdate};
use crate::protocol::SubscriptionFrame;
use crate::websocket::{ConnectionManager, Connector, LinkState, TransportEvent};
use crate::worker::{TransformDispatch, TransformJob};

/// Connection and selection status published to consumers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedStatus {
    pub connected: bool,
    pub instrument: Instrument,
    pub generation: Generation,
}

/// Owns every piece of feed state; mutated only from its event loop
pub struct FeedSession<C: Connector, D: TransformDispatch> {
    connection: ConnectionManager<C>,
    selection: InstrumentSelection,
    subscriptions: SubscriptionController,
    visibility: VisibilityGate,
    scheduler: FlushScheduler,
    worker: D,
    metrics: FeedMetrics,
    status: watch::Sender<FeedStatus>,
}

impl<C: Connector, D: TransformDispatch> FeedSession<C, D> {
    /// Build the session and open the initial connection
    pub fn new(config: &Config, connector: C, worker: D, metrics: FeedMetrics) -> Result<Self> {
        config.validate()?;

        let selection = InstrumentSelection::new(config.instruments.clone())?;
        let mut subscriptions = SubscriptionController::new(&config.feed);
        subscriptions.establish(selection.current());

        let connection = ConnectionManager::new(connector, &config.ws_endpoint);
        metrics.connected.set(1);

        let (status, _) = watch::channel(FeedStatus {
            connected: connection.state() == LinkState::Connected,
            instrument: selection.current().clone(),
            generation: selection.generation(),
        });

        Ok(Self {
            connection,
            selection,
            subscriptions,
            visibility: VisibilityGate::new(config.close_on_hidden),
            scheduler: FlushScheduler::new(),
            worker,
            metrics,
            status,
        })
    }

    /// Handle one event; breaks on shutdown
    pub fn handle(&mut self, event: FeedEvent) -> ControlFlow<()> {
        match event {
            FeedEvent::Transport(event) => self.on_transport(event),
            FeedEvent::Transformed { generation, update } => self.on_transformed(generation, update),
            FeedEvent::Tick => {
                self.on_tick();
            }
            FeedEvent::Command(command) => return self.on_command(command),
        }
        ControlFlow::Continue(())
    }

    /// Drive the session until shutdown
    ///
    /// The flush timer starts once and keeps ticking while disconnected;
    /// ticks then simply publish nothing.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<FeedEvent>, period: Duration) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        info!(period_ms = period.as_millis() as u64, "Feed session running");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.on_tick();
                }
                event = events.recv() => match event {
                    Some(event) => {
                        if self.handle(event).is_break() {
                            break;
                        }
                    }
                    None => {
                        warn!("Feed event channel closed");
                        self.connection.close();
                        break;
                    }
                }
            }
        }

        info!("Feed session stopped");
    }

    fn on_transport(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened(conn) => {
                if self.connection.on_open(conn) {
                    info!(conn = %conn, instrument = %self.selection.current(), "Socket open, sending subscription");
                    let frame = self.subscriptions.on_open(self.selection.current());
                    self.send_frame(&frame);
                }
            }
            TransportEvent::Message { conn, raw } => {
                if !self.connection.is_current(conn) || !self.connection.is_open() {
                    debug!(conn = %conn, "Dropping frame from inactive connection");
                    return;
                }
                self.metrics.frames_received.inc();
                self.worker.dispatch(TransformJob {
                    generation: self.selection.generation(),
                    raw,
                });
            }
            TransportEvent::Error { conn, reason } => {
                if self.connection.on_error(conn, &reason) {
                    self.publish_status();
                }
            }
            TransportEvent::Closed(conn) => {
                if self.connection.on_closed(conn) {
                    self.publish_status();
                }
            }
        }
    }

    fn on_transformed(&mut self, generation: Generation, update: ConsolidatedUpdate) {
        if generation != self.selection.generation() {
            debug!(
                result_generation = %generation,
                current_generation = %self.selection.generation(),
                "Discarding stale transform result"
            );
            self.metrics.stale_results.inc();
            return;
        }

        self.metrics.updates_buffered.inc();
        if self.scheduler.store(update) {
            self.metrics.updates_superseded.inc();
        }
    }

    fn on_tick(&mut self) -> FlushOutcome {
        let outcome = self.scheduler.tick(self.connection.is_open());
        if outcome == FlushOutcome::Published {
            self.metrics.flushes.inc();
        }
        outcome
    }

    fn on_command(&mut self, command: FeedCommand) -> ControlFlow<()> {
        match command {
            FeedCommand::Reconnect => self.reconnect(),
            FeedCommand::ToggleInstrument => {
                if let Some(change) = self.selection.toggle() {
                    self.apply_instrument_change(change);
                }
            }
            FeedCommand::SelectInstrument(instrument) => match self.selection.select(&instrument) {
                Ok(Some(change)) => self.apply_instrument_change(change),
                Ok(None) => debug!(instrument = %instrument, "Instrument already selected"),
                Err(e) => warn!(error = %e, "Instrument selection rejected"),
            },
            FeedCommand::Visibility(visible) => self.on_visibility(visible),
            FeedCommand::Shutdown => {
                info!("Shutdown requested");
                self.connection.close();
                self.publish_status();
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn reconnect(&mut self) {
        let conn = self.connection.restart();
        self.metrics.reconnects.inc();
        info!(conn = %conn, "Reconnecting feed");
        self.publish_status();
    }

    fn apply_instrument_change(&mut self, change: InstrumentChange) {
        info!(
            previous = %change.previous,
            current = %change.current,
            generation = %change.generation,
            "Instrument changed"
        );

        self.scheduler.reset_for_instrument_change();
        if let Some(frames) = self.subscriptions.resync(&change) {
            for frame in &frames {
                self.send_frame(frame);
            }
        }
        self.publish_status();
    }

    fn on_visibility(&mut self, visible: bool) {
        if self.visibility.observe(visible, self.connection.state()) == GateAction::Close {
            info!("Focus lost, closing socket");
            self.connection.close();
            self.metrics.visibility_closes.inc();
            self.publish_status();
        }
    }

    fn send_frame(&mut self, frame: &SubscriptionFrame) {
        let text = match frame.to_text() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Failed to encode subscription frame");
                return;
            }
        };

        match self.connection.send(text) {
            Ok(()) => debug!(event = ?frame.event, products = ?frame.product_ids, "Subscription frame sent"),
            Err(FeedError::NotConnected) => {
                debug!(event = ?frame.event, "Not connected, subscription frame dropped");
                self.metrics.frames_dropped.inc();
            }
            Err(e) => {
                warn!(error = %e, "Failed to send subscription frame");
                self.metrics.frames_dropped.inc();
            }
        }
    }

    fn publish_status(&mut self) {
        let connected = self.connection.state() == LinkState::Connected;
        self.metrics.connected.set(i64::from(connected));

        let status = FeedStatus {
            connected,
            instrument: self.selection.current().clone(),
            generation: self.selection.generation(),
        };
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    pub fn status(&self) -> watch::Receiver<FeedStatus> {
        self.status.subscribe()
    }

    pub fn book(&self) -> BookObserver {
        self.scheduler.observe()
    }

    pub fn book_view(&self) -> BookView {
        self.scheduler.current()
    }

    pub fn connection(&self) -> &ConnectionManager<C> {
        &self.connection
    }

    pub fn pending_update(&self) -> Option<&ConsolidatedUpdate> {
        self.scheduler.buffer().pending()
    }

    pub fn current_instrument(&self) -> &Instrument {
        self.selection.current()
    }

    pub fn generation(&self) -> Generation {
        self.selection.generation()
    }
}
