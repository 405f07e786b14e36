//! Feed pipeline scenarios driven through the public session API

use std::sync::{Arc, Mutex};
use std::time::Duration;

use prometheus::Registry;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;

use orderbook_feed::feed::FeedCommand;
use orderbook_feed::websocket::{Connector, Link, TransportEvent};
use orderbook_feed::{
    BookLevel, Config, ConnectionId, ConsolidatedUpdate, FeedError, FeedEvent, FeedMetrics,
    FeedSession, LinkState, Spread, TransformDispatch, TransformJob,
};

/// Everything the fake transport observed, in order
#[derive(Debug, Clone, PartialEq)]
enum Wire {
    Opened(ConnectionId),
    Sent(ConnectionId, String),
    Closed(ConnectionId),
}

#[derive(Clone, Default)]
struct Recorder {
    wire: Arc<Mutex<Vec<Wire>>>,
    jobs: Arc<Mutex<Vec<TransformJob>>>,
}

impl Recorder {
    fn wire(&self) -> Vec<Wire> {
        self.wire.lock().unwrap().clone()
    }

    fn sent(&self) -> Vec<String> {
        self.wire()
            .into_iter()
            .filter_map(|w| match w {
                Wire::Sent(_, text) => Some(text),
                _ => None,
            })
            .collect()
    }

    fn closes(&self) -> usize {
        self.wire()
            .iter()
            .filter(|w| matches!(w, Wire::Closed(_)))
            .count()
    }

    fn jobs(&self) -> Vec<TransformJob> {
        self.jobs.lock().unwrap().clone()
    }
}

struct FakeLink {
    id: ConnectionId,
    recorder: Recorder,
}

impl Link for FakeLink {
    fn send(&mut self, text: String) -> orderbook_feed::Result<()> {
        self.recorder.wire.lock().unwrap().push(Wire::Sent(self.id, text));
        Ok(())
    }

    fn close(&mut self) {
        self.recorder.wire.lock().unwrap().push(Wire::Closed(self.id));
    }
}

struct FakeConnector {
    recorder: Recorder,
}

impl Connector for FakeConnector {
    fn open(&mut self, id: ConnectionId, _endpoint: &str) -> Box<dyn Link> {
        self.recorder.wire.lock().unwrap().push(Wire::Opened(id));
        Box::new(FakeLink {
            id,
            recorder: self.recorder.clone(),
        })
    }
}

struct RecordingDispatch {
    recorder: Recorder,
}

impl TransformDispatch for RecordingDispatch {
    fn dispatch(&self, job: TransformJob) {
        self.recorder.jobs.lock().unwrap().push(job);
    }
}

const SUB_XBT: &str = r#"{"event":"subscribe","feed":"book_ui_1","product_ids":["PI_XBTUSD"]}"#;
const SUB_ETH: &str = r#"{"event":"subscribe","feed":"book_ui_1","product_ids":["PI_ETHUSD"]}"#;
const UNSUB_XBT: &str = r#"{"event":"unsubscribe","feed":"book_ui_1","product_ids":["PI_XBTUSD"]}"#;
const UNSUB_ETH: &str = r#"{"event":"unsubscribe","feed":"book_ui_1","product_ids":["PI_ETHUSD"]}"#;

fn new_session() -> (FeedSession<FakeConnector, RecordingDispatch>, Recorder) {
    let recorder = Recorder::default();
    let session = FeedSession::new(
        &Config::default(),
        FakeConnector {
            recorder: recorder.clone(),
        },
        RecordingDispatch {
            recorder: recorder.clone(),
        },
        FeedMetrics::new(&Registry::new()).unwrap(),
    )
    .unwrap();
    (session, recorder)
}

trait Step {
    fn step(&mut self, event: FeedEvent);
}

impl Step for FeedSession<FakeConnector, RecordingDispatch> {
    fn step(&mut self, event: FeedEvent) {
        assert!(self.handle(event).is_continue());
    }
}

fn opened(id: u64) -> FeedEvent {
    FeedEvent::Transport(TransportEvent::Opened(ConnectionId(id)))
}

fn command(command: FeedCommand) -> FeedEvent {
    FeedEvent::Command(command)
}

fn transformed(session: &FeedSession<FakeConnector, RecordingDispatch>, bid: u32) -> FeedEvent {
    FeedEvent::Transformed {
        generation: session.generation(),
        update: ConsolidatedUpdate {
            bids: vec![BookLevel {
                price: bid.into(),
                size: dec!(10),
                total: dec!(10),
            }],
            asks: vec![BookLevel {
                price: (bid + 1).into(),
                size: dec!(5),
                total: dec!(5),
            }],
            spread: Some(Spread {
                value: dec!(1),
                percent: dec!(0.5),
            }),
            highest_total: dec!(10),
        },
    }
}

#[test]
fn subscribe_sent_once_on_open() {
    let (mut session, recorder) = new_session();
    assert!(recorder.sent().is_empty());

    session.step(opened(1));
    assert_eq!(recorder.sent(), vec![SUB_XBT.to_string()]);
}

#[test]
fn toggle_sends_unsubscribe_then_subscribe_and_clears_buffer() {
    let (mut session, recorder) = new_session();
    session.step(opened(1));
    session.step(transformed(&session, 100));
    assert!(session.pending_update().is_some());

    session.step(command(FeedCommand::ToggleInstrument));

    assert_eq!(
        recorder.sent(),
        vec![SUB_XBT.to_string(), UNSUB_XBT.to_string(), SUB_ETH.to_string()]
    );
    assert!(session.pending_update().is_none());
}

#[test]
fn resync_pairs_match_actual_changes() {
    let (mut session, recorder) = new_session();
    session.step(opened(1));

    // Selecting the current instrument is not a change
    let xbt = session.current_instrument().clone();
    session.step(command(FeedCommand::SelectInstrument(xbt)));
    session.step(command(FeedCommand::ToggleInstrument));
    session.step(command(FeedCommand::ToggleInstrument));
    let current = session.current_instrument().clone();
    session.step(command(FeedCommand::SelectInstrument(current)));

    assert_eq!(
        recorder.sent(),
        vec![
            SUB_XBT.to_string(),
            UNSUB_XBT.to_string(),
            SUB_ETH.to_string(),
            UNSUB_ETH.to_string(),
            SUB_XBT.to_string(),
        ]
    );
}

#[test]
fn toggle_while_disconnected_drops_frames_silently() {
    let (mut session, recorder) = new_session();
    session.step(command(FeedCommand::ToggleInstrument));

    assert!(recorder.sent().is_empty());
    assert_eq!(session.current_instrument().as_str(), "PI_ETHUSD");

    // Opening later subscribes to the instrument selected meanwhile
    session.step(opened(1));
    assert_eq!(recorder.sent(), vec![SUB_ETH.to_string()]);
}

#[test]
fn only_latest_update_between_ticks_is_published() {
    let (mut session, _recorder) = new_session();
    session.step(opened(1));

    session.step(transformed(&session, 100));
    session.step(transformed(&session, 200));
    session.step(FeedEvent::Tick);

    let view = session.book_view();
    assert_eq!(view.bids.len(), 1);
    assert_eq!(view.bids[0].price, dec!(200));
    assert!(session.pending_update().is_none());
}

#[test]
fn tick_while_disconnected_keeps_buffer() {
    let (mut session, _recorder) = new_session();
    session.step(opened(1));
    session.step(FeedEvent::Transport(TransportEvent::Closed(ConnectionId(1))));
    session.step(transformed(&session, 100));

    session.step(FeedEvent::Tick);

    assert!(session.book_view().bids.is_empty());
    assert!(session.pending_update().is_some());
}

#[test]
fn empty_update_leaves_book_unchanged() {
    let (mut session, _recorder) = new_session();
    session.step(opened(1));
    session.step(transformed(&session, 100));
    session.step(FeedEvent::Tick);
    let before = session.book_view();

    session.step(FeedEvent::Transformed {
        generation: session.generation(),
        update: ConsolidatedUpdate::default(),
    });
    session.step(FeedEvent::Tick);

    assert_eq!(session.book_view(), before);
}

#[test]
fn error_then_reconnect_resubscribes_current_instrument() {
    let (mut session, recorder) = new_session();
    let status = session.status();
    session.step(opened(1));
    session.step(command(FeedCommand::ToggleInstrument));

    session.step(FeedEvent::Transport(TransportEvent::Error {
        conn: ConnectionId(1),
        reason: "connection reset".to_string(),
    }));
    assert_eq!(session.connection().state(), LinkState::Disconnected);
    assert!(!status.borrow().connected);

    session.step(command(FeedCommand::Reconnect));
    assert_eq!(session.connection().state(), LinkState::Connected);
    assert!(status.borrow().connected);

    session.step(opened(2));
    let wire = recorder.wire();
    assert_eq!(wire.last(), Some(&Wire::Sent(ConnectionId(2), SUB_ETH.to_string())));
    assert!(wire.contains(&Wire::Opened(ConnectionId(2))));
}

#[test]
fn reconnect_closes_previous_connection_first() {
    let (mut session, recorder) = new_session();
    session.step(opened(1));
    session.step(command(FeedCommand::Reconnect));

    let wire = recorder.wire();
    let closed = wire.iter().position(|w| *w == Wire::Closed(ConnectionId(1)));
    let reopened = wire.iter().position(|w| *w == Wire::Opened(ConnectionId(2)));
    assert!(closed.unwrap() < reopened.unwrap());
}

#[test]
fn events_from_replaced_connection_are_ignored() {
    let (mut session, recorder) = new_session();
    session.step(opened(1));
    session.step(command(FeedCommand::Reconnect));
    session.step(opened(2));

    session.step(FeedEvent::Transport(TransportEvent::Closed(ConnectionId(1))));
    session.step(FeedEvent::Transport(TransportEvent::Message {
        conn: ConnectionId(1),
        raw: "{}".to_string(),
    }));

    assert_eq!(session.connection().state(), LinkState::Connected);
    assert!(recorder.jobs().is_empty());
}

#[test]
fn messages_are_dispatched_with_current_generation() {
    let (mut session, recorder) = new_session();
    session.step(opened(1));
    session.step(FeedEvent::Transport(TransportEvent::Message {
        conn: ConnectionId(1),
        raw: "first".to_string(),
    }));
    session.step(command(FeedCommand::ToggleInstrument));
    session.step(FeedEvent::Transport(TransportEvent::Message {
        conn: ConnectionId(1),
        raw: "second".to_string(),
    }));

    let jobs = recorder.jobs();
    assert_eq!(jobs.len(), 2);
    assert!(jobs[0].generation < jobs[1].generation);
    assert_eq!(jobs[1].generation, session.generation());
}

#[test]
fn stale_result_after_instrument_change_is_not_buffered() {
    let (mut session, _recorder) = new_session();
    session.step(opened(1));
    let old = transformed(&session, 100);

    session.step(command(FeedCommand::ToggleInstrument));
    session.step(old);
    session.step(FeedEvent::Tick);

    assert!(session.pending_update().is_none());
    assert!(session.book_view().bids.is_empty());
}

#[test]
fn visibility_loss_closes_exactly_once() {
    let (mut session, recorder) = new_session();
    session.step(opened(1));

    session.step(command(FeedCommand::Visibility(false)));
    session.step(command(FeedCommand::Visibility(true)));
    session.step(command(FeedCommand::Visibility(false)));

    assert_eq!(recorder.closes(), 1);
    assert_eq!(session.connection().state(), LinkState::Disconnected);
}

#[test]
fn instrument_change_resets_published_levels() {
    let (mut session, _recorder) = new_session();
    session.step(opened(1));
    session.step(transformed(&session, 100));
    session.step(FeedEvent::Tick);
    assert!(!session.book_view().asks.is_empty());

    session.step(command(FeedCommand::ToggleInstrument));
    let view = session.book_view();
    assert!(view.asks.is_empty() && view.bids.is_empty());
}

#[test]
fn unknown_instrument_selection_is_rejected() {
    let (mut session, recorder) = new_session();
    session.step(opened(1));
    session.step(command(FeedCommand::SelectInstrument(
        orderbook_feed::Instrument::new("PI_LTCUSD"),
    )));

    assert_eq!(session.current_instrument().as_str(), "PI_XBTUSD");
    assert_eq!(recorder.sent().len(), 1);
}

#[test]
fn lowercase_selection_matches_configured_instrument() {
    let (mut session, recorder) = new_session();
    session.step(opened(1));
    session.step(command(FeedCommand::SelectInstrument(
        orderbook_feed::Instrument::new("pi_ethusd"),
    )));

    assert_eq!(session.current_instrument().as_str(), "PI_ETHUSD");
    assert_eq!(
        recorder.sent(),
        vec![SUB_XBT.to_string(), UNSUB_XBT.to_string(), SUB_ETH.to_string()]
    );
}

#[test]
fn duplicate_instruments_are_rejected_before_connecting() {
    let recorder = Recorder::default();
    let config = Config {
        instruments: vec![
            orderbook_feed::Instrument::new("PI_XBTUSD"),
            orderbook_feed::Instrument::new("PI_XBTUSD"),
        ],
        ..Config::default()
    };

    let result = FeedSession::new(
        &config,
        FakeConnector {
            recorder: recorder.clone(),
        },
        RecordingDispatch {
            recorder: recorder.clone(),
        },
        FeedMetrics::new(&Registry::new()).unwrap(),
    );

    assert!(matches!(result, Err(FeedError::Config(_))));
    assert!(recorder.wire().is_empty());
}

#[tokio::test(start_paused = true)]
async fn run_flushes_on_timer() {
    let (session, _recorder) = new_session();
    let mut book = session.book();
    let status = session.status();
    let generation = session.generation();

    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(session.run(rx, Duration::from_millis(1000)));

    tx.send(opened(1)).unwrap();
    tx.send(FeedEvent::Transformed {
        generation,
        update: ConsolidatedUpdate {
            highest_total: dec!(42),
            ..ConsolidatedUpdate::default()
        },
    })
    .unwrap();

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!book.has_changed().unwrap());

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(book.has_changed().unwrap());
    assert_eq!(book.borrow_and_update().highest_total, dec!(42));
    assert!(status.borrow().connected);

    tx.send(FeedEvent::Command(FeedCommand::Shutdown)).unwrap();
    task.await.unwrap();
}

#[test]
fn handle_reports_closed_channel() {
    let (tx, rx) = mpsc::unbounded_channel::<FeedEvent>();
    drop(rx);
    let (_, status_rx) = tokio::sync::watch::channel(orderbook_feed::FeedStatus {
        connected: false,
        instrument: orderbook_feed::Instrument::new("PI_XBTUSD"),
        generation: Default::default(),
    });
    let (_, book_rx) = tokio::sync::watch::channel(Default::default());

    let handle = orderbook_feed::FeedHandle::new(tx, status_rx, book_rx);
    assert!(matches!(handle.reconnect(), Err(FeedError::ChannelClosed)));
}
