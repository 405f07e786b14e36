//! WebSocket connection manager
//!
//! Owns exactly one current connection handle. There is no automatic retry:
//! errors and remote closes both move the state to `Disconnected`, and only
//! an explicit [`ConnectionManager::restart`] brings it back.

use tracing::{debug, info, warn};

use super::{ConnectionId, Connector, Link, LinkState};
use crate::error::{FeedError, Result};

/// One transport session owned by the manager
pub struct ConnectionHandle {
    id: ConnectionId,
    link: Box<dyn Link>,
    opened: bool,
    closed: bool,
}

impl ConnectionHandle {
    fn new(id: ConnectionId, link: Box<dyn Link>) -> Self {
        Self {
            id,
            link,
            opened: false,
            closed: false,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Open event received and not closed since
    pub fn is_open(&self) -> bool {
        self.opened && !self.closed
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn close(&mut self) {
        if !self.closed {
            self.link.close();
            self.closed = true;
        }
    }
}

/// Manages the feed connection lifecycle
pub struct ConnectionManager<C: Connector> {
    connector: C,
    endpoint: String,
    current: ConnectionHandle,
    next_id: u64,
    state: LinkState,
}

impl<C: Connector> ConnectionManager<C> {
    /// Create the manager and open the initial connection
    pub fn new(mut connector: C, endpoint: &str) -> Self {
        let id = ConnectionId(1);
        let link = connector.open(id, endpoint);
        info!(conn = %id, "Initial connection created");

        Self {
            connector,
            endpoint: endpoint.to_string(),
            current: ConnectionHandle::new(id, link),
            next_id: 2,
            state: LinkState::Connected,
        }
    }

    /// Open a new session and make it current
    ///
    /// The previous handle is not touched; `restart` closes it first.
    fn connect(&mut self) -> ConnectionId {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;

        let link = self.connector.open(id, &self.endpoint);
        self.current = ConnectionHandle::new(id, link);
        id
    }

    /// Close the current connection; a no-op if it is already closed
    pub fn close(&mut self) {
        if self.current.is_closed() {
            debug!(conn = %self.current.id, "Close requested on closed connection");
            return;
        }
        info!(conn = %self.current.id, "Closing connection");
        self.current.close();
        self.state = LinkState::Disconnected;
    }

    /// Replace the current connection with a fresh one
    ///
    /// The previous handle is closed before the new one is opened, so a
    /// restart never leaves an orphaned session behind.
    pub fn restart(&mut self) -> ConnectionId {
        self.current.close();
        self.state = LinkState::Connected;
        let id = self.connect();
        info!(conn = %id, "Connection restarted");
        id
    }

    /// Record that a session finished its handshake
    ///
    /// Returns true only for the current, not yet closed, handle.
    pub fn on_open(&mut self, id: ConnectionId) -> bool {
        if !self.is_current(id) || self.current.closed {
            debug!(conn = %id, "Ignoring open event for stale connection");
            return false;
        }
        self.current.opened = true;
        true
    }

    /// Record a transport error; same outcome as a close
    pub fn on_error(&mut self, id: ConnectionId, reason: &str) -> bool {
        if !self.is_current(id) {
            return false;
        }
        warn!(conn = %id, reason = %reason, "Connection error");
        self.mark_disconnected()
    }

    /// Record a remote or local close
    pub fn on_closed(&mut self, id: ConnectionId) -> bool {
        if !self.is_current(id) {
            return false;
        }
        info!(conn = %id, "Connection closed");
        self.mark_disconnected()
    }

    fn mark_disconnected(&mut self) -> bool {
        self.current.closed = true;
        let changed = self.state != LinkState::Disconnected;
        self.state = LinkState::Disconnected;
        changed
    }

    /// Send a text frame over the current connection
    pub fn send(&mut self, text: String) -> Result<()> {
        if !self.is_open() {
            return Err(FeedError::NotConnected);
        }
        self.current.link.send(text)
    }

    pub fn is_current(&self, id: ConnectionId) -> bool {
        self.current.id == id
    }

    /// Connected and the current session is open for sends
    pub fn is_open(&self) -> bool {
        self.state == LinkState::Connected && self.current.is_open()
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn current(&self) -> &ConnectionHandle {
        &self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::MockLink;
    use std::collections::VecDeque;

    /// Hands out prepared mock links in order
    struct QueuedConnector {
        links: VecDeque<MockLink>,
        opened: Vec<ConnectionId>,
    }

    impl QueuedConnector {
        fn new(links: Vec<MockLink>) -> Self {
            Self {
                links: links.into(),
                opened: Vec::new(),
            }
        }
    }

    impl Connector for QueuedConnector {
        fn open(&mut self, id: ConnectionId, _endpoint: &str) -> Box<dyn Link> {
            self.opened.push(id);
            Box::new(self.links.pop_front().unwrap_or_default())
        }
    }

    fn closing_link(times: usize) -> MockLink {
        let mut link = MockLink::new();
        link.expect_close().times(times).return_const(());
        link
    }

    #[test]
    fn test_new_connects_once() {
        let manager = ConnectionManager::new(QueuedConnector::new(vec![]), "ws://feed");
        assert_eq!(manager.state(), LinkState::Connected);
        assert_eq!(manager.connector.opened, vec![ConnectionId(1)]);
        assert!(!manager.is_open());
    }

    #[test]
    fn test_close_is_idempotent() {
        let connector = QueuedConnector::new(vec![closing_link(1)]);
        let mut manager = ConnectionManager::new(connector, "ws://feed");
        manager.on_open(ConnectionId(1));

        manager.close();
        manager.close();
        assert_eq!(manager.state(), LinkState::Disconnected);
    }

    #[test]
    fn test_error_marks_disconnected() {
        let mut manager = ConnectionManager::new(QueuedConnector::new(vec![]), "ws://feed");
        manager.on_open(ConnectionId(1));
        assert!(manager.is_open());

        assert!(manager.on_error(ConnectionId(1), "reset by peer"));
        assert_eq!(manager.state(), LinkState::Disconnected);
        assert!(!manager.is_open());
        // Close after an error does not touch the dead link
        manager.close();
    }

    #[test]
    fn test_restart_closes_previous_handle() {
        let connector = QueuedConnector::new(vec![closing_link(1), MockLink::default()]);
        let mut manager = ConnectionManager::new(connector, "ws://feed");
        manager.on_open(ConnectionId(1));

        let id = manager.restart();
        assert_eq!(id, ConnectionId(2));
        assert_eq!(manager.state(), LinkState::Connected);
        assert!(manager.is_current(ConnectionId(2)));
    }

    #[test]
    fn test_stale_events_are_ignored() {
        let mut manager = ConnectionManager::new(QueuedConnector::new(vec![closing_link(1)]), "ws://feed");
        manager.restart();

        assert!(!manager.on_open(ConnectionId(1)));
        assert!(!manager.on_closed(ConnectionId(1)));
        assert_eq!(manager.state(), LinkState::Connected);
    }

    #[test]
    fn test_send_requires_open_connection() {
        let mut link = MockLink::new();
        link.expect_send().times(1).returning(|_| Ok(()));
        let mut manager = ConnectionManager::new(QueuedConnector::new(vec![link]), "ws://feed");

        assert!(matches!(
            manager.send("before open".to_string()),
            Err(FeedError::NotConnected)
        ));

        manager.on_open(ConnectionId(1));
        assert!(manager.send("after open".to_string()).is_ok());
    }
}
