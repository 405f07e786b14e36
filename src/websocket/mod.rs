//! WebSocket module for the book feed connection
//!
//! A [`Connector`] opens transport sessions; each session is driven as a
//! [`Link`] and reports back through [`TransportEvent`]s tagged with the
//! [`ConnectionId`] of the session that produced them.

mod client;
mod manager;

pub use client::{WsConnector, WsLink};
pub use manager::{ConnectionHandle, ConnectionManager};

use serde::Serialize;
use std::fmt;

use crate::error::Result;

/// Identifies one transport session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of the current connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkState {
    Connected,
    Disconnected,
}

/// Event reported by a transport session
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened(ConnectionId),
    Message { conn: ConnectionId, raw: String },
    Error { conn: ConnectionId, reason: String },
    Closed(ConnectionId),
}

impl TransportEvent {
    pub fn conn(&self) -> ConnectionId {
        match self {
            TransportEvent::Opened(conn) | TransportEvent::Closed(conn) => *conn,
            TransportEvent::Message { conn, .. } | TransportEvent::Error { conn, .. } => *conn,
        }
    }
}

/// Outbound side of one transport session
#[cfg_attr(test, mockall::automock)]
pub trait Link: Send {
    /// Queue a text frame
    fn send(&mut self, text: String) -> Result<()>;

    /// Request a graceful close; must not fail on an already closed session
    fn close(&mut self);
}

/// Opens transport sessions to the feed endpoint
pub trait Connector: Send {
    fn open(&mut self, id: ConnectionId, endpoint: &str) -> Box<dyn Link>;
}
