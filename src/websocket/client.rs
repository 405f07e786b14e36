//! WebSocket client for the book feed
//!
//! Each session runs on its own task: it forwards queued frames, answers
//! pings and reports lifecycle and inbound messages as transport events.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};

use super::{ConnectionId, Connector, Link, TransportEvent};
use crate::error::{FeedError, Result};

enum LinkCommand {
    Send(String),
    Close,
}

/// Outbound handle on a running WebSocket session
pub struct WsLink {
    id: ConnectionId,
    commands: mpsc::UnboundedSender<LinkCommand>,
}

impl Link for WsLink {
    fn send(&mut self, text: String) -> Result<()> {
        self.commands
            .send(LinkCommand::Send(text))
            .map_err(|_| FeedError::WebSocketConnection(format!("session {} ended", self.id)))
    }

    fn close(&mut self) {
        // A finished session has already reported its close
        let _ = self.commands.send(LinkCommand::Close);
    }
}

/// Opens WebSocket sessions and routes their events into the feed loop
pub struct WsConnector<T> {
    events: mpsc::UnboundedSender<T>,
}

impl<T> WsConnector<T>
where
    T: From<TransportEvent> + Send + 'static,
{
    pub fn new(events: mpsc::UnboundedSender<T>) -> Self {
        Self { events }
    }
}

impl<T> Connector for WsConnector<T>
where
    T: From<TransportEvent> + Send + 'static,
{
    fn open(&mut self, id: ConnectionId, endpoint: &str) -> Box<dyn Link> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_session(id, endpoint.to_string(), rx, self.events.clone()));
        Box::new(WsLink { id, commands: tx })
    }
}

async fn run_session<T>(
    id: ConnectionId,
    endpoint: String,
    mut commands: mpsc::UnboundedReceiver<LinkCommand>,
    events: mpsc::UnboundedSender<T>,
) where
    T: From<TransportEvent> + Send + 'static,
{
    let emit = |event: TransportEvent| {
        // The loop is gone during shutdown; nothing left to notify
        let _ = events.send(event.into());
    };

    info!(conn = %id, url = %endpoint, "Connecting to book feed");

    let mut stream = match connect_async(endpoint.as_str()).await {
        Ok((stream, response)) => {
            info!(conn = %id, status = ?response.status(), "WebSocket connected");
            stream
        }
        Err(e) => {
            error!(conn = %id, error = %e, "Failed to connect");
            emit(TransportEvent::Error {
                conn: id,
                reason: e.to_string(),
            });
            return;
        }
    };

    emit(TransportEvent::Opened(id));

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(LinkCommand::Send(text)) => {
                    if let Err(e) = stream.send(Message::Text(text)).await {
                        error!(conn = %id, error = %e, "Failed to send frame");
                        emit(TransportEvent::Error { conn: id, reason: e.to_string() });
                        return;
                    }
                }
                Some(LinkCommand::Close) | None => {
                    debug!(conn = %id, "Closing WebSocket");
                    let _ = stream.close(None).await;
                    emit(TransportEvent::Closed(id));
                    return;
                }
            },
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    emit(TransportEvent::Message { conn: id, raw: text });
                }
                Some(Ok(Message::Binary(data))) => {
                    let raw = String::from_utf8_lossy(&data).to_string();
                    emit(TransportEvent::Message { conn: id, raw });
                }
                Some(Ok(Message::Ping(data))) => {
                    debug!(conn = %id, "Received ping, sending pong");
                    let _ = stream.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Pong(_))) | Some(Ok(Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    warn!(conn = %id, frame = ?frame, "Received close frame");
                    emit(TransportEvent::Closed(id));
                    return;
                }
                Some(Err(e)) => {
                    error!(conn = %id, error = %e, "WebSocket error");
                    emit(TransportEvent::Error { conn: id, reason: e.to_string() });
                    return;
                }
                None => {
                    warn!(conn = %id, "WebSocket stream ended");
                    emit(TransportEvent::Closed(id));
                    return;
                }
            }
        }
    }
}
