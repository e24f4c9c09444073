//! WebSocket transport to a rosbridge server.
//!
//! [`WsConnector::connect`] returns immediately with a transport in the
//! `Connecting` state and spawns one background task per connection. The
//! task performs the handshake, then multiplexes the read half of the
//! socket with a single outbound queue, so frames from concurrent
//! `send` callers are written one at a time, in queue order.
//!
//! There is no automatic reconnection: a handshake or read failure moves
//! the transport to `Errored`, a close from the broker moves it to
//! `Closed`, and either is final for that transport.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rosweb_api::{Connector, WsConnector};
//!
//! let endpoint = url::Url::parse("ws://192.168.1.20:9090")?;
//! let transport = WsConnector.connect(&endpoint, Arc::new(my_listener))?;
//! // ... later, from the listener: on_state(Connected)
//! transport.send(r#"{"op":"subscribe","topic":"/chatter","type":"std_msgs/String"}"#.into())?;
//! transport.close();
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::{CancellationToken, DropGuard};
use url::Url;

use crate::error::Error;
use crate::transport::{send_error, ConnectionState, Connector, Transport, TransportListener};

// ── WsConnector ──────────────────────────────────────────────────────

/// Opens [`WsTransport`]s. Must be called from within a Tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(
        &self,
        endpoint: &Url,
        listener: Arc<dyn TransportListener>,
    ) -> Result<Arc<dyn Transport>, Error> {
        if !matches!(endpoint.scheme(), "ws" | "wss") {
            return Err(Error::InvalidUrl(format!(
                "expected a ws:// or wss:// endpoint, got {endpoint}"
            )));
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::WebSocketConnect(format!("no async runtime: {e}")))?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let cancel = CancellationToken::new();

        let shared = Arc::new(WsShared {
            endpoint: endpoint.clone(),
            created_at: Utc::now(),
            state,
            transition_lock: Mutex::new(()),
            listener,
            outbound: outbound_tx,
            cancel: cancel.clone(),
        });

        runtime.spawn(run_connection(Arc::clone(&shared), outbound_rx));

        Ok(Arc::new(WsTransport {
            shared,
            _guard: cancel.drop_guard(),
        }))
    }
}

// ── WsTransport ──────────────────────────────────────────────────────

/// Handle to one WebSocket connection.
///
/// Dropping the last handle cancels the background task.
pub struct WsTransport {
    shared: Arc<WsShared>,
    _guard: DropGuard,
}

struct WsShared {
    endpoint: Url,
    created_at: DateTime<Utc>,
    state: watch::Sender<ConnectionState>,
    // Serializes transitions so the listener sees them in order.
    transition_lock: Mutex<()>,
    listener: Arc<dyn TransportListener>,
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

impl WsShared {
    /// Apply a state transition and notify the listener.
    ///
    /// `Closed` is absorbing; `Errored` only moves on to `Closed`.
    /// Returns `false` when the transition was not applied.
    fn transition(&self, next: ConnectionState) -> bool {
        let _guard = self.transition_lock.lock();

        let current = self.state.borrow().clone();
        let allowed = match (&current, &next) {
            (ConnectionState::Closed, _) => false,
            (ConnectionState::Errored(_), next) => *next == ConnectionState::Closed,
            (current, next) => current != next,
        };
        if !allowed {
            return false;
        }

        self.state.send_replace(next.clone());
        tracing::info!(endpoint = %self.endpoint, state = %next, "transport state changed");
        self.listener.on_state(&next);
        true
    }
}

impl Transport for WsTransport {
    fn endpoint(&self) -> &Url {
        &self.shared.endpoint
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.shared.created_at
    }

    fn state(&self) -> ConnectionState {
        self.shared.state.borrow().clone()
    }

    fn send(&self, frame: String) -> Result<(), Error> {
        if let Some(err) = send_error(&self.shared.state.borrow()) {
            return Err(err);
        }
        self.shared.outbound.send(frame).map_err(|_| Error::Closed)
    }

    fn close(&self) {
        if self.shared.transition(ConnectionState::Closed) {
            tracing::debug!(endpoint = %self.shared.endpoint, "closing WebSocket");
        }
        self.shared.cancel.cancel();
    }
}

// ── Connection task ──────────────────────────────────────────────────

/// Handshake, then pump frames both ways until the socket ends or the
/// transport is closed.
async fn run_connection(shared: Arc<WsShared>, mut outbound: mpsc::UnboundedReceiver<String>) {
    let cancel = shared.cancel.clone();
    tracing::info!(endpoint = %shared.endpoint, "connecting to rosbridge");

    let handshake = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        result = tokio_tungstenite::connect_async(shared.endpoint.as_str()) => result,
    };

    let ws_stream = match handshake {
        Ok((stream, _response)) => stream,
        Err(e) => {
            tracing::warn!(endpoint = %shared.endpoint, error = %e, "WebSocket handshake failed");
            shared.transition(ConnectionState::Errored(e.to_string()));
            return;
        }
    };

    if !shared.transition(ConnectionState::Connected) {
        // Closed while the handshake was in flight.
        return;
    }

    let (mut write, mut read) = ws_stream.split();

    let outcome: Result<(), Error> = loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                // Frames accepted before close still go out ahead of the close frame.
                while let Ok(frame) = outbound.try_recv() {
                    if let Err(e) = write.send(Message::text(frame)).await {
                        tracing::debug!(error = %e, "queued frame not delivered");
                        break;
                    }
                }
                if let Err(e) = write.send(Message::Close(None)).await {
                    tracing::debug!(error = %e, "close frame not delivered");
                }
                break Ok(());
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else { break Ok(()) };
                tracing::trace!(bytes = frame.len(), "sending frame");
                if let Err(e) = write.send(Message::text(frame)).await {
                    break Err(Error::WebSocketConnect(e.to_string()));
                }
            }
            incoming = read.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        shared.listener.on_frame(text.as_str());
                    }
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(
                                code = %cf.code,
                                reason = %cf.reason,
                                "WebSocket close frame received"
                            );
                        } else {
                            tracing::info!("WebSocket close frame received (no payload)");
                        }
                        break Ok(());
                    }
                    Some(Ok(Message::Binary(data))) => {
                        tracing::debug!(bytes = data.len(), "ignoring binary frame");
                    }
                    Some(Ok(_)) => {
                        // Ping/Pong -- tungstenite answers pings itself
                        tracing::trace!("WebSocket control frame");
                    }
                    Some(Err(e)) => break Err(Error::WebSocketConnect(e.to_string())),
                    None => {
                        tracing::info!("WebSocket stream ended");
                        break Ok(());
                    }
                }
            }
        }
    };

    match outcome {
        Ok(()) => {
            shared.transition(ConnectionState::Closed);
        }
        Err(e) => {
            tracing::warn!(endpoint = %shared.endpoint, error = %e, "WebSocket failed");
            shared.transition(ConnectionState::Errored(e.to_string()));
        }
    }

    tracing::debug!(endpoint = %shared.endpoint, "connection task exiting");
}

// ── Tests ────────────────────────────────────────────────────────────
