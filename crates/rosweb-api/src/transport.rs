// Transport contract shared by every broker connection implementation.
//
// A `Connector` opens one `Transport` per call. The transport reports
// state changes and inbound frames to the `TransportListener` handed in
// at connect time, so no early transition can slip past an observer
// that registers too late.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use url::Url;

use crate::error::Error;

// ── ConnectionState ──────────────────────────────────────────────────

/// Connection state of a single transport instance.
///
/// Transitions are totally ordered per instance. `Errored` and `Closed`
/// are terminal for that instance: a new connection starts again from
/// `Connecting`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Errored(String),
    Closed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// `true` once the instance can no longer carry traffic.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Errored(_) | Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Connected => f.write_str("connected"),
            Self::Errored(detail) => write!(f, "errored ({detail})"),
            Self::Closed => f.write_str("closed"),
        }
    }
}

// ── Traits ───────────────────────────────────────────────────────────

/// Receives callbacks from a transport.
///
/// Callbacks run on whatever task the transport reads the socket on.
/// Frames arrive in the order the socket delivered them, and state
/// changes are delivered in the order they happened.
pub trait TransportListener: Send + Sync {
    fn on_state(&self, state: &ConnectionState);
    fn on_frame(&self, frame: &str);
}

/// Opens transports to a broker endpoint.
pub trait Connector: Send + Sync {
    /// Begin connecting to `endpoint` and return immediately.
    ///
    /// The returned transport is in `Connecting` (or already further
    /// along); later transitions arrive through `listener`.
    fn connect(
        &self,
        endpoint: &Url,
        listener: Arc<dyn TransportListener>,
    ) -> Result<Arc<dyn Transport>, Error>;
}

/// One live socket to a broker.
pub trait Transport: Send + Sync {
    fn endpoint(&self) -> &Url;

    fn created_at(&self) -> DateTime<Utc>;

    fn state(&self) -> ConnectionState;

    /// Queue a raw frame for sending.
    ///
    /// Fails with [`Error::NotConnected`] unless the state is `Connected`,
    /// and with [`Error::Closed`] after [`close`](Self::close). Never blocks.
    fn send(&self, frame: String) -> Result<(), Error>;

    /// Close the socket and move to `Closed`. Safe to call repeatedly.
    fn close(&self);
}

/// Map a state to the send error a non-connected transport reports.
pub(crate) fn send_error(state: &ConnectionState) -> Option<Error> {
    match state {
        ConnectionState::Connected => None,
        ConnectionState::Closed => Some(Error::Closed),
        _ => Some(Error::NotConnected),
    }
}
