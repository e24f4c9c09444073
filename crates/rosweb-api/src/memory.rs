//! In-process transport whose broker side is driven by the caller.
//!
//! Useful for exercising session logic without a socket: the test decides
//! when the handshake completes, which frames arrive, and when the broker
//! fails or hangs up, and can inspect every frame the client sent.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use url::Url;

use crate::error::Error;
use crate::transport::{send_error, ConnectionState, Connector, Transport, TransportListener};

// ── MemoryConnector ──────────────────────────────────────────────────

/// Creates [`MemoryTransport`]s and remembers every one it handed out.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    inner: Arc<ConnectorInner>,
}

#[derive(Default)]
struct ConnectorInner {
    auto_accept: bool,
    refuse: Mutex<Option<String>>,
    transports: Mutex<Vec<Arc<MemoryTransport>>>,
}

impl MemoryConnector {
    /// Transports stay in `Connecting` until [`MemoryTransport::accept`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Transports reach `Connected` before `connect` returns.
    pub fn auto_accept() -> Self {
        Self {
            inner: Arc::new(ConnectorInner {
                auto_accept: true,
                ..ConnectorInner::default()
            }),
        }
    }

    /// Make the next `connect` call fail synchronously.
    pub fn refuse_next(&self, reason: impl Into<String>) {
        *self.inner.refuse.lock() = Some(reason.into());
    }

    /// Most recently created transport.
    pub fn last(&self) -> Option<Arc<MemoryTransport>> {
        self.inner.transports.lock().last().cloned()
    }

    /// Number of transports created so far.
    pub fn connections(&self) -> usize {
        self.inner.transports.lock().len()
    }
}

impl Connector for MemoryConnector {
    fn connect(
        &self,
        endpoint: &Url,
        listener: Arc<dyn TransportListener>,
    ) -> Result<Arc<dyn Transport>, Error> {
        if let Some(reason) = self.inner.refuse.lock().take() {
            return Err(Error::WebSocketConnect(reason));
        }

        let (state, _) = watch::channel(ConnectionState::Connecting);
        let transport = Arc::new(MemoryTransport {
            endpoint: endpoint.clone(),
            created_at: Utc::now(),
            state,
            transition_lock: Mutex::new(()),
            listener,
            sent: Mutex::new(Vec::new()),
        });
        self.inner.transports.lock().push(Arc::clone(&transport));

        if self.inner.auto_accept {
            transport.accept();
        }

        Ok(transport)
    }
}

// ── MemoryTransport ──────────────────────────────────────────────────

pub struct MemoryTransport {
    endpoint: Url,
    created_at: DateTime<Utc>,
    state: watch::Sender<ConnectionState>,
    transition_lock: Mutex<()>,
    listener: Arc<dyn TransportListener>,
    sent: Mutex<Vec<String>>,
}

impl MemoryTransport {
    /// Complete the handshake.
    pub fn accept(&self) {
        self.transition(ConnectionState::Connected);
    }

    /// Fail the connection with a socket-level error.
    pub fn fail(&self, detail: impl Into<String>) {
        self.transition(ConnectionState::Errored(detail.into()));
    }

    /// The broker hangs up.
    pub fn remote_close(&self) {
        self.transition(ConnectionState::Closed);
    }

    /// Deliver an inbound frame. Dropped unless connected, as a real
    /// socket would never produce one.
    pub fn deliver(&self, frame: &str) {
        if self.state.borrow().is_connected() {
            self.listener.on_frame(frame);
        }
    }

    /// Report the same state to the listener again without changing it.
    pub fn renotify(&self) {
        let _guard = self.transition_lock.lock();
        let current = self.state.borrow().clone();
        self.listener.on_state(&current);
    }

    /// Every frame sent so far, oldest first.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Drain the sent frames.
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut *self.sent.lock())
    }

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
        self.listener.on_state(&next);
        true
    }
}

impl Transport for MemoryTransport {
    fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    fn send(&self, frame: String) -> Result<(), Error> {
        if let Some(err) = send_error(&self.state.borrow()) {
            return Err(err);
        }
        self.sent.lock().push(frame);
        Ok(())
    }

    fn close(&self) {
        self.transition(ConnectionState::Closed);
    }
}

// ── Tests ────────────────────────────────────────────────────────────
