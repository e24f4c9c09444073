// ── Session facade ──
//
// The surface handed to consumers. A `Session` owns one connection at a
// time plus the topic registry that outlives it: subscriptions survive a
// failed or restarted connection and are replayed when the next one comes
// up. The session never reconnects on its own; `restart` is the only way
// to get a fresh connection.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::Display;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};
use uuid::Uuid;

use rosweb_api::{ConnectionState, Connector, FrameCodec, RosbridgeCodec, WsConnector};

use crate::config::SessionConfig;
use crate::encoder::{MotionSettings, OutboundCommand, SliderEncoder};
use crate::error::CoreError;
use crate::registry::{
    InboundMessage, LinkInfo, Publisher, Sink, SubscriptionHandle, TopicRegistry,
};
use crate::stream::{ConnectionStream, TopicStream};

/// Service `rosapi` exposes for topic discovery.
pub const TOPICS_SERVICE: &str = "/rosapi/topics";

// ── SessionState ─────────────────────────────────────────────────────

/// Lifecycle of a session as a whole.
///
/// `Degraded` means a connection exists but can no longer carry traffic
/// (it errored, or the broker closed it). Only `restart` leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SessionState {
    Idle,
    Starting,
    Live,
    Degraded,
    Stopped,
}

impl SessionState {
    pub fn from_connection(state: &ConnectionState, stopped: bool) -> Self {
        if stopped {
            return Self::Stopped;
        }
        match state {
            ConnectionState::Disconnected => Self::Idle,
            ConnectionState::Connecting => Self::Starting,
            ConnectionState::Connected => Self::Live,
            ConnectionState::Errored(_) | ConnectionState::Closed => Self::Degraded,
        }
    }
}

/// Reply of the topic discovery service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicList {
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub types: Vec<String>,
}

impl TopicList {
    /// `(topic, type)` pairs. Missing types come back empty.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.topics.iter().enumerate().map(|(i, topic)| {
            let ty = self.types.get(i).map_or("", String::as_str);
            (topic.as_str(), ty)
        })
    }
}

// ── Session ──────────────────────────────────────────────────────────

/// Handle to a bridge session. Cheaply cloneable; all clones share state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: Uuid,
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    registry: TopicRegistry,
    /// Serializes start and restart; holds the last generation issued.
    lifecycle: Mutex<u64>,
}

impl Session {
    /// Create a session and begin connecting.
    ///
    /// Returns as soon as the connection attempt is under way; watch
    /// [`connection_changes`](Self::connection_changes) for the outcome.
    /// Fails only when the connector refuses outright (bad endpoint, no
    /// runtime).
    pub fn start(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        codec: Arc<dyn FrameCodec>,
    ) -> Result<Self, CoreError> {
        let id = Uuid::new_v4();
        let registry = TopicRegistry::new(
            id,
            codec,
            config.auto_advertise,
            config.offline_publish,
        );
        let session = Self {
            inner: Arc::new(SessionInner {
                id,
                config,
                connector,
                registry,
                lifecycle: Mutex::new(0),
            }),
        };

        {
            let mut generation = session.inner.lifecycle.lock();
            session.open_connection(&mut generation)?;
        }
        info!(session = %id, endpoint = %session.inner.config.endpoint, "session started");
        Ok(session)
    }

    /// [`start`](Self::start) over WebSocket with the rosbridge codec.
    pub fn connect_ws(config: SessionConfig) -> Result<Self, CoreError> {
        Self::start(config, Arc::new(WsConnector), Arc::new(RosbridgeCodec))
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    // ── State observation ────────────────────────────────────────────

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.registry.connection_state()
    }

    pub fn connection_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.registry.connection_changes()
    }

    pub fn connection_stream(&self) -> ConnectionStream {
        ConnectionStream::new(self.connection_changes())
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_connection(
            &self.connection_state(),
            self.inner.registry.is_stopped(),
        )
    }

    /// Endpoint, generation and age of the current connection.
    pub fn link_info(&self) -> Option<LinkInfo> {
        self.inner.registry.link_info()
    }

    /// Wait until the connection state satisfies `predicate`.
    pub async fn wait_for<F>(
        &self,
        mut predicate: F,
        timeout: Duration,
    ) -> Result<ConnectionState, CoreError>
    where
        F: FnMut(&ConnectionState) -> bool + Send,
    {
        let mut rx = self.connection_changes();
        let waited = tokio::time::timeout(timeout, async {
            rx.wait_for(|state| predicate(state))
                .await
                .map(|state| (*state).clone())
        })
        .await;

        match waited {
            Ok(Ok(state)) => Ok(state),
            Ok(Err(_)) => Err(CoreError::SessionStopped),
            Err(_) => Err(CoreError::Timeout {
                timeout_ms: duration_ms(timeout),
            }),
        }
    }

    /// Wait for `Connected`, failing early if the connection errors or
    /// closes first.
    pub async fn wait_until_connected(&self, timeout: Duration) -> Result<(), CoreError> {
        let state = self
            .wait_for(|state| state.is_connected() || state.is_terminal(), timeout)
            .await?;
        match state {
            ConnectionState::Connected => Ok(()),
            ConnectionState::Errored(detail) => Err(CoreError::Transport { detail }),
            _ if self.inner.registry.is_stopped() => Err(CoreError::SessionStopped),
            other => Err(CoreError::Transport {
                detail: format!("connection {other}"),
            }),
        }
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Deliver every message on `topic` to `on_message`.
    ///
    /// Callable in any connection state; see [`TopicRegistry::subscribe`].
    /// `on_message` runs on the transport's task and may unsubscribe,
    /// publish or shut the session down, but must not call `restart`.
    pub fn subscribe<F>(
        &self,
        topic: &str,
        message_type: &str,
        on_message: F,
    ) -> Result<SubscriptionHandle, CoreError>
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        let sink: Sink = Arc::new(on_message);
        self.inner.registry.subscribe(topic, message_type, sink)
    }

    /// Subscribe and receive messages through a [`TopicStream`].
    pub fn subscribe_stream(
        &self,
        topic: &str,
        message_type: &str,
    ) -> Result<(SubscriptionHandle, TopicStream), CoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = self.subscribe(topic, message_type, move |message| {
            if tx.send(message.clone()).is_err() {
                debug!(topic = %message.topic, "topic stream dropped; message discarded");
            }
        })?;
        Ok((handle.clone(), TopicStream::new(handle, rx)))
    }

    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        self.inner.registry.unsubscribe(handle);
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.inner.registry.subscriber_count(topic)
    }

    // ── Publishing ───────────────────────────────────────────────────

    pub fn publisher(&self, topic: &str, message_type: &str) -> Publisher {
        self.inner.registry.publisher(topic, message_type)
    }

    pub fn publish(&self, topic: &str, message_type: &str, payload: Value) -> Result<(), CoreError> {
        self.inner.registry.publish(topic, message_type, payload)
    }

    /// Bind a slider mapping to a publisher on its topic.
    pub fn slider(&self, settings: &MotionSettings) -> Result<SliderControl, CoreError> {
        Ok(SliderControl {
            encoder: settings.encoder()?,
            publisher: self.publisher(&settings.topic, &settings.message_type),
            actuator_id: settings.actuator_id,
            scale_factor: settings.scale_factor,
            duration_ms: settings.duration_ms,
        })
    }

    // ── Services ─────────────────────────────────────────────────────

    /// Call a broker-side service and wait for its reply.
    ///
    /// Bounded by the configured request timeout. Fails with
    /// `NotConnected` if the link is down when called or drops before the
    /// reply arrives.
    pub async fn call_service(&self, service: &str, args: Value) -> Result<Value, CoreError> {
        let (id, reply) = self.inner.registry.begin_call(service, &args)?;
        let timeout = self.inner.config.request_timeout;

        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CoreError::NotConnected),
            Err(_) => {
                self.inner.registry.cancel_call(&id);
                Err(CoreError::Timeout {
                    timeout_ms: duration_ms(timeout),
                })
            }
        }
    }

    /// Topics currently known to the broker.
    pub async fn topics(&self) -> Result<TopicList, CoreError> {
        let values = self
            .call_service(TOPICS_SERVICE, Value::Object(serde_json::Map::new()))
            .await?;
        Ok(serde_json::from_value(values)?)
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Replace the current connection with a new one.
    ///
    /// Live subscriptions stay registered and are subscribed again on the
    /// new connection once it is up. Late events from the old connection
    /// are ignored.
    pub fn restart(&self) -> Result<(), CoreError> {
        let mut generation = self.inner.lifecycle.lock();
        if self.inner.registry.is_stopped() {
            return Err(CoreError::SessionStopped);
        }

        if let Some(old) = self.inner.registry.detach() {
            old.close();
        }
        self.open_connection(&mut generation)?;
        info!(session = %self.inner.id, generation = *generation, "session restarted");
        Ok(())
    }

    /// Unsubscribe everything and close the connection.
    ///
    /// Waits for any in-progress delivery to finish. Safe to call more
    /// than once, including from inside a sink; later calls do nothing.
    pub fn shutdown(&self) {
        match self.inner.registry.shutdown() {
            Ok(transport) => {
                // Closed outside the registry lock: the close notification
                // comes back through the registry.
                if let Some(transport) = transport {
                    transport.close();
                }
                info!(session = %self.inner.id, "session stopped");
            }
            Err(_) => debug!(session = %self.inner.id, "session already stopped"),
        }
    }

    fn open_connection(&self, generation: &mut u64) -> Result<(), CoreError> {
        *generation += 1;
        let listener = self.inner.registry.listener(*generation);
        let transport = self
            .inner
            .connector
            .connect(&self.inner.config.endpoint, listener)?;
        debug!(
            session = %self.inner.id,
            generation = *generation,
            endpoint = %transport.endpoint(),
            "connection opened"
        );
        if let Err(e) = self.inner.registry.attach(*generation, Arc::clone(&transport)) {
            // Shut down while connecting.
            transport.close();
            return Err(e);
        }
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("endpoint", &self.inner.config.endpoint.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ── SliderControl ────────────────────────────────────────────────────

/// A slider wired to one actuator: validate, encode, publish.
#[derive(Debug, Clone)]
pub struct SliderControl {
    encoder: SliderEncoder,
    publisher: Publisher,
    actuator_id: u16,
    scale_factor: f64,
    duration_ms: u32,
}

impl SliderControl {
    /// Move the actuator to the position `raw_value` maps to.
    ///
    /// Range errors are reported before anything touches the link.
    pub fn set(&self, raw_value: f64) -> Result<OutboundCommand, CoreError> {
        let command =
            self.encoder
                .encode(self.actuator_id, raw_value, self.scale_factor, self.duration_ms)?;
        self.publisher.publish_message(&command.to_motion_command())?;
        Ok(command)
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
