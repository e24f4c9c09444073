// ── Topic registry ──
//
// Tracks every subscription and publisher of one session, keyed by topic,
// and is the only place that turns them into wire frames. All state lives
// behind one re-entrant lock: subscribe, unsubscribe, publish, inbound
// routing, replay and teardown are serialized against each other, while a
// sink running inside delivery may still call back into the registry on
// the same thread.
//
// The registry knows about at most one transport at a time (the "link").
// Each link carries the generation it was opened under; events tagged with
// any other generation are stale and ignored.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::ReentrantMutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, trace, warn};
use url::Url;
use uuid::Uuid;

use rosweb_api::{ConnectionState, DecodedFrame, FrameCodec, Transport, TransportListener};

use crate::config::OfflinePublishPolicy;
use crate::error::CoreError;

/// Callback invoked for every message delivered to a subscription.
pub type Sink = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

/// Outcome of a service call, as delivered to the waiting caller.
pub(crate) type ServiceReply = Result<Value, CoreError>;

// ── Public value types ───────────────────────────────────────────────

/// A message received on a topic. Cheap to clone.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub topic: Arc<str>,
    pub message_type: Arc<str>,
    pub data: Arc<Value>,
}

impl InboundMessage {
    /// Deserialize the payload into a typed message.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, CoreError> {
        Ok(T::deserialize(&*self.data)?)
    }
}

/// Proof of one subscription, returned by `subscribe`.
///
/// Passing it to `unsubscribe` more than once, or to a registry of a
/// different session, does nothing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    session_id: Uuid,
    id: u64,
    topic: Arc<str>,
}

impl SubscriptionHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

/// Where the current link points and when it was opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub generation: u64,
    pub endpoint: Url,
    pub created_at: DateTime<Utc>,
    pub state: ConnectionState,
}

// ── Publisher ────────────────────────────────────────────────────────

/// Capability to publish on one topic with one message type.
///
/// Holds no buffered state of its own: every publish goes through the
/// registry against whatever link is current at that moment.
#[derive(Clone)]
pub struct Publisher {
    registry: TopicRegistry,
    topic: Arc<str>,
    message_type: Arc<str>,
}

impl Publisher {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    pub fn publish(&self, payload: Value) -> Result<(), CoreError> {
        self.registry.publish(&self.topic, &self.message_type, payload)
    }

    /// Serialize `message` and publish it.
    pub fn publish_message<T: Serialize>(&self, message: &T) -> Result<(), CoreError> {
        self.publish(serde_json::to_value(message)?)
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("topic", &self.topic)
            .field("message_type", &self.message_type)
            .finish_non_exhaustive()
    }
}

// ── Internal state ───────────────────────────────────────────────────

struct SubscriptionEntry {
    topic: Arc<str>,
    sink: Sink,
}

struct TopicEntry {
    message_type: Arc<str>,
    /// Live subscription ids, in registration order.
    subscribers: Vec<u64>,
    /// A wire-level subscribe is in effect on the current link.
    wire_active: bool,
}

struct QueuedPublish {
    topic: Arc<str>,
    message_type: Arc<str>,
    payload: Value,
}

struct PendingCall {
    service: String,
    reply: oneshot::Sender<ServiceReply>,
}

struct Link {
    generation: u64,
    transport: Arc<dyn Transport>,
    connected: bool,
}

impl Link {
    fn send(&self, frame: Result<String, rosweb_api::Error>) -> Result<(), CoreError> {
        self.transport.send(frame?)?;
        Ok(())
    }
}

#[derive(Default)]
struct RegistryState {
    next_subscription: u64,
    next_call: u64,
    subscriptions: HashMap<u64, SubscriptionEntry>,
    topics: IndexMap<Arc<str>, TopicEntry>,
    advertised: HashSet<Arc<str>>,
    outbox: VecDeque<QueuedPublish>,
    pending_calls: HashMap<String, PendingCall>,
    link: Option<Link>,
    stopped: bool,
}

impl RegistryState {
    fn connected_link(&self) -> Option<&Link> {
        self.link.as_ref().filter(|link| link.connected)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.link
            .as_ref()
            .is_some_and(|link| link.generation == generation)
    }
}

struct RegistryInner {
    session_id: Uuid,
    codec: Arc<dyn FrameCodec>,
    auto_advertise: bool,
    offline: OfflinePublishPolicy,
    state_tx: watch::Sender<ConnectionState>,
    state: ReentrantMutex<RefCell<RegistryState>>,
}

// ── TopicRegistry ────────────────────────────────────────────────────

/// Subscription bookkeeping and wire-frame production for one session.
#[derive(Clone)]
pub struct TopicRegistry {
    inner: Arc<RegistryInner>,
}

impl TopicRegistry {
    pub fn new(
        session_id: Uuid,
        codec: Arc<dyn FrameCodec>,
        auto_advertise: bool,
        offline: OfflinePublishPolicy,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(RegistryInner {
                session_id,
                codec,
                auto_advertise,
                offline,
                state_tx,
                state: ReentrantMutex::new(RefCell::new(RegistryState::default())),
            }),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.inner.session_id
    }

    // ── Observation ──────────────────────────────────────────────────

    /// State of the current link, `Disconnected` when there is none.
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state_tx.borrow().clone()
    }

    pub fn connection_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn link_info(&self) -> Option<LinkInfo> {
        let guard = self.inner.state.lock();
        let state = guard.borrow();
        state.link.as_ref().map(|link| LinkInfo {
            generation: link.generation,
            endpoint: link.transport.endpoint().clone(),
            created_at: link.transport.created_at(),
            state: link.transport.state(),
        })
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.state.lock().borrow().stopped
    }

    /// Live subscriptions on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        let guard = self.inner.state.lock();
        let state = guard.borrow();
        state
            .topics
            .get(topic)
            .map_or(0, |entry| entry.subscribers.len())
    }

    /// Topics with at least one live subscription, in first-subscribed order.
    pub fn subscribed_topics(&self) -> Vec<String> {
        let guard = self.inner.state.lock();
        let state = guard.borrow();
        state.topics.keys().map(ToString::to_string).collect()
    }

    /// Publishes waiting for the link under [`OfflinePublishPolicy::Buffer`].
    pub fn queued_publishes(&self) -> usize {
        self.inner.state.lock().borrow().outbox.len()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Record interest in `topic` and start delivering to `sink`.
    ///
    /// Allowed in any connection state. The wire-level subscribe goes out
    /// now if connected and nobody else already holds the topic, otherwise
    /// when the link next becomes connected.
    pub fn subscribe(
        &self,
        topic: &str,
        message_type: &str,
        sink: Sink,
    ) -> Result<SubscriptionHandle, CoreError> {
        let guard = self.inner.state.lock();
        let mut state = guard.borrow_mut();
        if state.stopped {
            return Err(CoreError::SessionStopped);
        }

        state.next_subscription += 1;
        let id = state.next_subscription;

        let RegistryState {
            subscriptions,
            topics,
            link,
            ..
        } = &mut *state;

        let key: Arc<str> = topics
            .get_key_value(topic)
            .map_or_else(|| Arc::from(topic), |(key, _)| Arc::clone(key));
        let entry = topics
            .entry(Arc::clone(&key))
            .or_insert_with(|| TopicEntry {
                message_type: Arc::from(message_type),
                subscribers: Vec::new(),
                wire_active: false,
            });

        if *entry.message_type != *message_type {
            warn!(
                topic,
                existing = %entry.message_type,
                requested = message_type,
                "topic already subscribed with a different message type; keeping the first"
            );
        }

        entry.subscribers.push(id);
        subscriptions.insert(
            id,
            SubscriptionEntry {
                topic: Arc::clone(&key),
                sink,
            },
        );

        if !entry.wire_active {
            if let Some(link) = link.as_ref().filter(|link| link.connected) {
                self.wire_subscribe(link, &key, entry);
            }
        }

        debug!(
            topic,
            id,
            live = entry.subscribers.len(),
            deferred = !entry.wire_active,
            "subscribed"
        );

        Ok(SubscriptionHandle {
            session_id: self.inner.session_id,
            id,
            topic: key,
        })
    }

    /// Stop delivering to the subscription behind `handle`.
    ///
    /// Once this returns the sink is never invoked again. Unknown, already
    /// removed, or foreign handles are ignored.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        if handle.session_id != self.inner.session_id {
            trace!(topic = %handle.topic, "ignoring handle from another session");
            return;
        }

        let guard = self.inner.state.lock();
        let mut state = guard.borrow_mut();
        let Some(removed) = state.subscriptions.remove(&handle.id) else {
            trace!(topic = %handle.topic, id = handle.id, "already unsubscribed");
            return;
        };

        let RegistryState { topics, link, .. } = &mut *state;
        let Some(entry) = topics.get_mut(&*removed.topic) else {
            return;
        };
        entry.subscribers.retain(|id| *id != handle.id);
        debug!(topic = %removed.topic, id = handle.id, live = entry.subscribers.len(), "unsubscribed");

        if entry.subscribers.is_empty() {
            let was_active = entry.wire_active;
            topics.shift_remove(&*removed.topic);
            if was_active {
                if let Some(link) = link.as_ref().filter(|link| link.connected) {
                    if let Err(e) = link.send(self.inner.codec.encode_unsubscribe(&removed.topic)) {
                        debug!(topic = %removed.topic, error = %e, "wire unsubscribe not sent");
                    }
                }
            }
        }
    }

    // ── Publishing ───────────────────────────────────────────────────

    pub fn publisher(&self, topic: &str, message_type: &str) -> Publisher {
        Publisher {
            registry: self.clone(),
            topic: Arc::from(topic),
            message_type: Arc::from(message_type),
        }
    }

    /// Send one message on `topic`.
    ///
    /// A stopped registry always fails with `NotConnected`. Otherwise,
    /// without a connected link the configured [`OfflinePublishPolicy`]
    /// decides: `Reject` fails with `NotConnected` and sends nothing,
    /// `Buffer` queues the message for the next connection.
    pub fn publish(&self, topic: &str, message_type: &str, payload: Value) -> Result<(), CoreError> {
        let guard = self.inner.state.lock();
        let mut state = guard.borrow_mut();
        if state.stopped {
            debug!(topic, "publish rejected: session stopped");
            return Err(CoreError::NotConnected);
        }

        let RegistryState {
            link,
            advertised,
            outbox,
            ..
        } = &mut *state;

        // Queued messages go first, so a live link with a non-empty outbox
        // is still treated as offline until the flush has happened.
        if let Some(link) = link.as_ref().filter(|link| link.connected && outbox.is_empty()) {
            return self.send_publish(link, advertised, topic, message_type, &payload);
        }

        match self.inner.offline {
            OfflinePublishPolicy::Reject => {
                debug!(topic, "publish rejected: not connected");
                Err(CoreError::NotConnected)
            }
            OfflinePublishPolicy::Buffer { capacity: 0 } => Err(CoreError::NotConnected),
            OfflinePublishPolicy::Buffer { capacity } => {
                if outbox.len() >= capacity {
                    if let Some(dropped) = outbox.pop_front() {
                        warn!(topic = %dropped.topic, capacity, "offline queue full; dropping oldest publish");
                    }
                }
                outbox.push_back(QueuedPublish {
                    topic: Arc::from(topic),
                    message_type: Arc::from(message_type),
                    payload,
                });
                debug!(topic, queued = outbox.len(), "publish queued until connected");
                Ok(())
            }
        }
    }

    // ── Service calls ────────────────────────────────────────────────

    /// Send a `call_service` request and register for its response.
    pub(crate) fn begin_call(
        &self,
        service: &str,
        args: &Value,
    ) -> Result<(String, oneshot::Receiver<ServiceReply>), CoreError> {
        let guard = self.inner.state.lock();
        let mut state = guard.borrow_mut();
        if state.stopped {
            return Err(CoreError::SessionStopped);
        }

        state.next_call += 1;
        let id = format!("call_service:{service}:{}", state.next_call);

        let link = state.connected_link().ok_or(CoreError::NotConnected)?;
        link.send(self.inner.codec.encode_call_service(&id, service, args))?;

        let (reply, rx) = oneshot::channel();
        state.pending_calls.insert(
            id.clone(),
            PendingCall {
                service: service.to_owned(),
                reply,
            },
        );
        debug!(service, %id, "service call sent");
        Ok((id, rx))
    }

    /// Forget a call whose caller stopped waiting.
    pub(crate) fn cancel_call(&self, id: &str) {
        let guard = self.inner.state.lock();
        if guard.borrow_mut().pending_calls.remove(id).is_some() {
            debug!(id, "service call abandoned");
        }
    }

    // ── Inbound ──────────────────────────────────────────────────────

    /// Decode a raw frame from the link of `generation` and deliver it.
    ///
    /// Topic messages fan out to every live sink for the topic, in
    /// registration order, before this returns. Frames from a stale or
    /// disconnected link are dropped.
    pub(crate) fn route_inbound(&self, generation: u64, frame: &str) {
        let guard = self.inner.state.lock();
        {
            let state = guard.borrow();
            if state.stopped {
                return;
            }
            if !state.is_current(generation) {
                trace!(generation, "dropping frame from stale connection");
                return;
            }
            if state.connected_link().is_none() {
                trace!(generation, "dropping frame while not connected");
                return;
            }
        }

        let decoded = match self.inner.codec.decode(frame) {
            Ok(decoded) => decoded,
            Err(e) => {
                debug!(error = %e, "dropping undecodable frame");
                return;
            }
        };

        match decoded {
            DecodedFrame::Message { topic, payload } => {
                let (message, targets) = {
                    let state = guard.borrow();
                    let Some((key, entry)) = state.topics.get_key_value(topic.as_str()) else {
                        trace!(%topic, "no subscribers for topic");
                        return;
                    };
                    let message = InboundMessage {
                        topic: Arc::clone(key),
                        message_type: Arc::clone(&entry.message_type),
                        data: Arc::new(payload),
                    };
                    (message, entry.subscribers.clone())
                };

                for id in targets {
                    // Re-checked per sink: an earlier sink may have removed
                    // this one.
                    let sink = {
                        let state = guard.borrow();
                        match state.subscriptions.get(&id) {
                            Some(entry) => Arc::clone(&entry.sink),
                            None => continue,
                        }
                    };
                    sink(&message);
                }
            }
            DecodedFrame::ServiceResponse {
                id,
                service,
                values,
                result,
            } => {
                let Some(id) = id else {
                    debug!(%service, "service response without id");
                    return;
                };
                let Some(call) = guard.borrow_mut().pending_calls.remove(&id) else {
                    debug!(%service, %id, "no pending call for service response");
                    return;
                };
                let reply = if result {
                    Ok(values)
                } else {
                    Err(CoreError::ServiceFailed {
                        service: call.service,
                        message: values
                            .as_str()
                            .map_or_else(|| values.to_string(), ToOwned::to_owned),
                    })
                };
                // The caller may have timed out already.
                let _ = call.reply.send(reply);
            }
            DecodedFrame::Status { level, message } => match level.as_str() {
                "error" => warn!(%message, "broker error status"),
                "warning" => warn!(%message, "broker warning status"),
                _ => debug!(%level, %message, "broker status"),
            },
        }
    }

    // ── Link lifecycle ───────────────────────────────────────────────

    /// Listener to hand to a connector for the link of `generation`.
    ///
    /// Holds the registry weakly, so an abandoned session does not stay
    /// alive through its own transport.
    pub(crate) fn listener(&self, generation: u64) -> Arc<dyn TransportListener> {
        Arc::new(RegistryListener {
            registry: Arc::downgrade(&self.inner),
            generation,
        })
    }

    /// Make `transport` the current link.
    ///
    /// The transport may already have connected (or failed) before it is
    /// attached; its present state is applied here so nothing is missed.
    pub(crate) fn attach(
        &self,
        generation: u64,
        transport: Arc<dyn Transport>,
    ) -> Result<(), CoreError> {
        let guard = self.inner.state.lock();
        let mut state = guard.borrow_mut();
        if state.stopped {
            return Err(CoreError::SessionStopped);
        }
        deactivate(&mut state);

        let current = transport.state();
        state.link = Some(Link {
            generation,
            transport,
            connected: false,
        });
        debug!(generation, state = %current, "link attached");

        if current.is_connected() {
            self.activate(&mut state);
        }
        self.inner.state_tx.send_replace(current);
        Ok(())
    }

    /// Drop the current link and return its transport for closing.
    pub(crate) fn detach(&self) -> Option<Arc<dyn Transport>> {
        let guard = self.inner.state.lock();
        let mut state = guard.borrow_mut();
        deactivate(&mut state);
        let link = state.link.take();
        self.inner.state_tx.send_replace(ConnectionState::Disconnected);
        link.map(|link| link.transport)
    }

    fn on_transport_state(&self, generation: u64, next: &ConnectionState) {
        let guard = self.inner.state.lock();
        let mut state = guard.borrow_mut();
        if state.stopped || !state.is_current(generation) {
            trace!(generation, state = %next, "ignoring state from stale connection");
            return;
        }

        match next {
            ConnectionState::Connected => self.activate(&mut state),
            ConnectionState::Errored(_) | ConnectionState::Closed => deactivate(&mut state),
            ConnectionState::Disconnected | ConnectionState::Connecting => {}
        }
        self.inner.state_tx.send_replace(next.clone());
    }

    /// Tear everything down. Returns the transport that still needs
    /// closing, which the caller must do after this returns, or
    /// `SessionStopped` if this already happened.
    pub(crate) fn shutdown(&self) -> Result<Option<Arc<dyn Transport>>, CoreError> {
        let guard = self.inner.state.lock();
        let mut state = guard.borrow_mut();
        if state.stopped {
            return Err(CoreError::SessionStopped);
        }
        state.stopped = true;

        if let Some(link) = state.connected_link() {
            for (topic, entry) in &state.topics {
                if entry.wire_active {
                    if let Err(e) = link.send(self.inner.codec.encode_unsubscribe(topic)) {
                        debug!(%topic, error = %e, "wire unsubscribe not sent");
                    }
                }
            }
            for topic in &state.advertised {
                if let Err(e) = link.send(self.inner.codec.encode_unadvertise(topic)) {
                    debug!(%topic, error = %e, "unadvertise not sent");
                }
            }
        }

        let released = state.subscriptions.len();
        let dropped = state.outbox.len();
        state.subscriptions.clear();
        state.topics.clear();
        state.advertised.clear();
        state.outbox.clear();
        state.pending_calls.clear();
        let link = state.link.take();

        self.inner.state_tx.send_replace(ConnectionState::Closed);
        info!(
            session = %self.inner.session_id,
            released,
            dropped,
            "registry shut down"
        );
        Ok(link.map(|link| link.transport))
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn wire_subscribe(&self, link: &Link, topic: &str, entry: &mut TopicEntry) {
        match link.send(self.inner.codec.encode_subscribe(topic, &entry.message_type)) {
            Ok(()) => {
                entry.wire_active = true;
                trace!(topic, "wire subscribe sent");
            }
            Err(e) => warn!(topic, error = %e, "wire subscribe failed"),
        }
    }

    fn send_publish(
        &self,
        link: &Link,
        advertised: &mut HashSet<Arc<str>>,
        topic: &str,
        message_type: &str,
        payload: &Value,
    ) -> Result<(), CoreError> {
        if self.inner.auto_advertise && !advertised.contains(topic) {
            link.send(self.inner.codec.encode_advertise(topic, message_type))?;
            advertised.insert(Arc::from(topic));
            debug!(topic, message_type, "advertised");
        }
        link.send(self.inner.codec.encode_publish(topic, message_type, payload))?;
        trace!(topic, "published");
        Ok(())
    }

    /// Link became usable: replay deferred subscriptions, then flush queued
    /// publishes. Topics already subscribed on this link are skipped, so
    /// repeated `Connected` notifications send nothing new.
    fn activate(&self, state: &mut RegistryState) {
        let RegistryState {
            topics,
            advertised,
            outbox,
            link,
            ..
        } = state;
        let Some(link) = link.as_mut() else {
            return;
        };
        link.connected = true;
        let link = &*link;

        let mut replayed = 0_usize;
        for (topic, entry) in topics.iter_mut().filter(|(_, entry)| !entry.wire_active) {
            self.wire_subscribe(link, topic, entry);
            if entry.wire_active {
                replayed += 1;
            }
        }

        let mut flushed = 0_usize;
        while let Some(queued) = outbox.pop_front() {
            if let Err(e) = self.send_publish(
                link,
                advertised,
                &queued.topic,
                &queued.message_type,
                &queued.payload,
            ) {
                warn!(topic = %queued.topic, error = %e, "flush interrupted");
                outbox.push_front(queued);
                break;
            }
            flushed += 1;
        }

        if replayed > 0 || flushed > 0 {
            info!(generation = link.generation, replayed, flushed, "link live");
        }
    }
}

/// Link can no longer carry traffic. Subscriptions stay registered; only
/// their wire status and per-link bookkeeping reset.
fn deactivate(state: &mut RegistryState) {
    if let Some(link) = state.link.as_mut() {
        link.connected = false;
    }
    for entry in state.topics.values_mut() {
        entry.wire_active = false;
    }
    state.advertised.clear();
    if !state.pending_calls.is_empty() {
        debug!(abandoned = state.pending_calls.len(), "failing pending service calls");
        // Dropping the senders wakes the callers with an error.
        state.pending_calls.clear();
    }
}

// ── Transport listener ───────────────────────────────────────────────

struct RegistryListener {
    registry: Weak<RegistryInner>,
    generation: u64,
}

impl RegistryListener {
    fn registry(&self) -> Option<TopicRegistry> {
        self.registry.upgrade().map(|inner| TopicRegistry { inner })
    }
}

impl TransportListener for RegistryListener {
    fn on_state(&self, state: &ConnectionState) {
        if let Some(registry) = self.registry() {
            registry.on_transport_state(self.generation, state);
        }
    }

    fn on_frame(&self, frame: &str) {
        if let Some(registry) = self.registry() {
            registry.route_inbound(self.generation, frame);
        }
    }
}
