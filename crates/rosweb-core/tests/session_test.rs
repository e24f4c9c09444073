// Session behaviour against the in-memory transport.
#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use url::Url;

use rosweb_api::{MemoryConnector, MemoryTransport, RosbridgeCodec, Transport};
use rosweb_core::{
    ConnectionState, CoreError, InboundMessage, MotionSettings, OfflinePublishPolicy, Session,
    SessionConfig, SessionState, SubscriptionHandle,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn config() -> SessionConfig {
    SessionConfig::new(Url::parse("ws://robot.local:9090").unwrap())
}

fn start_with(connector: &MemoryConnector, config: SessionConfig) -> Session {
    Session::start(config, Arc::new(connector.clone()), Arc::new(RosbridgeCodec)).unwrap()
}

fn start(connector: &MemoryConnector) -> Session {
    start_with(connector, config())
}

fn sent(remote: &MemoryTransport) -> Vec<Value> {
    remote
        .take_sent()
        .iter()
        .map(|frame| serde_json::from_str(frame).unwrap())
        .collect()
}

fn ops(remote: &MemoryTransport) -> Vec<String> {
    sent(remote)
        .iter()
        .map(|frame| frame["op"].as_str().unwrap().to_owned())
        .collect()
}

fn chatter(data: &str) -> String {
    json!({ "op": "publish", "topic": "/chatter", "msg": { "data": data } }).to_string()
}

fn counting(session: &Session, topic: &str) -> (SubscriptionHandle, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let sink_count = Arc::clone(&count);
    let handle = session
        .subscribe(topic, "std_msgs/String", move |_| {
            sink_count.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    (handle, count)
}

async fn wait_for_call(remote: &MemoryTransport) -> String {
    for _ in 0..200 {
        let call = remote
            .sent()
            .iter()
            .map(|frame| serde_json::from_str::<Value>(frame).unwrap())
            .find(|frame| frame["op"] == "call_service");
        if let Some(call) = call {
            return call["id"].as_str().unwrap().to_owned();
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("no call_service frame was sent");
}

// ── Fan-out and unsubscribe ─────────────────────────────────────────

#[test]
fn each_message_reaches_exactly_the_live_sinks() {
    let connector = MemoryConnector::auto_accept();
    let session = start(&connector);
    let remote = connector.last().unwrap();

    let (a, a_count) = counting(&session, "/chatter");
    let (b, b_count) = counting(&session, "/chatter");

    remote.deliver(&chatter("one"));
    assert_eq!(a_count.load(Ordering::SeqCst), 1);
    assert_eq!(b_count.load(Ordering::SeqCst), 1);

    session.unsubscribe(&a);
    session.unsubscribe(&a);
    remote.deliver(&chatter("two"));
    assert_eq!(a_count.load(Ordering::SeqCst), 1);
    assert_eq!(b_count.load(Ordering::SeqCst), 2);
    assert_eq!(session.subscriber_count("/chatter"), 1);

    session.unsubscribe(&b);
    remote.deliver(&chatter("three"));
    assert_eq!(b_count.load(Ordering::SeqCst), 2);
    assert_eq!(session.subscriber_count("/chatter"), 0);

    assert_eq!(ops(&remote), vec!["subscribe", "unsubscribe"]);
}

#[test]
fn messages_are_delivered_in_arrival_order() {
    let connector = MemoryConnector::auto_accept();
    let session = start(&connector);
    let remote = connector.last().unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink_seen = Arc::clone(&seen);
    session
        .subscribe("/chatter", "std_msgs/String", move |msg: &InboundMessage| {
            sink_seen.lock().push(msg.data["data"].as_str().unwrap().to_owned());
        })
        .unwrap();

    for data in ["a", "b", "c", "d"] {
        remote.deliver(&chatter(data));
    }
    assert_eq!(*seen.lock(), vec!["a", "b", "c", "d"]);
}

#[test]
fn sink_removed_during_delivery_is_not_invoked() {
    let connector = MemoryConnector::auto_accept();
    let session = start(&connector);
    let remote = connector.last().unwrap();

    let victim: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));
    let killer_session = session.clone();
    let killer_victim = Arc::clone(&victim);
    let killer = session
        .subscribe("/chatter", "std_msgs/String", move |_| {
            if let Some(handle) = killer_victim.lock().take() {
                killer_session.unsubscribe(&handle);
            }
        })
        .unwrap();

    let (victim_handle, victim_count) = counting(&session, "/chatter");
    *victim.lock() = Some(victim_handle);

    remote.deliver(&chatter("one"));
    assert_eq!(victim_count.load(Ordering::SeqCst), 0);
    assert_eq!(session.subscriber_count("/chatter"), 1);

    session.unsubscribe(&killer);
    assert_eq!(session.subscriber_count("/chatter"), 0);
}

#[test]
fn sink_may_unsubscribe_itself() {
    let connector = MemoryConnector::auto_accept();
    let session = start(&connector);
    let remote = connector.last().unwrap();

    let own: Arc<Mutex<Option<SubscriptionHandle>>> = Arc::new(Mutex::new(None));
    let count = Arc::new(AtomicUsize::new(0));
    let (sink_session, sink_own, sink_count) =
        (session.clone(), Arc::clone(&own), Arc::clone(&count));
    let handle = session
        .subscribe("/chatter", "std_msgs/String", move |_| {
            sink_count.fetch_add(1, Ordering::SeqCst);
            if let Some(handle) = sink_own.lock().clone() {
                sink_session.unsubscribe(&handle);
            }
        })
        .unwrap();
    *own.lock() = Some(handle);

    remote.deliver(&chatter("one"));
    remote.deliver(&chatter("two"));
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn no_delivery_after_unsubscribe_returns() {
    let connector = MemoryConnector::auto_accept();
    let session = start(&connector);
    let remote = connector.last().unwrap();
    let (handle, count) = counting(&session, "/chatter");

    let done = Arc::new(AtomicBool::new(false));
    let pump = {
        let remote = Arc::clone(&remote);
        let done = Arc::clone(&done);
        std::thread::spawn(move || {
            while !done.load(Ordering::SeqCst) {
                remote.deliver(&chatter("tick"));
            }
        })
    };

    while count.load(Ordering::SeqCst) < 10 {
        std::thread::yield_now();
    }
    session.unsubscribe(&handle);
    let at_unsubscribe = count.load(Ordering::SeqCst);

    std::thread::sleep(Duration::from_millis(20));
    done.store(true, Ordering::SeqCst);
    pump.join().unwrap();

    assert_eq!(count.load(Ordering::SeqCst), at_unsubscribe);
}

// ── Connection-state handling ───────────────────────────────────────

#[test]
fn subscribe_before_connect_is_replayed_exactly_once() {
    let connector = MemoryConnector::new();
    let session = start(&connector);
    let remote = connector.last().unwrap();

    let (_first, _) = counting(&session, "/chatter");
    let (_second, _) = counting(&session, "/chatter");
    assert!(remote.sent().is_empty());
    assert_eq!(session.state(), SessionState::Starting);

    remote.accept();
    remote.renotify();
    remote.renotify();

    assert_eq!(
        sent(&remote),
        vec![json!({ "op": "subscribe", "topic": "/chatter", "type": "std_msgs/String" })]
    );
    assert_eq!(session.state(), SessionState::Live);
}

#[test]
fn publish_while_not_connected_sends_nothing() {
    let connector = MemoryConnector::new();
    let session = start(&connector);
    let remote = connector.last().unwrap();

    let err = session
        .publish("/cmd", "std_msgs/String", json!({ "data": "x" }))
        .unwrap_err();
    assert!(matches!(err, CoreError::NotConnected));
    assert!(remote.sent().is_empty());

    remote.accept();
    session
        .publish("/cmd", "std_msgs/String", json!({ "data": "x" }))
        .unwrap();
    assert_eq!(ops(&remote), vec!["advertise", "publish"]);

    remote.fail("connection reset by peer");
    let err = session
        .publisher("/cmd", "std_msgs/String")
        .publish(json!({ "data": "y" }))
        .unwrap_err();
    assert!(matches!(err, CoreError::NotConnected));
    assert!(remote.sent().is_empty());
}

#[test]
fn failed_connection_keeps_subscriptions() {
    let connector = MemoryConnector::auto_accept();
    let session = start(&connector);
    let remote = connector.last().unwrap();
    let (_handle, count) = counting(&session, "/chatter");

    remote.remote_close();
    assert_eq!(session.connection_state(), ConnectionState::Closed);
    assert_eq!(session.state(), SessionState::Degraded);
    assert_eq!(session.subscriber_count("/chatter"), 1);

    remote.deliver(&chatter("late"));
    assert_eq!(count.load(Ordering::SeqCst), 0);
}

#[test]
fn restart_replays_live_subscriptions_on_the_new_connection() {
    let connector = MemoryConnector::new();
    let session = start(&connector);
    let first = connector.last().unwrap();
    first.accept();

    let (_handle, count) = counting(&session, "/chatter");
    assert_eq!(ops(&first), vec!["subscribe"]);

    first.fail("broken pipe");
    assert_eq!(session.state(), SessionState::Degraded);

    session.restart().unwrap();
    assert_eq!(connector.connections(), 2);
    assert_eq!(session.state(), SessionState::Starting);
    assert_eq!(session.link_info().unwrap().generation, 2);

    let second = connector.last().unwrap();
    second.accept();
    assert_eq!(session.state(), SessionState::Live);
    assert_eq!(ops(&second), vec!["subscribe"]);

    // The old connection was closed by the restart and reports nothing.
    first.renotify();
    assert_eq!(session.state(), SessionState::Live);

    second.deliver(&chatter("fresh"));
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn start_fails_when_the_connector_refuses() {
    let connector = MemoryConnector::new();
    connector.refuse_next("no route to host");
    let err = Session::start(config(), Arc::new(connector), Arc::new(RosbridgeCodec))
        .unwrap_err();
    assert!(matches!(err, CoreError::Transport { .. }));
}

// ── Shutdown ────────────────────────────────────────────────────────

#[test]
fn shutdown_twice_is_a_no_op() {
    let connector = MemoryConnector::auto_accept();
    let session = start(&connector);
    let remote = connector.last().unwrap();

    let (_handle, count) = counting(&session, "/chatter");
    session
        .publish("/cmd", "std_msgs/String", json!({ "data": "x" }))
        .unwrap();
    remote.take_sent();

    session.shutdown();
    let mut teardown = ops(&remote);
    teardown.sort();
    assert_eq!(teardown, vec!["unadvertise", "unsubscribe"]);
    assert_eq!(remote.state(), ConnectionState::Closed);
    assert_eq!(session.state(), SessionState::Stopped);

    session.shutdown();
    assert!(remote.sent().is_empty());

    remote.deliver(&chatter("after"));
    assert_eq!(count.load(Ordering::SeqCst), 0);

    assert!(matches!(
        session.subscribe("/chatter", "std_msgs/String", |_| {}),
        Err(CoreError::SessionStopped)
    ));
    assert_eq!(session.connection_state(), ConnectionState::Closed);
    let err = session
        .publish("/cmd", "std_msgs/String", json!({}))
        .unwrap_err();
    assert!(matches!(err, CoreError::NotConnected));
    assert!(err.is_connectivity());
    assert!(matches!(session.restart(), Err(CoreError::SessionStopped)));
}

#[test]
fn sink_may_shut_the_session_down() {
    let connector = MemoryConnector::auto_accept();
    let session = start(&connector);
    let remote = connector.last().unwrap();

    let sink_session = session.clone();
    session
        .subscribe("/chatter", "std_msgs/String", move |_| sink_session.shutdown())
        .unwrap();
    let (_other, other_count) = counting(&session, "/chatter");

    remote.deliver(&chatter("stop"));
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(other_count.load(Ordering::SeqCst), 0);
}

#[test]
fn handle_from_a_shut_down_session_is_ignored() {
    let connector = MemoryConnector::auto_accept();
    let old = start(&connector);
    let (stale, _) = counting(&old, "/chatter");
    old.shutdown();

    let session = start(&connector);
    let remote = connector.last().unwrap();
    let (_live, count) = counting(&session, "/chatter");
    remote.take_sent();

    session.unsubscribe(&stale);
    old.unsubscribe(&stale);

    assert_eq!(session.subscriber_count("/chatter"), 1);
    assert!(remote.sent().is_empty());
    remote.deliver(&chatter("still here"));
    assert_eq!(count.load(Ordering::SeqCst), 1);
}

// ── Offline buffering ───────────────────────────────────────────────

#[test]
fn buffered_publishes_flush_after_replay() {
    let connector = MemoryConnector::new();
    let session = start_with(
        &connector,
        config().with_offline_publish(OfflinePublishPolicy::Buffer { capacity: 8 }),
    );
    let remote = connector.last().unwrap();

    let (_handle, _) = counting(&session, "/chatter");
    session
        .publish("/cmd", "std_msgs/String", json!({ "data": "queued" }))
        .unwrap();
    assert!(remote.sent().is_empty());

    remote.accept();
    assert_eq!(
        sent(&remote),
        vec![
            json!({ "op": "subscribe", "topic": "/chatter", "type": "std_msgs/String" }),
            json!({ "op": "advertise", "topic": "/cmd", "type": "std_msgs/String" }),
            json!({ "op": "publish", "topic": "/cmd", "msg": { "data": "queued" } }),
        ]
    );
}

// ── Slider commands ─────────────────────────────────────────────────

#[test]
fn slider_publishes_motion_command() {
    let connector = MemoryConnector::auto_accept();
    let session = start(&connector);
    let remote = connector.last().unwrap();

    let slider = session.slider(&MotionSettings::default()).unwrap();
    let command = slider.set(50.0).unwrap();
    assert_eq!(command.position, 500);

    assert_eq!(
        sent(&remote),
        vec![
            json!({
                "op": "advertise",
                "topic": "motion/command",
                "type": "ainex_interfaces/MotionCommand"
            }),
            json!({
                "op": "publish",
                "topic": "motion/command",
                "msg": { "servo_id": [13], "position": [500], "duration": [1000] }
            }),
        ]
    );
}

#[test]
fn slider_after_shutdown_reports_not_connected() {
    let connector = MemoryConnector::auto_accept();
    let session = start(&connector);
    let slider = session.slider(&MotionSettings::default()).unwrap();

    session.shutdown();
    let err = slider.set(25.0).unwrap_err();
    assert!(matches!(err, CoreError::NotConnected));
    assert!(err.is_connectivity());
}

#[test]
fn slider_out_of_range_sends_nothing() {
    let connector = MemoryConnector::auto_accept();
    let session = start(&connector);
    let remote = connector.last().unwrap();

    let slider = session.slider(&MotionSettings::default()).unwrap();
    assert!(matches!(slider.set(101.0), Err(CoreError::OutOfRange { .. })));
    assert!(remote.sent().is_empty());
}

// ── Async surface ───────────────────────────────────────────────────

#[tokio::test]
async fn topic_stream_yields_messages_then_ends_after_unsubscribe() {
    use futures_util::StreamExt;

    let connector = MemoryConnector::auto_accept();
    let session = start(&connector);
    let remote = connector.last().unwrap();

    let (handle, mut stream) = session
        .subscribe_stream("/chatter", "std_msgs/String")
        .unwrap();
    assert_eq!(stream.handle(), &handle);

    remote.deliver(&chatter("one"));
    remote.deliver(&chatter("two"));
    session.unsubscribe(&handle);
    remote.deliver(&chatter("three"));

    let first = stream.recv().await.unwrap();
    assert_eq!(first.data["data"], "one");
    let second = stream.next().await.unwrap();
    assert_eq!(second.data["data"], "two");
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn wait_until_connected_resolves_on_handshake() {
    let connector = MemoryConnector::new();
    let session = start(&connector);
    let remote = connector.last().unwrap();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        remote.accept();
    });

    session
        .wait_until_connected(Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(session.state(), SessionState::Live);
}

#[tokio::test]
async fn wait_until_connected_reports_errors() {
    let connector = MemoryConnector::new();
    let session = start(&connector);
    connector.last().unwrap().fail("connection refused");

    let err = session
        .wait_until_connected(Duration::from_secs(5))
        .await
        .unwrap_err();
    match err {
        CoreError::Transport { detail } => assert_eq!(detail, "connection refused"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn topics_lists_broker_topics() {
    let connector = MemoryConnector::auto_accept();
    let session = start(&connector);
    let remote = connector.last().unwrap();

    let call = tokio::spawn({
        let session = session.clone();
        async move { session.topics().await }
    });

    let id = wait_for_call(&remote).await;
    assert!(id.starts_with("call_service:/rosapi/topics:"));
    remote.deliver(
        &json!({
            "op": "service_response",
            "id": id,
            "service": "/rosapi/topics",
            "values": {
                "topics": ["/chatter", "/motion/command"],
                "types": ["std_msgs/String", "ainex_interfaces/MotionCommand"]
            },
            "result": true
        })
        .to_string(),
    );

    let topics = call.await.unwrap().unwrap();
    assert_eq!(topics.topics, vec!["/chatter", "/motion/command"]);
    assert_eq!(
        topics.entries().next(),
        Some(("/chatter", "std_msgs/String"))
    );
}

#[tokio::test]
async fn failed_service_call_reports_broker_message() {
    let connector = MemoryConnector::auto_accept();
    let session = start(&connector);
    let remote = connector.last().unwrap();

    let call = tokio::spawn({
        let session = session.clone();
        async move { session.call_service("/missing", json!({})).await }
    });

    let id = wait_for_call(&remote).await;
    remote.deliver(
        &json!({
            "op": "service_response",
            "id": id,
            "service": "/missing",
            "values": "Service /missing does not exist",
            "result": false
        })
        .to_string(),
    );

    match call.await.unwrap().unwrap_err() {
        CoreError::ServiceFailed { service, message } => {
            assert_eq!(service, "/missing");
            assert_eq!(message, "Service /missing does not exist");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn service_call_fails_when_link_drops() {
    let connector = MemoryConnector::auto_accept();
    let session = start(&connector);
    let remote = connector.last().unwrap();

    let call = tokio::spawn({
        let session = session.clone();
        async move { session.call_service("/slow", json!({})).await }
    });

    wait_for_call(&remote).await;
    remote.fail("connection reset");

    assert!(matches!(
        call.await.unwrap(),
        Err(CoreError::NotConnected)
    ));
}

#[tokio::test(start_paused = true)]
async fn service_call_times_out() {
    let connector = MemoryConnector::auto_accept();
    let session = start_with(
        &connector,
        config().with_request_timeout(Duration::from_millis(250)),
    );

    let err = session.call_service("/slow", json!({})).await.unwrap_err();
    assert!(matches!(err, CoreError::Timeout { timeout_ms: 250 }));
}

#[tokio::test]
async fn service_call_needs_a_connection() {
    let connector = MemoryConnector::new();
    let session = start(&connector);

    let err = session.call_service("/any", json!({})).await.unwrap_err();
    assert!(matches!(err, CoreError::NotConnected));
}
