// ── Runtime session configuration ──
//
// These types describe *how* a session talks to its broker. They never
// touch disk: the CLI (or any embedding app) builds a `SessionConfig`
// from whatever source it likes and hands it in.

use std::time::Duration;

use url::Url;

/// Port `rosbridge_server` listens on out of the box.
pub const DEFAULT_ROSBRIDGE_PORT: u16 = 9090;

/// What `publish` does while the link is down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OfflinePublishPolicy {
    /// Fail immediately with `NotConnected`.
    #[default]
    Reject,
    /// Queue up to `capacity` messages and flush them, oldest first, once
    /// connected. When full, the oldest queued message is dropped.
    Buffer { capacity: usize },
}

/// Configuration for a single session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Broker endpoint (e.g., `ws://192.168.1.20:9090`).
    pub endpoint: Url,
    /// Upper bound on a service call round trip.
    pub request_timeout: Duration,
    /// Send an `advertise` before the first publish on each topic.
    pub auto_advertise: bool,
    pub offline_publish: OfflinePublishPolicy,
}

impl SessionConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            request_timeout: Duration::from_secs(10),
            auto_advertise: true,
            offline_publish: OfflinePublishPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_offline_publish(mut self, policy: OfflinePublishPolicy) -> Self {
        self.offline_publish = policy;
        self
    }

    #[must_use]
    pub fn with_auto_advertise(mut self, enabled: bool) -> Self {
        self.auto_advertise = enabled;
        self
    }
}
