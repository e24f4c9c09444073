// ── Core error types ──
//
// User-facing errors from rosweb-core. Consumers never see raw frames or
// socket errors: the `From<rosweb_api::Error>` impl folds transport-layer
// failures into the handful of outcomes a caller can act on.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Not connected to the broker")]
    NotConnected,

    #[error("Session has been shut down")]
    SessionStopped,

    #[error("Transport error: {detail}")]
    Transport { detail: String },

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    // ── Command errors ───────────────────────────────────────────────
    #[error("Value {value} is outside the allowed range {min}..={max}")]
    OutOfRange { value: f64, min: f64, max: f64 },

    #[error("Failed to encode message: {message}")]
    Encoding { message: String },

    // ── Service errors ───────────────────────────────────────────────
    #[error("Service {service} failed: {message}")]
    ServiceFailed { service: String, message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// `true` when the operation could succeed once the link is back.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::Transport { .. } | Self::Timeout { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<rosweb_api::Error> for CoreError {
    fn from(err: rosweb_api::Error) -> Self {
        match err {
            rosweb_api::Error::NotConnected | rosweb_api::Error::Closed => CoreError::NotConnected,
            rosweb_api::Error::WebSocketConnect(reason) => CoreError::Transport {
                detail: format!("WebSocket connection failed: {reason}"),
            },
            rosweb_api::Error::WebSocketClosed { code, reason } => CoreError::Transport {
                detail: format!("WebSocket closed (code {code}): {reason}"),
            },
            rosweb_api::Error::InvalidUrl(message) => CoreError::Config { message },
            rosweb_api::Error::Encode(e) => CoreError::Encoding {
                message: e.to_string(),
            },
            rosweb_api::Error::Deserialization { message, body: _ } => CoreError::Encoding {
                message: format!("malformed frame: {message}"),
            },
            rosweb_api::Error::UnsupportedFrame(op) => CoreError::Encoding {
                message: format!("unsupported operation `{op}`"),
            },
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Encoding {
            message: err.to_string(),
        }
    }
}
