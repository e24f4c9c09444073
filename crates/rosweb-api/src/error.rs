use thiserror::Error;

/// Top-level error type for the `rosweb-api` crate.
///
/// Covers every failure mode of the transport and the wire codec.
/// `rosweb-core` maps these into session-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Connection state ────────────────────────────────────────────
    /// A frame was sent before the connection finished its handshake,
    /// or after it failed.
    #[error("Transport is not connected")]
    NotConnected,

    /// The connection was closed locally; it will never send again.
    #[error("Transport is closed")]
    Closed,

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket handshake or read failed.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// The broker closed the WebSocket.
    #[error("WebSocket closed (code {code}): {reason}")]
    WebSocketClosed { code: u16, reason: String },

    /// Endpoint URL could not be used for a WebSocket connection.
    #[error("Invalid endpoint: {0}")]
    InvalidUrl(String),

    // ── Framing ─────────────────────────────────────────────────────
    /// An outbound frame could not be serialized.
    #[error("Failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    /// An inbound frame was not valid JSON, with the raw text for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// An inbound frame parsed but carries an operation this client does
    /// not handle.
    #[error("Unsupported frame operation: {0}")]
    UnsupportedFrame(String),
}

impl Error {
    /// Returns `true` if the error comes from the socket rather than from
    /// local state or framing.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::WebSocketConnect(_) | Self::WebSocketClosed { .. }
        )
    }

    /// Returns `true` if retrying on a fresh connection might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::WebSocketConnect(_) | Self::WebSocketClosed { .. }
        )
    }
}
