//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use rosweb_config::ConfigError;
use rosweb_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to rosbridge at {endpoint}")]
    #[diagnostic(
        code(rosweb::connection_failed),
        help(
            "Check that rosbridge_server is running and reachable.\n\
             Endpoint: {endpoint}\n\
             Try: rosweb status --endpoint ws://<host>:9090"
        )
    )]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("Not connected to the broker")]
    #[diagnostic(
        code(rosweb::not_connected),
        help("The connection dropped before the operation completed. Run the command again.")
    )]
    NotConnected,

    #[error("Timed out after {millis}ms")]
    #[diagnostic(
        code(rosweb::timeout),
        help("Increase the timeout with --timeout or check broker responsiveness.")
    )]
    Timeout { millis: u64 },

    // ── Commands ─────────────────────────────────────────────────────

    #[error("Slider value {value} is outside {min}..={max}")]
    #[diagnostic(
        code(rosweb::out_of_range),
        help("Pick a value inside the range, or widen motion.min / motion.max in the profile.")
    )]
    OutOfRange { value: f64, min: f64, max: f64 },

    #[error("Service {service} failed: {message}")]
    #[diagnostic(code(rosweb::service_failed))]
    ServiceFailed { service: String, message: String },

    #[error("Could not encode message: {message}")]
    #[diagnostic(code(rosweb::encoding))]
    Encoding { message: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(rosweb::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(rosweb::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: rosweb config init"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration file already exists at {path}")]
    #[diagnostic(
        code(rosweb::config_exists),
        help("Pass --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(code(rosweb::config))]
    Config(Box<ConfigError>),

    // ── IO / Serialization ────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(rosweb::json), help("Pass a JSON object, e.g. '{{\"data\":\"hi\"}}'."))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::NotConnected => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::ConfigExists { .. } => exit_code::CONFLICT,
            Self::OutOfRange { .. } | Self::Validation { .. } | Self::Json(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotConnected | CoreError::SessionStopped => CliError::NotConnected,

            CoreError::Transport { detail } => CliError::ConnectionFailed {
                endpoint: "(session)".into(),
                reason: detail,
            },

            CoreError::Timeout { timeout_ms } => CliError::Timeout { millis: timeout_ms },

            CoreError::OutOfRange { value, min, max } => CliError::OutOfRange { value, min, max },

            CoreError::Encoding { message } => CliError::Encoding { message },

            CoreError::ServiceFailed { service, message } => {
                CliError::ServiceFailed { service, message }
            }

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::UnknownProfile { name } => CliError::ProfileNotFound {
                name,
                available: "(none)".into(),
            },
            other => CliError::Config(Box::new(other)),
        }
    }
}
