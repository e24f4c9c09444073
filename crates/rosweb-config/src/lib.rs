//! Shared configuration for the rosweb CLI and embedding apps.
//!
//! TOML profiles merged with `ROSWEB_` environment overrides, and
//! translation to `rosweb_core::SessionConfig` / `MotionSettings`. The
//! CLI layers its own flag overrides on top.
//!
//! ```toml
//! default_profile = "lab"
//!
//! [profiles.lab]
//! endpoint = "ws://192.168.1.20:9090"
//! offline_publish = "buffer"
//! buffer_capacity = 32
//!
//! [profiles.lab.motion]
//! actuator_id = 13
//! scale_factor = 10.0
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use rosweb_core::{
    MotionCommand, MotionSettings, OfflinePublishPolicy, SessionConfig, DEFAULT_ROSBRIDGE_PORT,
};

/// Prefix for environment overrides. Nested keys use `__`, e.g.
/// `ROSWEB_PROFILES__LAB__ENDPOINT`.
pub const ENV_PREFIX: &str = "ROSWEB_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    UnknownProfile { name: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named on the command line.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named broker profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Name of the profile to use: `requested`, else `default_profile`,
    /// else `"default"`.
    pub fn profile_name<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .or(self.default_profile.as_deref())
            .unwrap_or("default")
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::UnknownProfile { name: name.into() })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_color")]
    pub color: String,

    /// Service call timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_true")]
    pub auto_advertise: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            color: default_color(),
            timeout: default_timeout(),
            auto_advertise: true,
        }
    }
}

fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    10
}
fn default_true() -> bool {
    true
}

/// A named broker profile.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Profile {
    /// rosbridge endpoint (e.g., "ws://192.168.1.20:9090").
    pub endpoint: String,

    /// Override the default service call timeout (seconds).
    pub timeout: Option<u64>,

    pub auto_advertise: Option<bool>,

    /// "reject" (default) or "buffer".
    pub offline_publish: Option<String>,

    /// Queue size when `offline_publish = "buffer"`.
    pub buffer_capacity: Option<usize>,

    #[serde(default)]
    pub motion: MotionProfile,
}

impl Profile {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: None,
            auto_advertise: None,
            offline_publish: None,
            buffer_capacity: None,
            motion: MotionProfile::default(),
        }
    }
}

/// Slider-to-actuator mapping of a profile.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MotionProfile {
    pub topic: String,
    pub message_type: String,
    pub actuator_id: u16,
    pub scale_factor: f64,
    pub duration_ms: u32,
    pub min: f64,
    pub max: f64,
}

impl Default for MotionProfile {
    fn default() -> Self {
        let settings = MotionSettings::default();
        Self {
            topic: settings.topic,
            message_type: settings.message_type,
            actuator_id: settings.actuator_id,
            scale_factor: settings.scale_factor,
            duration_ms: settings.duration_ms,
            min: *settings.range.start(),
            max: *settings.range.end(),
        }
    }
}

impl MotionProfile {
    pub fn to_settings(&self) -> Result<MotionSettings, ConfigError> {
        if !self.min.is_finite() || !self.max.is_finite() || self.min > self.max {
            return Err(ConfigError::Validation {
                field: "motion.min/motion.max".into(),
                reason: format!("{}..={} is not a valid range", self.min, self.max),
            });
        }
        if !self.scale_factor.is_finite() {
            return Err(ConfigError::Validation {
                field: "motion.scale_factor".into(),
                reason: "must be a finite number".into(),
            });
        }
        if self.message_type.is_empty() {
            return Err(ConfigError::Validation {
                field: "motion.message_type".into(),
                reason: format!("must not be empty (e.g. {})", MotionCommand::MESSAGE_TYPE),
            });
        }

        Ok(MotionSettings {
            topic: self.topic.clone(),
            message_type: self.message_type.clone(),
            actuator_id: self.actuator_id,
            scale_factor: self.scale_factor,
            duration_ms: self.duration_ms,
            range: self.min..=self.max,
        })
    }
}

/// Endpoint used when neither a profile nor a flag names one.
pub fn default_endpoint() -> String {
    format!("ws://localhost:{DEFAULT_ROSBRIDGE_PORT}")
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "rosweb", "rosweb").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("rosweb");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file is not an error.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(&path, cfg)?;
    Ok(path)
}

pub fn save_config_to(path: &Path, cfg: &Config) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Translation to core types ───────────────────────────────────────

pub fn parse_offline_policy(
    mode: Option<&str>,
    capacity: Option<usize>,
) -> Result<OfflinePublishPolicy, ConfigError> {
    match mode.unwrap_or("reject") {
        "reject" => Ok(OfflinePublishPolicy::Reject),
        "buffer" => Ok(OfflinePublishPolicy::Buffer {
            capacity: capacity.unwrap_or(64),
        }),
        other => Err(ConfigError::Validation {
            field: "offline_publish".into(),
            reason: format!("expected 'reject' or 'buffer', got '{other}'"),
        }),
    }
}

/// Build a `SessionConfig` from a profile, with no flag overrides.
pub fn profile_to_session_config(
    profile: &Profile,
    defaults: &Defaults,
) -> Result<SessionConfig, ConfigError> {
    let endpoint: url::Url = profile
        .endpoint
        .parse()
        .map_err(|_| ConfigError::Validation {
            field: "endpoint".into(),
            reason: format!("invalid URL: {}", profile.endpoint),
        })?;
    if !matches!(endpoint.scheme(), "ws" | "wss") {
        return Err(ConfigError::Validation {
            field: "endpoint".into(),
            reason: format!("expected ws:// or wss://, got {endpoint}"),
        });
    }

    let offline = parse_offline_policy(profile.offline_publish.as_deref(), profile.buffer_capacity)?;

    Ok(SessionConfig::new(endpoint)
        .with_request_timeout(Duration::from_secs(
            profile.timeout.unwrap_or(defaults.timeout),
        ))
        .with_auto_advertise(profile.auto_advertise.unwrap_or(defaults.auto_advertise))
        .with_offline_publish(offline))
}
