//! Translation from config file + flags to core types.
//!
//! Precedence: flag > env var > profile > defaults. Core never sees the
//! TOML types; it receives a pre-built `SessionConfig`.

use std::time::Duration;

use rosweb_config::{Config, Profile};
use rosweb_core::{MotionSettings, SessionConfig};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Everything a session-bound command needs.
#[derive(Debug)]
pub struct Resolved {
    pub profile_name: String,
    pub session: SessionConfig,
    pub motion: MotionSettings,
}

impl Resolved {
    /// Budget for the initial handshake and for each service call.
    pub fn timeout(&self) -> Duration {
        self.session.request_timeout
    }
}

/// Load the config file and resolve the active profile.
pub fn resolve(global: &GlobalOpts) -> Result<Resolved, CliError> {
    let cfg = rosweb_config::load_config()?;
    resolve_with(&cfg, global)
}

pub fn resolve_with(cfg: &Config, global: &GlobalOpts) -> Result<Resolved, CliError> {
    let profile_name = cfg.profile_name(global.profile.as_deref()).to_owned();

    let mut profile = match cfg.profiles.get(&profile_name) {
        Some(profile) => profile.clone(),
        // An explicitly requested profile must exist.
        None if global.profile.is_some() => {
            return Err(CliError::ProfileNotFound {
                name: profile_name,
                available: available_profiles(cfg),
            });
        }
        None => Profile::new(rosweb_config::default_endpoint()),
    };

    if let Some(ref endpoint) = global.endpoint {
        profile.endpoint.clone_from(endpoint);
    }
    if let Some(timeout) = global.timeout {
        if timeout == 0 {
            return Err(CliError::Validation {
                field: "timeout".into(),
                reason: "must be at least 1 second".into(),
            });
        }
        profile.timeout = Some(timeout);
    }

    let session = rosweb_config::profile_to_session_config(&profile, &cfg.defaults)?;
    let motion = profile.motion.to_settings()?;

    tracing::debug!(
        profile = %profile_name,
        endpoint = %session.endpoint,
        "resolved session config"
    );

    Ok(Resolved {
        profile_name,
        session,
        motion,
    })
}

pub fn available_profiles(cfg: &Config) -> String {
    if cfg.profiles.is_empty() {
        return "(none)".into();
    }
    let mut names: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
    names.sort_unstable();
    names.join(", ")
}
