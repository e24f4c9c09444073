//! Output helpers: color detection, state rendering, JSON.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use rosweb_core::{ConnectionState, SessionState};

use crate::cli::ColorMode;

/// Determine whether color output should be enabled.
pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

pub fn session_state(state: SessionState, color: bool) -> String {
    let label = state.to_string();
    if !color {
        return label;
    }
    match state {
        SessionState::Live => label.green().bold().to_string(),
        SessionState::Degraded => label.red().bold().to_string(),
        SessionState::Starting => label.yellow().to_string(),
        SessionState::Idle | SessionState::Stopped => label.dimmed().to_string(),
    }
}

pub fn connection_state(state: &ConnectionState, color: bool) -> String {
    let label = state.to_string();
    if !color {
        return label;
    }
    match state {
        ConnectionState::Connected => label.green().to_string(),
        ConnectionState::Errored(_) => label.red().to_string(),
        ConnectionState::Connecting => label.yellow().to_string(),
        ConnectionState::Disconnected | ConnectionState::Closed => label.dimmed().to_string(),
    }
}

/// Pretty or single-line JSON.
pub fn render_json(value: &serde_json::Value, compact: bool) -> String {
    if compact {
        value.to_string()
    } else {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}
