//! Command dispatch: bridges CLI args -> session operations -> output.

pub mod config_cmd;
pub mod echo;
pub mod publish;
pub mod slide;
pub mod status;
pub mod topics;

use std::time::Duration;

use rosweb_core::{CoreError, Session};

use crate::cli::{Command, GlobalOpts};
use crate::config::Resolved;
use crate::error::CliError;

/// How long the socket task gets to flush queued frames after shutdown.
const CLOSE_GRACE: Duration = Duration::from_millis(150);

/// Dispatch a session-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    resolved: &Resolved,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Status(args) => status::handle(&args, resolved, global).await,
        Command::Echo(args) => echo::handle(&args, resolved, global).await,
        Command::Publish(args) => publish::handle(&args, resolved, global).await,
        Command::Slide(args) => slide::handle(&args, resolved, global).await,
        Command::Topics => topics::handle(resolved, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}

/// Open a session and wait for the first handshake.
pub(crate) async fn connect(resolved: &Resolved) -> Result<Session, CliError> {
    let endpoint = resolved.session.endpoint.to_string();
    let session = Session::connect_ws(resolved.session.clone())
        .map_err(|err| connection_error(&endpoint, err))?;

    if let Err(err) = session.wait_until_connected(resolved.timeout()).await {
        session.shutdown();
        return Err(connection_error(&endpoint, err));
    }

    tracing::debug!(session = %session.id(), %endpoint, "session live");
    Ok(session)
}

/// Shut the session down and let the socket close cleanly.
pub(crate) async fn finish(session: &Session) {
    session.shutdown();
    tokio::time::sleep(CLOSE_GRACE).await;
}

fn connection_error(endpoint: &str, err: CoreError) -> CliError {
    match err {
        CoreError::Transport { detail } => CliError::ConnectionFailed {
            endpoint: endpoint.to_owned(),
            reason: detail,
        },
        CoreError::Timeout { timeout_ms } => CliError::ConnectionFailed {
            endpoint: endpoint.to_owned(),
            reason: format!("no handshake within {timeout_ms}ms"),
        },
        other => other.into(),
    }
}
