//! `rosweb echo`: print messages from one topic.

use rosweb_core::ConnectionState;

use crate::cli::{EchoArgs, GlobalOpts};
use crate::config::Resolved;
use crate::error::CliError;
use crate::output;

pub async fn handle(
    args: &EchoArgs,
    resolved: &Resolved,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if args.count == Some(0) {
        return Ok(());
    }

    let session = super::connect(resolved).await?;
    let (handle, mut stream) = session.subscribe_stream(&args.topic, &args.message_type)?;
    let mut changes = session.connection_changes();
    tracing::info!(topic = %handle.topic(), "echoing");

    let mut seen = 0usize;
    let mut lost: Option<ConnectionState> = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            message = stream.recv() => {
                let Some(message) = message else { break };
                if !args.compact && seen > 0 {
                    output::print_output("---", global.quiet);
                }
                output::print_output(&output::render_json(&message.data, args.compact), global.quiet);
                seen += 1;
                if args.count.is_some_and(|limit| seen >= limit) {
                    break;
                }
            }
            changed = changes.wait_for(ConnectionState::is_terminal) => {
                lost = changed.ok().map(|state| (*state).clone());
                break;
            }
        }
    }

    session.unsubscribe(&handle);
    super::finish(&session).await;

    match lost {
        Some(state) => Err(CliError::ConnectionFailed {
            endpoint: resolved.session.endpoint.to_string(),
            reason: format!("connection {state} after {seen} message(s)"),
        }),
        None => Ok(()),
    }
}
