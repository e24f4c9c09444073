//! `rosweb status`: connect and report, optionally following state changes.

use futures_util::StreamExt;

use rosweb_core::{Session, SessionState};

use crate::cli::{GlobalOpts, StatusArgs};
use crate::config::Resolved;
use crate::error::CliError;
use crate::output;

pub async fn handle(
    args: &StatusArgs,
    resolved: &Resolved,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let color = output::should_color(&global.color);
    let session = super::connect(resolved).await?;

    output::print_output(&describe(&session, resolved, color), global.quiet);

    if args.watch {
        let mut changes = session.connection_stream();
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                next = changes.next() => {
                    let Some(state) = next else { break };
                    output::print_output(
                        &format!("connection: {}", output::connection_state(&state, color)),
                        global.quiet,
                    );
                    if state.is_terminal() {
                        break;
                    }
                }
            }
        }
    }

    let degraded = session.state() == SessionState::Degraded;
    let last = session.connection_state();
    super::finish(&session).await;

    if degraded {
        return Err(CliError::ConnectionFailed {
            endpoint: resolved.session.endpoint.to_string(),
            reason: last.to_string(),
        });
    }
    Ok(())
}

fn describe(session: &Session, resolved: &Resolved, color: bool) -> String {
    let mut lines = vec![
        format!("profile:    {}", resolved.profile_name),
        format!("endpoint:   {}", resolved.session.endpoint),
        format!("session:    {}", session.id()),
        format!("state:      {}", output::session_state(session.state(), color)),
    ];
    if let Some(link) = session.link_info() {
        lines.push(format!("connection: #{} since {}", link.generation, link.created_at));
    }
    lines.join("\n")
}
