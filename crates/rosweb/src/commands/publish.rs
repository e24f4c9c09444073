//! `rosweb publish`: send one message.

use crate::cli::{GlobalOpts, PublishArgs};
use crate::config::Resolved;
use crate::error::CliError;
use crate::output;

pub async fn handle(
    args: &PublishArgs,
    resolved: &Resolved,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    // Validate the payload before touching the network.
    let message: serde_json::Value = serde_json::from_str(&args.message)?;
    if !message.is_object() {
        return Err(CliError::Validation {
            field: "message".into(),
            reason: "must be a JSON object".into(),
        });
    }

    let session = super::connect(resolved).await?;
    let published = session.publish(&args.topic, &args.message_type, message);
    super::finish(&session).await;
    published?;

    output::print_output(
        &format!("published 1 message to {}", args.topic),
        global.quiet,
    );
    Ok(())
}
