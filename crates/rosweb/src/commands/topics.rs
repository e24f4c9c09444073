//! `rosweb topics`: ask rosapi for the broker's topic list.

use rosweb_core::TopicList;

use crate::cli::GlobalOpts;
use crate::config::Resolved;
use crate::error::CliError;
use crate::output;

pub async fn handle(resolved: &Resolved, global: &GlobalOpts) -> Result<(), CliError> {
    let session = super::connect(resolved).await?;
    let listed = session.topics().await;
    super::finish(&session).await;

    output::print_output(&render(&listed?), global.quiet);
    Ok(())
}

/// One topic per line, types aligned in a second column.
fn render(list: &TopicList) -> String {
    let width = list.entries().map(|(topic, _)| topic.len()).max().unwrap_or(0);
    list.entries()
        .map(|(topic, message_type)| {
            if message_type.is_empty() {
                topic.to_owned()
            } else {
                format!("{topic:<width$}  {message_type}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
