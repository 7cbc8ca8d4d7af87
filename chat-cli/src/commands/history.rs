//! Print the message history.

use anyhow::Result;
use std::io::Write;

use flowchat_client::{ChatApi, ChatClient, KeyValueStore};

use super::{format_message, require_session, sync_once};

/// Run the history command, optionally keeping only messages that match
/// `search` in content or author.
pub async fn run<A, S>(
    client: &ChatClient<A, S>,
    out: &mut impl Write,
    search: Option<&str>,
) -> Result<()>
where
    A: ChatApi,
    S: KeyValueStore,
{
    require_session(client).await?;
    sync_once(client).await?;

    let messages = match search {
        Some(needle) => client.query(needle).await,
        None => client.messages().await,
    };
    if messages.is_empty() {
        writeln!(out, "No messages")?;
    }
    for msg in &messages {
        writeln!(out, "{}", format_message(msg))?;
    }
    Ok(())
}
