//! Post a new message.

use anyhow::Result;
use std::io::Write;

use flowchat_client::{ChatApi, ChatClient, KeyValueStore};

use super::require_session;

/// Run the send command.
///
/// The message is not shown locally until the next poll picks it up.
pub async fn run<A, S>(client: &ChatClient<A, S>, out: &mut impl Write, text: &str) -> Result<()>
where
    A: ChatApi,
    S: KeyValueStore,
{
    require_session(client).await?;
    client.input(text).await?;
    let sent = client.submit().await?;
    writeln!(out, "Sent {}", sent.id)?;
    Ok(())
}
