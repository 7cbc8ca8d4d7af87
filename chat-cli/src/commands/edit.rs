//! Rewrite one of your own messages.

use anyhow::Result;
use std::io::Write;

use flowchat_client::{ChatApi, ChatClient, KeyValueStore};

use super::{require_session, resolve_id, sync_once};

/// Run the edit command.
pub async fn run<A, S>(
    client: &ChatClient<A, S>,
    out: &mut impl Write,
    id: &str,
    text: &str,
) -> Result<()>
where
    A: ChatApi,
    S: KeyValueStore,
{
    require_session(client).await?;
    sync_once(client).await?;
    let id = resolve_id(client, id).await?;

    client.start_edit(&id).await?;
    client.input(text).await?;
    let edited = client.submit().await?;
    writeln!(out, "Edited {}: {}", edited.id, edited.content)?;
    Ok(())
}
