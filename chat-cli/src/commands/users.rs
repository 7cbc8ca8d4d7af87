//! List users currently online.

use anyhow::Result;
use std::io::Write;

use flowchat_client::{ChatApi, ChatClient, KeyValueStore};

use super::require_session;

/// Run the users command.
pub async fn run<A, S>(client: &ChatClient<A, S>, out: &mut impl Write) -> Result<()>
where
    A: ChatApi,
    S: KeyValueStore,
{
    require_session(client).await?;
    client.refresh_presence().await;

    let online = client.online_users().await;
    writeln!(out, "{} online", online.len())?;
    for user in &online {
        writeln!(out, "  {} ({})", user.username, user.color)?;
    }
    Ok(())
}
