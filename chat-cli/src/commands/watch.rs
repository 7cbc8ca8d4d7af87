//! Follow the conversation live until interrupted.

use anyhow::Result;
use std::collections::HashSet;
use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use flowchat_client::{ChatApi, ChatClient, ChatEvent, EndReason, KeyValueStore, PollDriver};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use super::{format_message, require_session};

/// Run the watch command until `shutdown` resolves or the session ends.
pub async fn run<A, S>(
    client: Arc<ChatClient<A, S>>,
    out: &mut impl Write,
    shutdown: impl Future<Output = ()>,
) -> Result<()>
where
    A: ChatApi + 'static,
    S: KeyValueStore + 'static,
{
    let session = require_session(&client).await?;
    writeln!(out, "Watching as {} (Ctrl-C to quit)", session.username)?;

    let mut events = client.subscribe();
    let driver = PollDriver::start(client.clone(), None).await?;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            event = events.recv() => match event {
                Ok(ChatEvent::MessagesMerged { ids }) => {
                    let ids: HashSet<_> = ids.into_iter().collect();
                    for msg in client.messages().await.iter().filter(|m| ids.contains(&m.id)) {
                        writeln!(out, "{}", format_message(msg))?;
                    }
                }
                Ok(ChatEvent::PresenceChanged { online }) => {
                    writeln!(out, "* {online} online")?;
                }
                Ok(ChatEvent::SessionEnded { reason }) => {
                    match reason {
                        EndReason::Invalidated => writeln!(out, "* Session expired. Log in again.")?,
                        EndReason::Logout => writeln!(out, "* Logged out")?,
                    }
                    break;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event stream lagged");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    driver.stop().await;
    Ok(())
}
