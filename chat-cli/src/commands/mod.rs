//! CLI command implementations.
//!
//! Every command takes the client and an output sink so it can be driven
//! against the mock API in tests.

pub mod auth;
pub mod delete;
pub mod edit;
pub mod history;
pub mod send;
pub mod theme;
pub mod users;
pub mod watch;

use anyhow::{anyhow, bail, Result};
use flowchat_client::{ChatApi, ChatClient, ErrorClass, KeyValueStore, Session, TickOutcome};
use flowchat_types::{ChatMessage, MessageId};

/// Restore the saved session or fail with a login hint.
pub async fn require_session<A, S>(client: &ChatClient<A, S>) -> Result<Session>
where
    A: ChatApi,
    S: KeyValueStore,
{
    client
        .restore()
        .await?
        .ok_or_else(|| anyhow!("Not logged in. Run 'flowchat login <username>' first."))
}

/// Fetch the full history once without leaving a poller running.
pub async fn sync_once<A, S>(client: &ChatClient<A, S>) -> Result<()>
where
    A: ChatApi,
    S: KeyValueStore,
{
    let transition = client.start(None).await?;
    client.stop().await;
    match transition.fetch {
        Some(TickOutcome::Merged { .. }) => Ok(()),
        Some(TickOutcome::SessionInvalid) => bail!("Session expired. Log in again."),
        _ => bail!("Could not fetch messages from the server"),
    }
}

/// Resolve a full id or a unique id prefix against the loaded history.
pub async fn resolve_id<A, S>(client: &ChatClient<A, S>, prefix: &str) -> Result<MessageId>
where
    A: ChatApi,
    S: KeyValueStore,
{
    let prefix = prefix.trim();
    if prefix.is_empty() {
        bail!("Message id must not be empty");
    }
    let mut matches: Vec<MessageId> = client
        .messages()
        .await
        .into_iter()
        .map(|m| m.id)
        .filter(|id| id.as_str().starts_with(prefix))
        .collect();

    if let Some(exact) = matches.iter().find(|id| id.as_str() == prefix) {
        return Ok(exact.clone());
    }
    match matches.len() {
        0 => bail!("No message with id {prefix}"),
        1 => Ok(matches.remove(0)),
        n => bail!("Id prefix {prefix} matches {n} messages"),
    }
}

/// One history line: `HH:MM:SS  id-prefix  user: content`.
pub fn format_message(msg: &ChatMessage) -> String {
    let ts = msg.timestamp.as_str();
    let time = ts.get(11..19).unwrap_or(ts);
    let id = msg.id.as_str().get(..8).unwrap_or(msg.id.as_str());
    let edited = if msg.edited { " (edited)" } else { "" };
    format!("{time}  {id}  {}: {}{edited}", msg.username, msg.content)
}

/// What to tell the user after a failed command.
pub fn hint(class: ErrorClass) -> &'static str {
    match class {
        ErrorClass::Auth => "Log in again with 'flowchat login <username>'.",
        ErrorClass::Validation => "Check the input and try again.",
        ErrorClass::Network => "Could not reach the server. Your input was not lost; try again.",
        ErrorClass::Server => "The server refused the request.",
        ErrorClass::Conflict => "The message is missing or belongs to someone else.",
    }
}

/// Read a password from the argument or prompt for it without echo.
pub fn password_or_prompt(password: Option<String>, prompt: &str) -> Result<String> {
    match password {
        Some(p) => Ok(p),
        None => Ok(rpassword::prompt_password(prompt)?),
    }
}
