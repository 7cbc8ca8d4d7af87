//! Show or change the display theme.

use anyhow::{bail, Result};
use std::io::Write;

use flowchat_client::{ChatApi, ChatClient, KeyValueStore, Theme};

/// Run the theme command. `choice` is `light`, `dark`, `toggle`, or `None`
/// to print the saved theme.
pub async fn run<A, S>(
    client: &ChatClient<A, S>,
    out: &mut impl Write,
    choice: Option<&str>,
) -> Result<()>
where
    A: ChatApi,
    S: KeyValueStore,
{
    let store = client.storage();
    let current = Theme::load(store).await?;
    let next = match choice {
        None => {
            writeln!(out, "{current}")?;
            return Ok(());
        }
        Some("toggle") => current.toggled(),
        Some(other) => match other.parse::<Theme>() {
            Ok(theme) => theme,
            Err(e) => bail!("{e} (expected light, dark or toggle)"),
        },
    };
    next.save(store).await?;
    writeln!(out, "Theme set to {next}")?;
    Ok(())
}
