//! Account commands: register, login, logout, whoami.

use anyhow::Result;
use std::io::Write;

use flowchat_client::{ChatApi, ChatClient, ClientError, KeyValueStore, SessionError};

/// Create an account and save its token.
pub async fn register<A, S>(
    client: &ChatClient<A, S>,
    out: &mut impl Write,
    username: &str,
    email: Option<&str>,
    password: &str,
) -> Result<()>
where
    A: ChatApi,
    S: KeyValueStore,
{
    let session = client.register(username, email, password).await?;
    writeln!(out, "Registered and logged in as {}", session.username)?;
    Ok(())
}

/// Log in and save the token for later commands.
pub async fn login<A, S>(
    client: &ChatClient<A, S>,
    out: &mut impl Write,
    username: &str,
    password: &str,
) -> Result<()>
where
    A: ChatApi,
    S: KeyValueStore,
{
    let session = client.login(username, password).await?;
    writeln!(out, "Logged in as {}", session.username)?;
    Ok(())
}

/// End the saved session, locally and on the server.
pub async fn logout<A, S>(client: &ChatClient<A, S>, out: &mut impl Write) -> Result<()>
where
    A: ChatApi,
    S: KeyValueStore,
{
    match client.restore().await {
        Ok(Some(session)) => {
            client.logout().await?;
            writeln!(out, "Logged out {}", session.username)?;
        }
        Ok(None) | Err(ClientError::Session(SessionError::Invalid)) => {
            writeln!(out, "Not logged in")?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Show the identity behind the saved token.
pub async fn whoami<A, S>(client: &ChatClient<A, S>, out: &mut impl Write) -> Result<()>
where
    A: ChatApi,
    S: KeyValueStore,
{
    match client.restore().await {
        Ok(Some(session)) => writeln!(out, "{} ({})", session.username, session.color)?,
        Ok(None) => writeln!(out, "Not logged in")?,
        Err(ClientError::Session(SessionError::Invalid)) => {
            writeln!(out, "Saved session expired. Log in again.")?
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::*;
    use flowchat_client::{ApiError, ErrorClass, TOKEN_KEY};

    #[tokio::test]
    async fn register_then_whoami() {
        let (client, _) = client();
        let mut out = Vec::new();
        register(&client, &mut out, "carol", Some("carol@example.com"), "secret3")
            .await
            .unwrap();
        whoami(&client, &mut out).await.unwrap();

        let text = output(out);
        assert!(text.contains("Registered and logged in as carol"));
        assert!(text.contains("carol ("));
    }

    #[tokio::test]
    async fn register_taken_username() {
        let (client, _) = client();
        let err = register(&client, &mut Vec::new(), "alice", None, "secret9")
            .await
            .unwrap_err();
        let class = err.downcast_ref::<ClientError>().unwrap().class();
        assert_eq!(class, ErrorClass::Server);
    }

    #[tokio::test]
    async fn login_saves_token() {
        let (client, _) = client();
        let mut out = Vec::new();
        login(&client, &mut out, "alice", "secret1").await.unwrap();

        assert_eq!(output(out), "Logged in as alice\n");
        assert!(client.storage().get(TOKEN_KEY).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn bad_password_is_auth_error() {
        let (client, _) = client();
        let err = login(&client, &mut Vec::new(), "alice", "wrong-pw")
            .await
            .unwrap_err();
        let class = err.downcast_ref::<ClientError>().unwrap().class();
        assert_eq!(class, ErrorClass::Auth);
        assert!(client.storage().get(TOKEN_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn logout_clears_token_and_server_session() {
        let (client, api) = logged_in().await;
        let token = client.storage().get(TOKEN_KEY).await.unwrap().unwrap();

        let mut out = Vec::new();
        logout(&client, &mut out).await.unwrap();

        assert_eq!(output(out), "Logged out alice\n");
        assert!(client.storage().get(TOKEN_KEY).await.unwrap().is_none());
        assert!(!api.token_is_live(&token));
    }

    #[tokio::test]
    async fn logout_survives_server_failure() {
        let (client, api) = logged_in().await;
        api.fail_next_logout(ApiError::Timeout);

        logout(&client, &mut Vec::new()).await.unwrap();
        assert!(client.storage().get(TOKEN_KEY).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn logout_without_session() {
        let (client, _) = client();
        let mut out = Vec::new();
        logout(&client, &mut out).await.unwrap();
        assert_eq!(output(out), "Not logged in\n");
    }

    #[tokio::test]
    async fn whoami_with_revoked_token() {
        let (client, api) = logged_in().await;
        api.revoke_all_tokens();

        let mut out = Vec::new();
        whoami(&client, &mut out).await.unwrap();
        assert!(output(out).contains("expired"));
        assert!(client.storage().get(TOKEN_KEY).await.unwrap().is_none());
    }
}
