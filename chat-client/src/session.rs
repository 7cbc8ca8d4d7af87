//! Session lifecycle: login, registration, restore, logout.
//!
//! The manager owns the only copy of the bearer token, its durable mirror in
//! storage, and a generation counter. The counter is bumped whenever a
//! session ends, so a response to a request issued under an older generation
//! can be recognised and dropped.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use flowchat_core::validate::{self, ValidationError};
use flowchat_types::{AuthResponse, LoginRequest, RegisterRequest};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{ApiError, ChatApi};
use crate::storage::{KeyValueStore, StorageError, TOKEN_KEY};

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The server rejected the username/password pair.
    #[error("invalid username or password")]
    InvalidCredentials,

    /// Registration conflict.
    #[error("username is already taken")]
    UsernameTaken,

    /// Registration password below the minimum length.
    #[error("password must be at least {min} characters")]
    WeakPassword {
        /// Required minimum.
        min: usize,
    },

    /// Form input failed validation; no request was made.
    #[error(transparent)]
    Validation(ValidationError),

    /// A stored token was rejected by the server.
    #[error("saved session is no longer valid")]
    Invalid,

    /// No session is active.
    #[error("not logged in")]
    NotLoggedIn,

    /// Any other API failure.
    #[error("api error: {0}")]
    Api(#[from] ApiError),

    /// Persisting or clearing the token failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<ValidationError> for SessionError {
    fn from(e: ValidationError) -> Self {
        match e {
            ValidationError::PasswordTooShort { min } => SessionError::WeakPassword { min },
            other => SessionError::Validation(other),
        }
    }
}

/// An authenticated identity.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    /// Canonical identity name.
    pub username: String,
    /// Display color.
    pub color: String,
    token: String,
    valid: bool,
}

impl Session {
    fn from_auth(auth: AuthResponse) -> Self {
        Self {
            username: auth.username,
            color: auth.color,
            token: auth.token,
            valid: true,
        }
    }

    /// Opaque bearer token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// `false` once the session has been ended.
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username)
            .field("color", &self.color)
            .field("token", &"[REDACTED]")
            .field("valid", &self.valid)
            .finish()
    }
}

/// Token and generation captured when a request is issued.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    /// Bearer token to send.
    pub token: String,
    /// Identity the token belongs to.
    pub username: String,
    /// Session generation at capture time.
    pub generation: u64,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct SessionSlot {
    session: Option<Session>,
    generation: u64,
}

impl SessionSlot {
    /// End the current session, if any, and bump the generation.
    fn end(&mut self) -> Option<Session> {
        let mut ended = self.session.take()?;
        self.generation += 1;
        ended.valid = false;
        Some(ended)
    }
}

/// Owns the active session and its durable token.
pub struct SessionManager<A, S> {
    api: A,
    storage: S,
    slot: Mutex<SessionSlot>,
}

impl<A: ChatApi, S: KeyValueStore> SessionManager<A, S> {
    /// Create a manager with no active session.
    pub fn new(api: A, storage: S) -> Self {
        Self {
            api,
            storage,
            slot: Mutex::new(SessionSlot::default()),
        }
    }

    fn slot(&self) -> MutexGuard<'_, SessionSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// API the manager authenticates against.
    pub fn api(&self) -> &A {
        &self.api
    }

    /// Durable storage backing the token.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Active session, if any.
    pub fn current(&self) -> Option<Session> {
        self.slot().session.clone()
    }

    /// Capture the token and generation for a request about to be issued.
    pub fn credential(&self) -> Option<Credential> {
        let slot = self.slot();
        slot.session.as_ref().map(|s| Credential {
            token: s.token.clone(),
            username: s.username.clone(),
            generation: slot.generation,
        })
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        self.slot().generation
    }

    /// Whether a request captured at `generation` still belongs to the
    /// active session.
    pub fn is_current(&self, generation: u64) -> bool {
        let slot = self.slot();
        slot.session.is_some() && slot.generation == generation
    }

    /// Authenticate with username and password.
    ///
    /// Empty fields are rejected before any request is made.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, SessionError> {
        let username = validate::login_fields(username, password)
            .map_err(SessionError::Validation)?;
        let request = LoginRequest {
            username,
            password: password.to_string(),
        };

        let auth = self.api.login(&request).await.map_err(|e| match e {
            ApiError::Unauthorized
            | ApiError::Forbidden(_)
            | ApiError::Status { status: 400, .. } => SessionError::InvalidCredentials,
            other => SessionError::Api(other),
        })?;
        self.install(auth).await
    }

    /// Create an account and log in as it.
    pub async fn register(
        &self,
        username: &str,
        email: Option<&str>,
        password: &str,
    ) -> Result<Session, SessionError> {
        let username = validate::username(username)?;
        let email = validate::email(email)?;
        validate::password(password)?;
        let request = RegisterRequest {
            username,
            email,
            password: password.to_string(),
        };

        let auth = self.api.register(&request).await.map_err(|e| match e {
            ApiError::Status { status: 409, .. } => SessionError::UsernameTaken,
            ApiError::Status { status: 400, ref detail }
                if detail.to_ascii_lowercase().contains("taken")
                    || detail.to_ascii_lowercase().contains("exists") =>
            {
                SessionError::UsernameTaken
            }
            other => SessionError::Api(other),
        })?;
        self.install(auth).await
    }

    /// Validate `token` with the server and adopt it.
    ///
    /// A rejected token is cleared from storage. Transport failures leave it
    /// in place so a later attempt can succeed.
    pub async fn restore(&self, token: &str) -> Result<Session, SessionError> {
        match self.api.me(token).await {
            Ok(user) => {
                self.install(AuthResponse {
                    username: user.username,
                    color: user.color,
                    token: token.to_string(),
                })
                .await
            }
            Err(ApiError::Unauthorized) => {
                debug!("stored token rejected, clearing");
                self.storage.remove(TOKEN_KEY).await?;
                Err(SessionError::Invalid)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Restore the token saved by a previous run, if there is one.
    pub async fn restore_saved(&self) -> Result<Option<Session>, SessionError> {
        match self.storage.get(TOKEN_KEY).await? {
            Some(token) if !token.is_empty() => self.restore(&token).await.map(Some),
            _ => Ok(None),
        }
    }

    /// End the session locally and tell the server.
    ///
    /// The local session ends even if the server call or clearing the stored
    /// token fails.
    pub async fn logout(&self) -> Result<Session, SessionError> {
        let ended = self.slot().end().ok_or(SessionError::NotLoggedIn)?;
        info!(username = %ended.username, "logged out");

        if let Err(e) = self.api.logout(&ended.token).await {
            warn!(error = %e, "server logout failed, session ended locally");
        }
        if let Err(e) = self.storage.remove(TOKEN_KEY).await {
            warn!(error = %e, "failed to clear stored token");
        }
        Ok(ended)
    }

    /// End the session because the server rejected its token.
    ///
    /// No server call is made.
    pub async fn invalidate(&self) -> Option<Session> {
        let ended = self.slot().end()?;
        warn!(username = %ended.username, "session rejected by server");

        if let Err(e) = self.storage.remove(TOKEN_KEY).await {
            warn!(error = %e, "failed to clear stored token");
        }
        Some(ended)
    }

    async fn install(&self, auth: AuthResponse) -> Result<Session, SessionError> {
        self.storage.set(TOKEN_KEY, &auth.token).await?;
        let session = Session::from_auth(auth);

        let mut slot = self.slot();
        if slot.end().is_some() {
            debug!("replacing active session");
        }
        slot.session = Some(session.clone());
        drop(slot);

        info!(username = %session.username, "session started");
        Ok(session)
    }
}
