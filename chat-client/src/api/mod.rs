//! API abstraction for FlowChat.
//!
//! This module provides a pluggable request/response layer that abstracts
//! the server (HTTP over reqwest, in-process mock for testing).
//!
//! # Design
//!
//! Every authenticated call takes the bearer token explicitly. The API layer
//! holds no session state; the [`SessionManager`](crate::SessionManager)
//! decides which token a request carries.
//!
//! # Example
//!
//! ```ignore
//! let api = MockApi::new();
//! api.add_account("alice", "secret1");
//! let auth = api.login(&LoginRequest { username: "alice".into(), password: "secret1".into() }).await?;
//! let messages = api.fetch_messages(&auth.token, None).await?;
//! ```

mod http;
mod mock;

pub use http::{HttpApi, HttpApiConfig};
pub use mock::{MockApi, RequestGate};

use async_trait::async_trait;
use flowchat_types::{
    AuthResponse, ChatMessage, LoginRequest, MessageId, RegisterRequest, Timestamp, UserInfo,
};
use thiserror::Error;

/// API errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// HTTP 401: missing, expired or revoked credential.
    #[error("unauthorized")]
    Unauthorized,

    /// HTTP 403.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// HTTP 404.
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other non-2xx status.
    #[error("server returned {status}: {detail}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// The `detail` field of the error body, if any.
        detail: String,
    },

    /// Transport failure before a response arrived.
    #[error("connection failed: {0}")]
    Network(String),

    /// Request timed out.
    #[error("request timeout")]
    Timeout,

    /// Response body did not match the expected shape.
    #[error("invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Network(_) | ApiError::Timeout)
    }
}

/// The server operations the client consumes.
///
/// Implementations handle the wire (HTTP, mock, etc).
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// `POST /api/register`.
    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ApiError>;

    /// `POST /api/login`.
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, ApiError>;

    /// `GET /api/me`: validate a token and return its identity.
    async fn me(&self, token: &str) -> Result<UserInfo, ApiError>;

    /// `POST /api/logout`.
    async fn logout(&self, token: &str) -> Result<(), ApiError>;

    /// `GET /api/messages[?since=ts]`.
    ///
    /// Without `since` the full history is returned; with it, only messages
    /// newer than `since`.
    async fn fetch_messages(
        &self,
        token: &str,
        since: Option<&Timestamp>,
    ) -> Result<Vec<ChatMessage>, ApiError>;

    /// `POST /api/messages`.
    async fn create_message(&self, token: &str, content: &str) -> Result<ChatMessage, ApiError>;

    /// `PUT /api/messages/{id}`.
    async fn update_message(
        &self,
        token: &str,
        id: &MessageId,
        content: &str,
    ) -> Result<ChatMessage, ApiError>;

    /// `DELETE /api/messages/{id}`.
    async fn delete_message(&self, token: &str, id: &MessageId) -> Result<(), ApiError>;

    /// `GET /api/users`.
    async fn list_users(&self, token: &str) -> Result<Vec<UserInfo>, ApiError>;
}
