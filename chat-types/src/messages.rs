//! Request and response bodies for the FlowChat HTTP API.
//!
//! Field names match the JSON the server speaks.

use serde::{Deserialize, Serialize};

use crate::{MessageId, Timestamp};

/// A chat message as stored by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Server-assigned unique id
    pub id: MessageId,
    /// Author identity
    pub username: String,
    /// Author display color (CSS color string)
    pub color: String,
    /// Message body, plain or lightly marked-up text
    pub content: String,
    /// Server clock creation time
    pub timestamp: Timestamp,
    /// Whether the content was changed after creation
    #[serde(default)]
    pub edited: bool,
}

impl ChatMessage {
    /// Key the store orders by: timestamp ascending, then id ascending.
    pub fn sort_key(&self) -> (&Timestamp, &MessageId) {
        (&self.timestamp, &self.id)
    }

    /// Whether `identity` wrote this message.
    pub fn is_authored_by(&self, identity: &str) -> bool {
        self.username == identity
    }
}

/// Body of `GET /api/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MessageList {
    /// Messages in server order
    pub messages: Vec<ChatMessage>,
}

/// A user entry in the presence list and in `GET /api/me`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserInfo {
    /// Identity name
    pub username: String,
    /// Display color
    pub color: String,
}

/// Body of `GET /api/users`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserList {
    /// Currently known identities
    pub users: Vec<UserInfo>,
}

/// Body of `POST /api/register`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Requested identity name
    pub username: String,
    /// Optional contact address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Plaintext password (sent over TLS)
    pub password: String,
}

impl std::fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Body of `POST /api/login`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Identity name
    pub username: String,
    /// Plaintext password (sent over TLS)
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Successful response of login and register.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    /// Canonical identity name
    pub username: String,
    /// Assigned display color
    pub color: String,
    /// Opaque bearer token
    pub token: String,
}

impl std::fmt::Debug for AuthResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthResponse")
            .field("username", &self.username)
            .field("color", &self.color)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Body of `POST /api/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMessage {
    /// Message body
    pub content: String,
}

/// Body of `PUT /api/messages/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMessage {
    /// Replacement body
    pub content: String,
}

/// Error body returned with 4xx responses.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable reason
    #[serde(default)]
    pub detail: String,
}
