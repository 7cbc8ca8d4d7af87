//! # flowchat-types
//!
//! Wire format types for the FlowChat message API.
//!
//! This crate provides the foundational types used across all FlowChat crates:
//! - [`MessageId`], [`Timestamp`] - Identity and ordering types
//! - [`ChatMessage`] - A message as delivered by the server
//! - Request and response bodies for the HTTP endpoints
//! - [`WireError`] - Errors for parsing user-supplied identifiers

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod messages;

pub use error::WireError;
pub use ids::{MessageId, Timestamp};
pub use messages::{
    AuthResponse, ChatMessage, CreateMessage, ErrorBody, LoginRequest, MessageList,
    RegisterRequest, UpdateMessage, UserInfo, UserList,
};
