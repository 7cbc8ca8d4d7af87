//! Error types for FlowChat wire values.

use thiserror::Error;

/// Errors raised when parsing identifiers that come from outside the server
/// (command line arguments, persisted state).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Message id was empty.
    #[error("message id must not be empty")]
    EmptyId,

    /// Message id contains characters that cannot appear in a URL path segment.
    #[error("invalid message id: {0}")]
    InvalidId(String),

    /// Timestamp is not ISO-8601-like.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
