//! # flowchat-client
//!
//! Client library for the FlowChat polling message API.
//!
//! This is the library that front ends use to talk to a FlowChat server.
//!
//! ## Features
//!
//! - **Incremental polling**: cursor-based `since` fetches, one in flight at a time
//! - **Ordered, deduplicated store**: overlapping poll windows never duplicate messages
//! - **Session lifecycle**: token persisted to durable storage and restored at startup
//! - **Stale-response protection**: responses issued before a logout are discarded
//! - **API abstraction**: pluggable `ChatApi` (HTTP, mock)
//! - **Pure state machines**: uses flowchat-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use flowchat_client::{ChatClient, ClientConfig, FileStore, HttpApi, PollDriver};
//! use std::sync::Arc;
//!
//! let api = HttpApi::new("http://localhost:8000")?;
//! let client = Arc::new(ChatClient::new(ClientConfig::default(), api, FileStore::new(dir)));
//!
//! client.login("alice", "secret1").await?;
//! let driver = PollDriver::start(client.clone(), None).await?;
//!
//! client.input("hello").await?;
//! client.submit().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod client;
pub mod driver;
pub mod session;
pub mod storage;

pub use api::{ApiError, ChatApi, HttpApi, HttpApiConfig, MockApi, RequestGate};
pub use client::{
    ChatClient, ChatEvent, ClientConfig, ClientError, EndReason, ErrorClass, TickOutcome,
    TimerChange, Transition,
};
pub use driver::PollDriver;
pub use session::{Credential, Session, SessionError, SessionManager};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError, Theme, THEME_KEY, TOKEN_KEY};
