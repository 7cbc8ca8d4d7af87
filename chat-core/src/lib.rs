//! # flowchat-core
//!
//! Pure logic for FlowChat (no I/O, instant tests).
//!
//! This crate implements the state machines and data structures of the
//! message synchronization engine without any network or disk I/O.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. Time is passed in as an argument wherever it matters,
//! so tests never sleep.
//!
//! The actual I/O (HTTP requests, timers, durable storage) is performed by
//! `flowchat-client`, which interprets the actions produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod compose;
pub mod cursor;
pub mod poll;
pub mod presence;
pub mod store;
pub mod validate;

pub use compose::{
    ComposeError, ComposeState, Composer, Draft, Submission, DEFAULT_MAX_MESSAGE_LEN,
    DEFAULT_TYPING_TIMEOUT,
};
pub use cursor::SyncCursor;
pub use poll::{PollAction, PollEvent, PollPhase, PollState, DEFAULT_POLL_INTERVAL};
pub use presence::Presence;
pub use store::{MessageStore, StoreError};
pub use validate::ValidationError;
