//! Composition state machine for FlowChat.
//!
//! Tracks the user's draft, the message being edited and the local typing
//! signal. The composer never touches stored messages: `submit` hands back a
//! [`Submission`] describing the request to issue, and the client reports the
//! outcome with [`Composer::sent`] or [`Composer::send_failed`].
//!
//! Time is passed in explicitly so typing expiry can be tested without
//! sleeping.

use std::time::{Duration, Instant};

use flowchat_types::MessageId;
use thiserror::Error;

use crate::store::MessageStore;
use crate::validate::{self, ValidationError};

/// Reference typing-expiry countdown.
pub const DEFAULT_TYPING_TIMEOUT: Duration = Duration::from_millis(3000);

/// Reference maximum message length in characters.
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 500;

/// Where the composer is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeState {
    /// Nothing staged.
    Empty,
    /// Writing a new message.
    Composing,
    /// Rewriting one of the user's own messages.
    Editing(MessageId),
    /// A create or update request is outstanding.
    Sending,
}

/// The staged, not-yet-sent content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    /// Content buffer.
    pub content: String,
    /// Reference to an uploaded attachment. Byte transfer happens elsewhere.
    pub attachment: Option<String>,
    /// Message being edited, kept while `Sending` so a failure can return to it.
    pub edit_target: Option<MessageId>,
    typing_deadline: Option<Instant>,
}

impl Draft {
    /// When the typing signal lapses, if it is set.
    pub fn typing_deadline(&self) -> Option<Instant> {
        self.typing_deadline
    }
}

/// The request a successful `submit` asks the client to issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// `POST /api/messages`.
    Create {
        /// Validated, trimmed body.
        content: String,
    },
    /// `PUT /api/messages/{id}`.
    Update {
        /// Edit target.
        id: MessageId,
        /// Validated, trimmed body.
        content: String,
    },
}

impl Submission {
    /// The body being sent.
    pub fn content(&self) -> &str {
        match self {
            Submission::Create { content } | Submission::Update { content, .. } => content,
        }
    }
}

/// Rejected composer operations. None of these change state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ComposeError {
    /// A send is in progress.
    #[error("a message is already being sent")]
    Busy,

    /// Edit target is not in the store.
    #[error("message {0} not found")]
    NotFound(MessageId),

    /// Edit target belongs to someone else.
    #[error("message {0} was written by another user")]
    NotAuthor(MessageId),

    /// Draft content failed validation.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Draft, edit target and typing signal.
#[derive(Debug, Clone)]
pub struct Composer {
    state: ComposeState,
    draft: Draft,
    max_len: usize,
    typing_timeout: Duration,
}

impl Composer {
    /// Create an empty composer.
    pub fn new(max_len: usize, typing_timeout: Duration) -> Self {
        Self {
            state: ComposeState::Empty,
            draft: Draft::default(),
            max_len,
            typing_timeout,
        }
    }

    /// Current state.
    pub fn state(&self) -> &ComposeState {
        &self.state
    }

    /// Staged draft.
    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    /// Replace the buffer with `text` (the whole input field value).
    ///
    /// Moves `Empty` to `Composing`; `Editing` stays `Editing`. Restarts the
    /// typing countdown.
    pub fn input(&mut self, text: &str, now: Instant) -> Result<(), ComposeError> {
        match self.state {
            ComposeState::Sending => return Err(ComposeError::Busy),
            ComposeState::Empty | ComposeState::Composing => {
                self.state = ComposeState::Composing;
            }
            ComposeState::Editing(_) => {}
        }
        self.draft.content = text.to_string();
        self.draft.typing_deadline = Some(now + self.typing_timeout);
        Ok(())
    }

    /// Stage an attachment reference alongside the draft.
    pub fn attach(&mut self, reference: impl Into<String>) -> Result<(), ComposeError> {
        match self.state {
            ComposeState::Sending => return Err(ComposeError::Busy),
            ComposeState::Empty => self.state = ComposeState::Composing,
            _ => {}
        }
        self.draft.attachment = Some(reference.into());
        Ok(())
    }

    /// Remove the staged attachment.
    pub fn detach(&mut self) -> Option<String> {
        self.draft.attachment.take()
    }

    /// Whether the typing signal is on at `now`.
    pub fn is_typing(&self, now: Instant) -> bool {
        self.draft.typing_deadline.is_some_and(|deadline| now < deadline)
    }

    /// Clear the typing signal if its countdown has run out.
    ///
    /// Returns `true` if the signal was cleared by this call.
    pub fn expire_typing(&mut self, now: Instant) -> bool {
        match self.draft.typing_deadline {
            Some(deadline) if now >= deadline => {
                self.draft.typing_deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Load one of `identity`'s messages for editing.
    ///
    /// Rejected without any state change if a send is in progress, the
    /// message is unknown, or someone else wrote it.
    pub fn start_edit(
        &mut self,
        store: &MessageStore,
        id: &MessageId,
        identity: &str,
    ) -> Result<(), ComposeError> {
        if self.state == ComposeState::Sending {
            return Err(ComposeError::Busy);
        }
        let msg = store
            .get(id)
            .ok_or_else(|| ComposeError::NotFound(id.clone()))?;
        if !msg.is_authored_by(identity) {
            return Err(ComposeError::NotAuthor(id.clone()));
        }

        self.draft.content = msg.content.clone();
        self.draft.attachment = None;
        self.draft.edit_target = Some(id.clone());
        self.state = ComposeState::Editing(id.clone());
        Ok(())
    }

    /// Validate the draft and move to `Sending`.
    ///
    /// On error nothing changes and no request should be made.
    pub fn submit(&mut self) -> Result<Submission, ComposeError> {
        let submission = match &self.state {
            ComposeState::Sending => return Err(ComposeError::Busy),
            ComposeState::Empty => return Err(ValidationError::EmptyContent.into()),
            ComposeState::Composing => Submission::Create {
                content: validate::content(&self.draft.content, self.max_len)?,
            },
            ComposeState::Editing(id) => Submission::Update {
                id: id.clone(),
                content: validate::content(&self.draft.content, self.max_len)?,
            },
        };
        self.state = ComposeState::Sending;
        self.draft.typing_deadline = None;
        Ok(submission)
    }

    /// The outstanding request succeeded. Clears the draft.
    pub fn sent(&mut self) {
        if self.state == ComposeState::Sending {
            self.reset();
        }
    }

    /// The outstanding request failed. Returns to the previous state with the
    /// content preserved.
    pub fn send_failed(&mut self) {
        if self.state != ComposeState::Sending {
            return;
        }
        self.state = match &self.draft.edit_target {
            Some(id) => ComposeState::Editing(id.clone()),
            None => ComposeState::Composing,
        };
    }

    /// Discard the draft from `Composing` or `Editing`.
    ///
    /// Returns `false` (and does nothing) while `Sending`.
    pub fn cancel(&mut self) -> bool {
        if self.state == ComposeState::Sending {
            return false;
        }
        self.reset();
        true
    }

    /// Return to `Empty` unconditionally (session ended).
    pub fn reset(&mut self) {
        self.state = ComposeState::Empty;
        self.draft = Draft::default();
    }
}

impl Default for Composer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_LEN, DEFAULT_TYPING_TIMEOUT)
    }
}
