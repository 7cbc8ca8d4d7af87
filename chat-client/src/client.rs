//! ChatClient - the main interface for FlowChat.
//!
//! This module provides [`ChatClient`], the single context object that owns
//! the session, the poller, the message store, the composer and the presence
//! snapshot for one signed-in user.
//!
//! # Architecture
//!
//! ChatClient uses pure state machines (from flowchat-core) for the sync and
//! composition rules and interprets their actions to perform actual I/O via
//! the [`ChatApi`] trait.
//!
//! ```text
//! Front end → ChatClient → ChatApi → Network
//!                 ↓
//!          flowchat-core (pure state machines)
//! ```
//!
//! All mutable sync state sits behind one `tokio::sync::Mutex` that is never
//! held across a request. Every request captures the session generation when
//! it is issued; a response that arrives after the session changed is
//! dropped.
//!
//! # Example
//!
//! ```ignore
//! use flowchat_client::{ChatClient, ClientConfig, MemoryStore, MockApi};
//!
//! let client = ChatClient::new(ClientConfig::default(), MockApi::new(), MemoryStore::new());
//! client.login("alice", "secret1").await?;
//! client.start(None).await?;
//!
//! client.input("hello").await?;
//! client.submit().await?;
//! client.tick().await;
//! ```

use std::time::Duration;

use flowchat_core::{
    ComposeError, ComposeState, Composer, Draft, MessageStore, PollAction, PollEvent, PollPhase,
    PollState, Presence, Submission, SyncCursor, DEFAULT_MAX_MESSAGE_LEN, DEFAULT_POLL_INTERVAL,
    DEFAULT_TYPING_TIMEOUT,
};
use flowchat_types::{ChatMessage, MessageId, Timestamp, UserInfo};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use crate::api::{ApiError, ChatApi};
use crate::session::{Credential, Session, SessionError, SessionManager};
use crate::storage::KeyValueStore;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// API error.
    #[error("api error: {0}")]
    Api(#[from] ApiError),

    /// Session error.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Composer rejected the operation.
    #[error(transparent)]
    Compose(#[from] ComposeError),

    /// No session is active.
    #[error("not logged in")]
    NotLoggedIn,

    /// The session ended while the request was outstanding.
    #[error("session ended before the response arrived")]
    SessionEnded,
}

/// How a front end should react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Credential invalid or expired. The session is torn down.
    Auth,
    /// Bad input. No request was made.
    Validation,
    /// Transient transport failure. Input is preserved; retrying may work.
    Network,
    /// The server refused the request.
    Server,
    /// Edit or delete target missing or not owned by the caller.
    Conflict,
}

fn api_class(e: &ApiError) -> ErrorClass {
    match e {
        ApiError::Unauthorized => ErrorClass::Auth,
        ApiError::Forbidden(_) | ApiError::NotFound(_) => ErrorClass::Conflict,
        ApiError::Network(_) | ApiError::Timeout => ErrorClass::Network,
        ApiError::Status { .. } | ApiError::Decode(_) => ErrorClass::Server,
    }
}

impl ClientError {
    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            ClientError::Api(e) => api_class(e),
            ClientError::Session(e) => match e {
                SessionError::InvalidCredentials
                | SessionError::Invalid
                | SessionError::NotLoggedIn => ErrorClass::Auth,
                SessionError::WeakPassword { .. } | SessionError::Validation(_) => {
                    ErrorClass::Validation
                }
                SessionError::UsernameTaken | SessionError::Storage(_) => ErrorClass::Server,
                SessionError::Api(e) => api_class(e),
            },
            ClientError::Compose(e) => match e {
                ComposeError::Busy | ComposeError::Invalid(_) => ErrorClass::Validation,
                ComposeError::NotFound(_) | ComposeError::NotAuthor(_) => ErrorClass::Conflict,
            },
            ClientError::NotLoggedIn | ClientError::SessionEnded => ErrorClass::Auth,
        }
    }
}

/// Configuration for ChatClient.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Time between poll ticks.
    pub poll_interval: Duration,
    /// How long the typing signal stays on after the last input.
    pub typing_timeout: Duration,
    /// Maximum message length in characters.
    pub max_message_len: usize,
    /// Events buffered per subscriber before the oldest are dropped.
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            typing_timeout: DEFAULT_TYPING_TIMEOUT,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            event_capacity: 256,
        }
    }
}

impl ClientConfig {
    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the typing-expiry timeout.
    pub fn with_typing_timeout(mut self, timeout: Duration) -> Self {
        self.typing_timeout = timeout;
        self
    }

    /// Set the maximum message length.
    pub fn with_max_message_len(mut self, max: usize) -> Self {
        self.max_message_len = max;
        self
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The user logged out.
    Logout,
    /// The server rejected the token.
    Invalidated,
}

/// Notifications for front ends, sent after each state change is complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A session was established.
    SessionStarted {
        /// Identity name.
        username: String,
    },
    /// The session ended and all per-session state was cleared.
    SessionEnded {
        /// Cause.
        reason: EndReason,
    },
    /// A poll inserted new messages.
    MessagesMerged {
        /// Inserted ids, in store order.
        ids: Vec<MessageId>,
    },
    /// A confirmed edit was applied.
    MessageEdited {
        /// Edited message.
        id: MessageId,
    },
    /// A confirmed delete was applied.
    MessageDeleted {
        /// Deleted message.
        id: MessageId,
    },
    /// The presence snapshot changed.
    PresenceChanged {
        /// Users online.
        online: usize,
    },
    /// The local typing signal turned on or off.
    TypingChanged {
        /// Whether the user is typing.
        active: bool,
    },
    /// The composer moved to a new state.
    ComposeChanged {
        /// New state.
        state: ComposeState,
    },
}

/// Result of one poll fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No fetch was issued (another in flight, poller not active, or no session).
    Skipped,
    /// The batch was merged.
    Merged {
        /// Messages that were new.
        inserted: usize,
    },
    /// The response belonged to an ended session and was dropped.
    Discarded,
    /// Transient failure; cursor unchanged, retried next tick.
    Failed,
    /// The server rejected the token; polling stopped and the session ended.
    SessionInvalid,
}

/// What the timer owner should do after a poller transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerChange {
    /// (Re)arm with this period; first tick one period from now.
    Arm(Duration),
    /// Cancel the timer.
    Cancel,
    /// Leave the timer as it is.
    Keep,
}

impl TimerChange {
    fn from_actions(actions: &[PollAction]) -> Self {
        actions
            .iter()
            .rev()
            .find_map(|action| match action {
                PollAction::ArmTimer { interval } => Some(TimerChange::Arm(*interval)),
                PollAction::CancelTimer => Some(TimerChange::Cancel),
                _ => None,
            })
            .unwrap_or(TimerChange::Keep)
    }
}

/// Outcome of `start` and `resume`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Timer instruction.
    pub timer: TimerChange,
    /// Result of the immediate fetch, if one was issued.
    pub fetch: Option<TickOutcome>,
}

/// Per-session sync state. Everything here is cleared when a session ends.
#[derive(Debug)]
struct SyncState {
    poll: PollState,
    cursor: SyncCursor,
    store: MessageStore,
    composer: Composer,
    presence: Presence,
}

impl SyncState {
    fn new(config: &ClientConfig) -> Self {
        Self {
            poll: PollState::new(config.poll_interval),
            cursor: SyncCursor::new(),
            store: MessageStore::new(),
            composer: Composer::new(config.max_message_len, config.typing_timeout),
            presence: Presence::new(),
        }
    }

    fn poll_event(&mut self, event: PollEvent) -> Vec<PollAction> {
        let (next, actions) = self.poll.clone().on_event(event);
        self.poll = next;
        actions
    }

    /// Stop polling and forget everything belonging to the session.
    fn teardown(&mut self) -> Vec<PollAction> {
        let actions = self.poll_event(PollEvent::Stop);
        self.cursor.reset();
        self.store.clear();
        self.composer.reset();
        self.presence.clear();
        actions
    }
}

fn now() -> std::time::Instant {
    tokio::time::Instant::now().into_std()
}

/// The main chat client.
///
/// Manages the session, polling, the message store and composition.
pub struct ChatClient<A, S> {
    config: ClientConfig,
    session: SessionManager<A, S>,
    sync: Mutex<SyncState>,
    events: broadcast::Sender<ChatEvent>,
}

impl<A: ChatApi, S: KeyValueStore> ChatClient<A, S> {
    /// Create a new ChatClient with no session.
    pub fn new(config: ClientConfig, api: A, storage: S) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            sync: Mutex::new(SyncState::new(&config)),
            session: SessionManager::new(api, storage),
            config,
            events,
        }
    }

    /// Receive [`ChatEvent`]s from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ChatEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get the API (for testing).
    pub fn api(&self) -> &A {
        self.session.api()
    }

    /// Get the durable storage (theme preference lives here too).
    pub fn storage(&self) -> &S {
        self.session.storage()
    }

    /// Active session, if any.
    pub fn current_session(&self) -> Option<Session> {
        self.session.current()
    }

    /// Changes every time a session ends or is replaced.
    pub fn session_generation(&self) -> u64 {
        self.session.generation()
    }

    // ===========================================
    // Session lifecycle
    // ===========================================

    /// Log in. Any previous session's state is discarded.
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, ClientError> {
        let session = self.session.login(username, password).await?;
        self.begin(&session).await;
        Ok(session)
    }

    /// Create an account and log in.
    pub async fn register(
        &self,
        username: &str,
        email: Option<&str>,
        password: &str,
    ) -> Result<Session, ClientError> {
        let session = self.session.register(username, email, password).await?;
        self.begin(&session).await;
        Ok(session)
    }

    /// Restore the session saved by a previous run, if any.
    pub async fn restore(&self) -> Result<Option<Session>, ClientError> {
        let restored = self.session.restore_saved().await?;
        if let Some(session) = &restored {
            self.begin(session).await;
        }
        Ok(restored)
    }

    async fn begin(&self, session: &Session) {
        let actions = self.sync.lock().await.teardown();
        debug!(?actions, "cleared state for new session");
        self.emit(ChatEvent::SessionStarted {
            username: session.username.clone(),
        });
    }

    /// Log out. Polling stops and all session state is cleared; responses to
    /// requests still in flight are discarded when they arrive.
    pub async fn logout(&self) -> Result<TimerChange, ClientError> {
        let ended = self.session.logout().await?;
        let actions = self.sync.lock().await.teardown();
        info!(username = %ended.username, "session state cleared");
        self.emit(ChatEvent::SessionEnded {
            reason: EndReason::Logout,
        });
        Ok(TimerChange::from_actions(&actions))
    }

    /// Tear down after the server rejected the token.
    async fn session_invalid(&self) {
        if self.session.invalidate().await.is_none() {
            return;
        }
        self.sync.lock().await.teardown();
        self.emit(ChatEvent::SessionEnded {
            reason: EndReason::Invalidated,
        });
    }

    // ===========================================
    // Polling
    // ===========================================

    /// Begin polling from `initial` (or from the beginning if `None`).
    ///
    /// Performs one fetch and one presence refresh immediately; the returned
    /// timer change arms the periodic ticks.
    pub async fn start(&self, initial: Option<Timestamp>) -> Result<Transition, ClientError> {
        let credential = self.session.credential().ok_or(ClientError::NotLoggedIn)?;
        let (actions, since) = {
            let mut sync = self.sync.lock().await;
            if let Some(ts) = &initial {
                sync.cursor.observe(ts);
            }
            let actions = sync.poll_event(PollEvent::Start);
            (actions, sync.cursor.current().cloned())
        };
        info!(since = ?since, "polling started");
        Ok(self.run_transition(credential, actions, since).await)
    }

    /// Page became visible: fetch and refresh presence now, then re-arm the
    /// timer.
    pub async fn resume(&self) -> Result<Transition, ClientError> {
        let credential = self.session.credential().ok_or(ClientError::NotLoggedIn)?;
        let (actions, since) = {
            let mut sync = self.sync.lock().await;
            let actions = sync.poll_event(PollEvent::Resume);
            (actions, sync.cursor.current().cloned())
        };
        Ok(self.run_transition(credential, actions, since).await)
    }

    async fn run_transition(
        &self,
        credential: Credential,
        actions: Vec<PollAction>,
        since: Option<Timestamp>,
    ) -> Transition {
        let mut timer = TimerChange::from_actions(&actions);
        let fetch = if actions.contains(&PollAction::Fetch) {
            let outcome = self.fetch(credential, since).await;
            if outcome == TickOutcome::SessionInvalid {
                timer = TimerChange::Cancel;
            } else {
                self.refresh_presence().await;
            }
            Some(outcome)
        } else {
            None
        };
        Transition { timer, fetch }
    }

    /// Page became hidden: the timer should be cancelled.
    pub async fn suspend(&self) -> TimerChange {
        let actions = self.sync.lock().await.poll_event(PollEvent::Suspend);
        TimerChange::from_actions(&actions)
    }

    /// Stop polling. Terminal until the next `start`.
    pub async fn stop(&self) -> TimerChange {
        let actions = self.sync.lock().await.poll_event(PollEvent::Stop);
        TimerChange::from_actions(&actions)
    }

    /// Poller phase.
    pub async fn poll_phase(&self) -> PollPhase {
        self.sync.lock().await.poll.phase()
    }

    /// Timer fired. Fetches since the cursor unless a fetch is already in
    /// flight.
    pub async fn tick(&self) -> TickOutcome {
        let Some(credential) = self.session.credential() else {
            return TickOutcome::Skipped;
        };
        let since = {
            let mut sync = self.sync.lock().await;
            let actions = sync.poll_event(PollEvent::Tick);
            if !actions.contains(&PollAction::Fetch) {
                debug!(in_flight = sync.poll.is_in_flight(), "poll tick skipped");
                return TickOutcome::Skipped;
            }
            sync.cursor.current().cloned()
        };
        self.fetch(credential, since).await
    }

    async fn fetch(&self, credential: Credential, since: Option<Timestamp>) -> TickOutcome {
        let result = self
            .session
            .api()
            .fetch_messages(&credential.token, since.as_ref())
            .await;

        let mut sync = self.sync.lock().await;
        if !self.session.is_current(credential.generation) {
            sync.poll_event(PollEvent::FetchCompleted);
            debug!("discarding poll response from ended session");
            return TickOutcome::Discarded;
        }

        match result {
            Ok(batch) => {
                sync.poll_event(PollEvent::FetchCompleted);
                let inserted = sync.store.merge(&batch);
                sync.cursor.advance(&batch);
                drop(sync);

                let count = inserted.len();
                if count > 0 {
                    debug!(count, "merged new messages");
                    self.emit(ChatEvent::MessagesMerged { ids: inserted });
                }
                TickOutcome::Merged { inserted: count }
            }
            Err(ApiError::Unauthorized) => {
                let actions = sync.poll_event(PollEvent::Unauthorized);
                drop(sync);
                if actions.contains(&PollAction::EmitSessionInvalid) {
                    self.session_invalid().await;
                    TickOutcome::SessionInvalid
                } else {
                    TickOutcome::Failed
                }
            }
            Err(e) => {
                sync.poll_event(PollEvent::FetchCompleted);
                debug!(error = %e, "poll failed, retrying next tick");
                TickOutcome::Failed
            }
        }
    }

    /// Replace the presence snapshot. Returns `true` if it changed.
    ///
    /// Failures other than a rejected token are ignored until the next
    /// refresh.
    pub async fn refresh_presence(&self) -> bool {
        let Some(credential) = self.session.credential() else {
            return false;
        };
        let result = self.session.api().list_users(&credential.token).await;

        let mut sync = self.sync.lock().await;
        if !self.session.is_current(credential.generation) {
            return false;
        }
        match result {
            Ok(users) => {
                if !sync.presence.replace(users) {
                    return false;
                }
                let online = sync.presence.count();
                drop(sync);
                self.emit(ChatEvent::PresenceChanged { online });
                true
            }
            Err(ApiError::Unauthorized) => {
                drop(sync);
                self.session_invalid().await;
                false
            }
            Err(e) => {
                debug!(error = %e, "presence refresh failed");
                false
            }
        }
    }

    // ===========================================
    // Composition
    // ===========================================

    /// Replace the draft buffer with `text`.
    pub async fn input(&self, text: &str) -> Result<(), ClientError> {
        let now = now();
        let mut sync = self.sync.lock().await;
        let was_typing = sync.composer.is_typing(now);
        let before = sync.composer.state().clone();
        sync.composer.input(text, now)?;
        let after = sync.composer.state().clone();
        drop(sync);

        if !was_typing {
            self.emit(ChatEvent::TypingChanged { active: true });
        }
        if before != after {
            self.emit(ChatEvent::ComposeChanged { state: after });
        }
        Ok(())
    }

    /// Clear the typing signal if it has lapsed. Returns `true` if it was
    /// cleared by this call.
    pub async fn expire_typing(&self) -> bool {
        let expired = self.sync.lock().await.composer.expire_typing(now());
        if expired {
            self.emit(ChatEvent::TypingChanged { active: false });
        }
        expired
    }

    /// Whether the local typing signal is on.
    pub async fn is_typing(&self) -> bool {
        self.sync.lock().await.composer.is_typing(now())
    }

    /// Stage an attachment reference with the draft.
    pub async fn attach(&self, reference: &str) -> Result<(), ClientError> {
        self.sync.lock().await.composer.attach(reference)?;
        Ok(())
    }

    /// Load one of the current user's messages into the draft for editing.
    pub async fn start_edit(&self, id: &MessageId) -> Result<(), ClientError> {
        let session = self.session.current().ok_or(ClientError::NotLoggedIn)?;
        let mut guard = self.sync.lock().await;
        let sync = &mut *guard;
        sync.composer.start_edit(&sync.store, id, &session.username)?;
        let state = sync.composer.state().clone();
        drop(guard);

        self.emit(ChatEvent::ComposeChanged { state });
        Ok(())
    }

    /// Discard the draft. Returns `false` while a send is outstanding.
    pub async fn cancel(&self) -> bool {
        let cancelled = self.sync.lock().await.composer.cancel();
        if cancelled {
            self.emit(ChatEvent::ComposeChanged {
                state: ComposeState::Empty,
            });
        }
        cancelled
    }

    /// Send the draft as a new message, or as an edit when editing.
    ///
    /// A new message is not inserted locally; it appears with the next poll.
    /// A confirmed edit is applied to the store immediately. On failure the
    /// draft is kept for a retry.
    pub async fn submit(&self) -> Result<ChatMessage, ClientError> {
        let credential = self.session.credential().ok_or(ClientError::NotLoggedIn)?;
        let submission = {
            let mut sync = self.sync.lock().await;
            sync.composer.submit()?
        };
        self.emit(ChatEvent::ComposeChanged {
            state: ComposeState::Sending,
        });

        let api = self.session.api();
        let result = match &submission {
            Submission::Create { content } => api.create_message(&credential.token, content).await,
            Submission::Update { id, content } => {
                api.update_message(&credential.token, id, content).await
            }
        };

        let mut sync = self.sync.lock().await;
        if !self.session.is_current(credential.generation) {
            return Err(ClientError::SessionEnded);
        }

        match result {
            Ok(confirmed) => {
                sync.composer.sent();
                let edited = match &submission {
                    Submission::Update { id, .. } => {
                        match sync.store.edit(id, &confirmed.content, &credential.username) {
                            Ok(_) => Some(id.clone()),
                            Err(e) => {
                                debug!(error = %e, "confirmed edit not applied locally");
                                None
                            }
                        }
                    }
                    Submission::Create { .. } => None,
                };
                drop(sync);

                if let Some(id) = edited {
                    self.emit(ChatEvent::MessageEdited { id });
                }
                self.emit(ChatEvent::ComposeChanged {
                    state: ComposeState::Empty,
                });
                Ok(confirmed)
            }
            Err(ApiError::Unauthorized) => {
                drop(sync);
                self.session_invalid().await;
                Err(ApiError::Unauthorized.into())
            }
            Err(e) => {
                sync.composer.send_failed();
                let state = sync.composer.state().clone();
                drop(sync);

                debug!(error = %e, "send failed, draft kept");
                self.emit(ChatEvent::ComposeChanged { state });
                Err(e.into())
            }
        }
    }

    /// Delete one of the current user's messages.
    ///
    /// The local copy is removed once the server confirms.
    pub async fn delete(&self, id: &MessageId) -> Result<(), ClientError> {
        let credential = self.session.credential().ok_or(ClientError::NotLoggedIn)?;
        let result = self
            .session
            .api()
            .delete_message(&credential.token, id)
            .await;

        let mut sync = self.sync.lock().await;
        if !self.session.is_current(credential.generation) {
            return Err(ClientError::SessionEnded);
        }
        match result {
            Ok(()) => {
                let removed = sync.store.delete(id).is_some();
                drop(sync);
                if removed {
                    self.emit(ChatEvent::MessageDeleted { id: id.clone() });
                }
                Ok(())
            }
            Err(ApiError::Unauthorized) => {
                drop(sync);
                self.session_invalid().await;
                Err(ApiError::Unauthorized.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    // ===========================================
    // Snapshots
    // ===========================================

    /// All messages in store order.
    pub async fn messages(&self) -> Vec<ChatMessage> {
        self.sync.lock().await.store.iter().cloned().collect()
    }

    /// Messages whose content or author contains `needle`, case-insensitively.
    pub async fn query(&self, needle: &str) -> Vec<ChatMessage> {
        self.sync
            .lock()
            .await
            .store
            .query(needle)
            .into_iter()
            .cloned()
            .collect()
    }

    /// High-water mark of merged timestamps.
    pub async fn cursor(&self) -> Option<Timestamp> {
        self.sync.lock().await.cursor.current().cloned()
    }

    /// Last presence snapshot.
    pub async fn online_users(&self) -> Vec<UserInfo> {
        self.sync.lock().await.presence.users().to_vec()
    }

    /// Composer state.
    pub async fn compose_state(&self) -> ComposeState {
        self.sync.lock().await.composer.state().clone()
    }

    /// Staged draft.
    pub async fn draft(&self) -> Draft {
        self.sync.lock().await.composer.draft().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockApi;
    use crate::storage::testing::StickyStore;
    use crate::storage::{MemoryStore, TOKEN_KEY};

    type TestClient = ChatClient<MockApi, MemoryStore>;

    fn client() -> (TestClient, MockApi, MemoryStore) {
        let api = MockApi::new();
        let storage = MemoryStore::new();
        let client = ChatClient::new(ClientConfig::default(), api.clone(), storage.clone());
        (client, api, storage)
    }

    async fn logged_in() -> (TestClient, MockApi, MemoryStore) {
        let (client, api, storage) = client();
        api.add_account("alice", "secret1");
        client.login("alice", "secret1").await.unwrap();
        (client, api, storage)
    }

    async fn polling() -> (TestClient, MockApi, MemoryStore) {
        let (client, api, storage) = logged_in().await;
        client.start(None).await.unwrap();
        (client, api, storage)
    }

    // ===========================================
    // Configuration
    // ===========================================

    #[test]
    fn config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(2000));
        assert_eq!(config.typing_timeout, Duration::from_millis(3000));
        assert_eq!(config.max_message_len, 500);
    }

    #[test]
    fn config_builder_pattern() {
        let config = ClientConfig::default()
            .with_poll_interval(Duration::from_millis(500))
            .with_typing_timeout(Duration::from_secs(1))
            .with_max_message_len(140);
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.typing_timeout, Duration::from_secs(1));
        assert_eq!(config.max_message_len, 140);
    }

    // ===========================================
    // Login and initial load
    // ===========================================

    #[tokio::test]
    async fn login_with_empty_history() {
        let (client, api, storage) = logged_in().await;
        let mut events = client.subscribe();

        let transition = client.start(None).await.unwrap();

        assert_eq!(
            transition,
            Transition {
                timer: TimerChange::Arm(Duration::from_millis(2000)),
                fetch: Some(TickOutcome::Merged { inserted: 0 }),
            }
        );
        assert!(storage.get(TOKEN_KEY).await.unwrap().is_some());
        assert!(api.requests().contains(&"GET /api/messages".to_string()));
        assert!(client.messages().await.is_empty());
        assert_eq!(client.cursor().await, None);
        assert_eq!(client.poll_phase().await, PollPhase::Active);
        assert_eq!(
            events.try_recv().unwrap(),
            ChatEvent::PresenceChanged { online: 1 },
            "presence loaded with the history"
        );
        assert!(events.try_recv().is_err(), "empty batch emits no merge");
    }

    #[tokio::test]
    async fn start_requires_session() {
        let (client, api, _) = client();
        assert!(matches!(
            client.start(None).await,
            Err(ClientError::NotLoggedIn)
        ));
        assert_eq!(api.fetch_count(), 0);
    }

    #[tokio::test]
    async fn start_from_initial_cursor_fetches_since() {
        let (client, api, _) = logged_in().await;
        let old = api.post_as("bob", "old");
        let new = api.post_as("bob", "new");

        client.start(Some(old.timestamp.clone())).await.unwrap();

        assert_eq!(client.messages().await, vec![new.clone()]);
        assert_eq!(client.cursor().await, Some(new.timestamp));
        assert!(api
            .requests()
            .contains(&format!("GET /api/messages?since={}", old.timestamp)));
    }

    #[tokio::test]
    async fn restore_resumes_saved_session() {
        let (first, api, storage) = logged_in().await;
        let username = first.current_session().unwrap().username;

        let client = ChatClient::new(ClientConfig::default(), api.clone(), storage.clone());
        let restored = client.restore().await.unwrap().unwrap();
        assert_eq!(restored.username, username);
        assert!(client.start(None).await.is_ok());
    }

    // ===========================================
    // Sending and polling
    // ===========================================

    #[tokio::test]
    async fn send_then_poll() {
        let (client, _, _) = polling().await;

        client.input("hello").await.unwrap();
        let sent = client.submit().await.unwrap();
        assert_eq!(sent.content, "hello");
        assert_eq!(client.compose_state().await, ComposeState::Empty);
        assert!(
            client.messages().await.is_empty(),
            "created message waits for the next merge"
        );

        assert_eq!(client.tick().await, TickOutcome::Merged { inserted: 1 });
        assert_eq!(client.messages().await, vec![sent.clone()]);
        assert_eq!(client.cursor().await, Some(sent.timestamp));
    }

    #[tokio::test]
    async fn duplicate_batches_are_idempotent() {
        let (client, api, _) = polling().await;
        let m2 = api.post_as("bob", "overlap");
        api.script_fetch(vec![m2.clone()]);
        api.script_fetch(vec![m2.clone()]);

        assert_eq!(client.tick().await, TickOutcome::Merged { inserted: 1 });
        assert_eq!(client.tick().await, TickOutcome::Merged { inserted: 0 });
        assert_eq!(client.messages().await, vec![m2]);
    }

    #[tokio::test]
    async fn overlapping_tick_is_skipped() {
        let (client, api, _) = polling().await;
        let m = api.post_as("bob", "hi");
        let gate = api.hold_fetches();

        let (first, second) = tokio::join!(client.tick(), async {
            let outcome = client.tick().await;
            gate.release();
            outcome
        });

        assert_eq!(first, TickOutcome::Merged { inserted: 1 });
        assert_eq!(second, TickOutcome::Skipped);
        assert_eq!(api.fetch_count(), 2, "initial fetch plus one tick");
        assert_eq!(client.messages().await, vec![m]);
    }

    #[tokio::test]
    async fn transient_failure_keeps_cursor() {
        let (client, api, _) = polling().await;
        let m = api.post_as("bob", "one");
        client.tick().await;
        let cursor = client.cursor().await;
        assert_eq!(cursor, Some(m.timestamp.clone()));

        api.post_as("bob", "two");
        api.fail_next_fetch(ApiError::Network("reset".into()));
        assert_eq!(client.tick().await, TickOutcome::Failed);
        assert_eq!(client.cursor().await, cursor);

        assert_eq!(client.tick().await, TickOutcome::Merged { inserted: 1 });
        assert_eq!(client.messages().await.len(), 2);
    }

    #[tokio::test]
    async fn merge_emits_event() {
        let (client, api, _) = polling().await;
        let mut events = client.subscribe();
        let m = api.post_as("bob", "hi");

        client.tick().await;
        assert_eq!(
            events.recv().await.unwrap(),
            ChatEvent::MessagesMerged { ids: vec![m.id] }
        );
    }

    #[tokio::test]
    async fn tick_before_start_is_skipped() {
        let (client, api, _) = logged_in().await;
        assert_eq!(client.tick().await, TickOutcome::Skipped);
        assert_eq!(api.fetch_count(), 0);
    }

    // ===========================================
    // Visibility
    // ===========================================

    #[tokio::test]
    async fn hide_then_show_fetches_exactly_once() {
        let (client, api, _) = polling().await;
        assert_eq!(api.fetch_count(), 1);

        assert_eq!(client.suspend().await, TimerChange::Cancel);
        assert_eq!(client.suspend().await, TimerChange::Keep);
        assert_eq!(client.tick().await, TickOutcome::Skipped);
        assert_eq!(api.fetch_count(), 1);

        let transition = client.resume().await.unwrap();
        assert_eq!(transition.timer, TimerChange::Arm(Duration::from_millis(2000)));
        assert_eq!(transition.fetch, Some(TickOutcome::Merged { inserted: 0 }));
        assert_eq!(api.fetch_count(), 2);
    }

    #[tokio::test]
    async fn stop_is_terminal_until_start() {
        let (client, api, _) = polling().await;
        assert_eq!(client.stop().await, TimerChange::Cancel);
        assert_eq!(client.tick().await, TickOutcome::Skipped);
        assert_eq!(client.resume().await.unwrap().fetch, None);
        assert_eq!(api.fetch_count(), 1);

        client.start(None).await.unwrap();
        assert_eq!(api.fetch_count(), 2);
    }

    // ===========================================
    // Session teardown
    // ===========================================

    #[tokio::test]
    async fn logout_mid_fetch_discards_response() {
        let (client, api, storage) = polling().await;
        api.post_as("bob", "late");
        let gate = api.hold_fetches();

        let (outcome, timer) = tokio::join!(client.tick(), async {
            let timer = client.logout().await.unwrap();
            gate.release();
            timer
        });

        assert_eq!(timer, TimerChange::Cancel);
        assert_eq!(outcome, TickOutcome::Discarded);
        assert!(client.messages().await.is_empty());
        assert_eq!(client.cursor().await, None);
        assert!(client.current_session().is_none());
        assert_eq!(storage.get(TOKEN_KEY).await.unwrap(), None);
        assert_eq!(client.poll_phase().await, PollPhase::Idle);
    }

    #[tokio::test]
    async fn send_confirmed_after_logout_is_discarded() {
        let (client, api, _) = polling().await;
        client.input("hello").await.unwrap();
        let gate = api.hold_writes();

        let (result, ()) = tokio::join!(client.submit(), async {
            client.logout().await.unwrap();
            gate.release();
        });

        assert!(matches!(result, Err(ClientError::SessionEnded)));
        assert_eq!(client.compose_state().await, ComposeState::Empty);
        assert!(client.messages().await.is_empty());
    }

    #[tokio::test]
    async fn edit_confirmed_after_logout_is_discarded() {
        let (client, api, _) = polling().await;
        let mine = api.post_as("alice", "helo");
        client.tick().await;
        client.start_edit(&mine.id).await.unwrap();
        client.input("hello").await.unwrap();
        let gate = api.hold_writes();

        let (result, ()) = tokio::join!(client.submit(), async {
            client.logout().await.unwrap();
            gate.release();
        });

        assert!(matches!(result, Err(ClientError::SessionEnded)));
        assert!(client.messages().await.is_empty());
        assert_eq!(client.compose_state().await, ComposeState::Empty);
        assert_eq!(api.server_messages()[0].content, "hello");
    }

    #[tokio::test]
    async fn delete_confirmed_after_logout_is_discarded() {
        let (client, api, _) = polling().await;
        let mine = api.post_as("alice", "oops");
        client.tick().await;
        let mut events = client.subscribe();
        let gate = api.hold_writes();

        let (result, ()) = tokio::join!(client.delete(&mine.id), async {
            client.logout().await.unwrap();
            gate.release();
        });

        assert!(matches!(result, Err(ClientError::SessionEnded)));
        assert!(client.messages().await.is_empty());
        assert_eq!(
            events.recv().await.unwrap(),
            ChatEvent::SessionEnded {
                reason: EndReason::Logout
            }
        );
        assert!(events.try_recv().is_err(), "no delete event after logout");
    }

    #[tokio::test]
    async fn stale_response_is_discarded_after_relogin() {
        let (client, api, _) = polling().await;
        api.post_as("bob", "late");
        let gate = api.hold_fetches();

        let (outcome, ()) = tokio::join!(client.tick(), async {
            client.logout().await.unwrap();
            client.login("alice", "secret1").await.unwrap();
            gate.release();
        });

        assert_eq!(outcome, TickOutcome::Discarded);
        assert!(client.messages().await.is_empty());
    }

    #[tokio::test]
    async fn unauthorized_poll_ends_session() {
        let (client, api, storage) = polling().await;
        let mut events = client.subscribe();
        api.revoke_all_tokens();

        assert_eq!(client.tick().await, TickOutcome::SessionInvalid);
        assert!(client.current_session().is_none());
        assert_eq!(storage.get(TOKEN_KEY).await.unwrap(), None);
        assert_eq!(client.poll_phase().await, PollPhase::Idle);
        assert_eq!(
            events.recv().await.unwrap(),
            ChatEvent::SessionEnded {
                reason: EndReason::Invalidated
            }
        );
    }

    #[tokio::test]
    async fn unauthorized_resume_cancels_timer() {
        let (client, api, _) = polling().await;
        client.suspend().await;
        api.revoke_all_tokens();

        let transition = client.resume().await.unwrap();
        assert_eq!(transition.fetch, Some(TickOutcome::SessionInvalid));
        assert_eq!(transition.timer, TimerChange::Cancel);
    }

    #[tokio::test]
    async fn logout_clears_draft_and_presence() {
        let (client, api, _) = polling().await;
        client.input("half written").await.unwrap();
        client.refresh_presence().await;
        assert_eq!(client.online_users().await.len(), 1);

        client.logout().await.unwrap();
        assert_eq!(client.compose_state().await, ComposeState::Empty);
        assert!(client.online_users().await.is_empty());
        assert!(!api.requests().is_empty());
    }

    #[tokio::test]
    async fn logout_tears_down_when_token_cannot_be_cleared() {
        let api = MockApi::new();
        api.add_account("alice", "secret1");
        let client = ChatClient::new(ClientConfig::default(), api.clone(), StickyStore::default());
        client.login("alice", "secret1").await.unwrap();
        client.start(None).await.unwrap();
        api.post_as("bob", "hi");
        client.tick().await;
        client.input("draft").await.unwrap();
        let mut events = client.subscribe();

        assert_eq!(client.logout().await.unwrap(), TimerChange::Cancel);

        assert!(client.current_session().is_none());
        assert!(client.messages().await.is_empty());
        assert_eq!(client.poll_phase().await, PollPhase::Idle);
        assert_eq!(client.compose_state().await, ComposeState::Empty);
        assert_eq!(
            events.recv().await.unwrap(),
            ChatEvent::SessionEnded {
                reason: EndReason::Logout
            }
        );
    }

    // ===========================================
    // Composition
    // ===========================================

    #[tokio::test]
    async fn editing_another_users_message_is_rejected() {
        let (client, api, _) = polling().await;
        let theirs = api.post_as("bob", "bob's message");
        client.tick().await;

        let err = client.start_edit(&theirs.id).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::Compose(ComposeError::NotAuthor(_))
        ));
        assert_eq!(err.class(), ErrorClass::Conflict);
        assert_eq!(client.compose_state().await, ComposeState::Empty);
        assert!(client.draft().await.content.is_empty());
    }

    #[tokio::test]
    async fn edit_own_message_applies_confirmed_edit() {
        let (client, _, _) = polling().await;
        client.input("frist").await.unwrap();
        let sent = client.submit().await.unwrap();
        client.tick().await;
        let mut events = client.subscribe();

        client.start_edit(&sent.id).await.unwrap();
        assert_eq!(
            client.compose_state().await,
            ComposeState::Editing(sent.id.clone())
        );
        assert_eq!(client.draft().await.content, "frist");

        client.input("first").await.unwrap();
        let updated = client.submit().await.unwrap();
        assert!(updated.edited);

        let stored = client.messages().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, "first");
        assert!(stored[0].edited);
        assert_eq!(client.compose_state().await, ComposeState::Empty);

        let mut saw_edit = false;
        while let Ok(event) = events.try_recv() {
            saw_edit |= event == ChatEvent::MessageEdited { id: sent.id.clone() };
        }
        assert!(saw_edit);
    }

    #[tokio::test]
    async fn failed_send_keeps_draft() {
        let (client, api, _) = polling().await;
        client.input("important").await.unwrap();
        api.fail_next_write(ApiError::Timeout);

        let err = client.submit().await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Network);
        assert_eq!(client.compose_state().await, ComposeState::Composing);
        assert_eq!(client.draft().await.content, "important");

        client.submit().await.unwrap();
        assert_eq!(api.server_messages().len(), 1);
    }

    #[tokio::test]
    async fn failed_edit_returns_to_editing() {
        let (client, api, _) = polling().await;
        client.input("mine").await.unwrap();
        let sent = client.submit().await.unwrap();
        client.tick().await;

        client.start_edit(&sent.id).await.unwrap();
        client.input("mine, edited").await.unwrap();
        api.fail_next_write(ApiError::Status {
            status: 500,
            detail: "boom".into(),
        });

        let err = client.submit().await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Server);
        assert_eq!(client.compose_state().await, ComposeState::Editing(sent.id));
        assert_eq!(client.draft().await.content, "mine, edited");
    }

    #[tokio::test]
    async fn invalid_content_makes_no_request() {
        let (client, api, _) = polling().await;
        let before = api.requests().len();

        client.input("   ").await.unwrap();
        let err = client.submit().await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Validation);

        client.input(&"x".repeat(501)).await.unwrap();
        let err = client.submit().await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Validation);

        assert_eq!(api.requests().len(), before);
        assert_eq!(client.compose_state().await, ComposeState::Composing);
    }

    #[tokio::test]
    async fn submit_without_session() {
        let (client, _, _) = client();
        assert!(matches!(
            client.submit().await,
            Err(ClientError::NotLoggedIn)
        ));
    }

    #[tokio::test]
    async fn cancel_discards_draft() {
        let (client, _, _) = polling().await;
        client.input("never mind").await.unwrap();
        client.attach("upload-123").await.unwrap();
        assert_eq!(client.draft().await.attachment.as_deref(), Some("upload-123"));

        assert!(client.cancel().await);
        assert_eq!(client.compose_state().await, ComposeState::Empty);
        assert_eq!(client.draft().await, Draft::default());
    }

    #[tokio::test(start_paused = true)]
    async fn typing_signal_expires() {
        let (client, _, _) = logged_in().await;
        let mut events = client.subscribe();

        client.input("h").await.unwrap();
        assert!(client.is_typing().await);
        assert_eq!(
            events.recv().await.unwrap(),
            ChatEvent::TypingChanged { active: true }
        );

        tokio::time::advance(Duration::from_millis(2999)).await;
        assert!(!client.expire_typing().await);

        client.input("he").await.unwrap();
        tokio::time::advance(Duration::from_millis(2999)).await;
        assert!(client.is_typing().await, "second input restarted countdown");

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(client.expire_typing().await);
        assert!(!client.is_typing().await);
    }

    // ===========================================
    // Delete, search, presence
    // ===========================================

    #[tokio::test]
    async fn delete_own_message() {
        let (client, _, _) = polling().await;
        client.input("oops").await.unwrap();
        let sent = client.submit().await.unwrap();
        client.tick().await;

        client.delete(&sent.id).await.unwrap();
        assert!(client.messages().await.is_empty());
    }

    #[tokio::test]
    async fn deleting_another_users_message_is_a_conflict() {
        let (client, api, _) = polling().await;
        let theirs = api.post_as("bob", "hands off");
        client.tick().await;

        let err = client.delete(&theirs.id).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Conflict);
        assert_eq!(client.messages().await, vec![theirs]);
    }

    #[tokio::test]
    async fn query_is_case_insensitive() {
        let (client, api, _) = polling().await;
        api.post_as("bob", "Lunch at noon?");
        api.post_as("carol", "sure");
        api.post_as("dave", "LUNCH!");
        client.tick().await;

        let hits = client.query("lunch").await;
        assert_eq!(hits.len(), 2);
        assert_eq!(client.query("CAROL").await.len(), 1);
    }

    #[tokio::test]
    async fn presence_replaced_wholesale() {
        let (client, api, _) = logged_in().await;
        let mut events = client.subscribe();

        client.start(None).await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            ChatEvent::PresenceChanged { online: 1 }
        );
        assert!(!client.refresh_presence().await, "unchanged snapshot");

        api.add_account("bob", "secret1");
        api.login(&flowchat_types::LoginRequest {
            username: "bob".into(),
            password: "secret1".into(),
        })
        .await
        .unwrap();
        assert!(client.refresh_presence().await);
        assert_eq!(client.online_users().await.len(), 2);
    }

    #[tokio::test]
    async fn resume_refreshes_presence() {
        let (client, api, _) = polling().await;
        client.suspend().await;
        api.add_account("bob", "secret2");
        api.login(&flowchat_types::LoginRequest {
            username: "bob".into(),
            password: "secret2".into(),
        })
        .await
        .unwrap();

        client.resume().await.unwrap();
        assert_eq!(client.online_users().await.len(), 2);
    }

    #[tokio::test]
    async fn presence_failure_is_silent() {
        let (client, api, _) = polling().await;
        api.fail_next_users(ApiError::Network("down".into()));
        assert!(!client.refresh_presence().await);
        assert!(client.current_session().is_some());
    }

    // ===========================================
    // Error classes
    // ===========================================

    #[test]
    fn error_classes() {
        assert_eq!(
            ClientError::from(ApiError::Unauthorized).class(),
            ErrorClass::Auth
        );
        assert_eq!(
            ClientError::from(SessionError::UsernameTaken).class(),
            ErrorClass::Server
        );
        assert_eq!(
            ClientError::from(SessionError::WeakPassword { min: 6 }).class(),
            ErrorClass::Validation
        );
        assert_eq!(
            ClientError::from(ApiError::NotFound(String::new())).class(),
            ErrorClass::Conflict
        );
        assert_eq!(ClientError::SessionEnded.class(), ErrorClass::Auth);
    }
}
