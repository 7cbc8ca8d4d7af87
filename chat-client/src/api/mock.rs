//! Mock API for testing.
//!
//! An in-process stand-in for the server: accounts, tokens, a message log
//! with a monotonic clock, and hooks for forcing failures, scripting fetch
//! responses and holding fetches or writes in flight.

use super::{ApiError, ChatApi};
use async_trait::async_trait;
use flowchat_types::{
    AuthResponse, ChatMessage, LoginRequest, MessageId, RegisterRequest, Timestamp, UserInfo,
};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

const COLORS: [&str; 8] = [
    "#FF6B6B", "#4ECDC4", "#45B7D1", "#96CEB4", "#FFEAA7", "#DDA0DD", "#98D8C8", "#BB8FCE",
];

/// Mock API for testing.
///
/// Clones share state, so a test can keep a handle after moving one into a
/// client.
#[derive(Debug, Default)]
pub struct MockApi {
    inner: Arc<Mutex<MockApiInner>>,
}

#[derive(Debug, Default)]
struct MockApiInner {
    accounts: BTreeMap<String, Account>,
    tokens: HashMap<String, String>,
    messages: Vec<ChatMessage>,
    clock: u64,
    requests: Vec<String>,
    scripted_fetches: VecDeque<Vec<ChatMessage>>,
    fetch_gate: Option<Arc<Notify>>,
    write_gate: Option<Arc<Notify>>,
    fail_next_fetch: Option<ApiError>,
    fail_next_write: Option<ApiError>,
    fail_next_users: Option<ApiError>,
    fail_next_logout: Option<ApiError>,
}

#[derive(Debug, Clone)]
struct Account {
    password: String,
    color: String,
}

#[derive(Debug, Clone, Copy)]
enum Held {
    Fetches,
    Writes,
}

/// Holds requests in flight until released.
///
/// Obtained from [`MockApi::hold_fetches`] or [`MockApi::hold_writes`].
#[derive(Debug)]
pub struct RequestGate {
    notify: Arc<Notify>,
    held: Held,
    inner: Arc<Mutex<MockApiInner>>,
}

impl RequestGate {
    /// Let the held request complete. Later requests are no longer held.
    pub fn release(self) {
        let mut inner = self.inner.lock().unwrap();
        match self.held {
            Held::Fetches => inner.fetch_gate = None,
            Held::Writes => inner.write_gate = None,
        }
        drop(inner);
        self.notify.notify_one();
    }
}

impl MockApiInner {
    fn next_timestamp(&mut self) -> Timestamp {
        self.clock += 1;
        Timestamp::new(format!("2024-01-01T00:00:00.{:06}", self.clock))
    }

    fn create_account(&mut self, username: &str, password: &str) -> AuthResponse {
        let color = COLORS[self.accounts.len() % COLORS.len()].to_string();
        self.accounts.insert(
            username.to_string(),
            Account {
                password: password.to_string(),
                color: color.clone(),
            },
        );
        self.issue_token(username, color)
    }

    fn issue_token(&mut self, username: &str, color: String) -> AuthResponse {
        let token = uuid::Uuid::new_v4().to_string();
        self.tokens.insert(token.clone(), username.to_string());
        AuthResponse {
            username: username.to_string(),
            color,
            token,
        }
    }

    fn authenticate(&self, token: &str) -> Result<UserInfo, ApiError> {
        let username = self.tokens.get(token).ok_or(ApiError::Unauthorized)?;
        let account = self.accounts.get(username).ok_or(ApiError::Unauthorized)?;
        Ok(UserInfo {
            username: username.clone(),
            color: account.color.clone(),
        })
    }

    fn append(&mut self, username: &str, color: &str, content: &str) -> ChatMessage {
        let msg = ChatMessage {
            id: MessageId::new(uuid::Uuid::new_v4().to_string()),
            username: username.to_string(),
            color: color.to_string(),
            content: content.to_string(),
            timestamp: self.next_timestamp(),
            edited: false,
        };
        self.messages.push(msg.clone());
        msg
    }

    fn create(&mut self, token: &str, content: &str) -> Result<ChatMessage, ApiError> {
        if let Some(error) = self.fail_next_write.take() {
            return Err(error);
        }
        let user = self.authenticate(token)?;
        if content.trim().is_empty() {
            return Err(ApiError::Status {
                status: 400,
                detail: "Message cannot be empty".into(),
            });
        }
        Ok(self.append(&user.username, &user.color, content))
    }

    fn update(
        &mut self,
        token: &str,
        id: &MessageId,
        content: &str,
    ) -> Result<ChatMessage, ApiError> {
        if let Some(error) = self.fail_next_write.take() {
            return Err(error);
        }
        let user = self.authenticate(token)?;
        let pos = self.owned_message(id, &user.username)?;
        let msg = &mut self.messages[pos];
        msg.content = content.to_string();
        msg.edited = true;
        Ok(msg.clone())
    }

    fn delete(&mut self, token: &str, id: &MessageId) -> Result<(), ApiError> {
        if let Some(error) = self.fail_next_write.take() {
            return Err(error);
        }
        let user = self.authenticate(token)?;
        let pos = self.owned_message(id, &user.username)?;
        self.messages.remove(pos);
        Ok(())
    }

    fn owned_message(&self, id: &MessageId, username: &str) -> Result<usize, ApiError> {
        let pos = self
            .messages
            .iter()
            .position(|m| &m.id == id)
            .ok_or_else(|| ApiError::NotFound("Message not found".into()))?;
        if self.messages[pos].username != username {
            return Err(ApiError::Forbidden("Not your message".into()));
        }
        Ok(pos)
    }
}

impl MockApi {
    /// Create a new mock API with no accounts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account directly, without going through the API.
    pub fn add_account(&self, username: &str, password: &str) {
        let mut inner = self.inner.lock().unwrap();
        let color = COLORS[inner.accounts.len() % COLORS.len()].to_string();
        inner.accounts.insert(
            username.to_string(),
            Account {
                password: password.to_string(),
                color,
            },
        );
    }

    /// Append a message from `username` as if another client had posted it.
    pub fn post_as(&self, username: &str, content: &str) -> ChatMessage {
        let mut inner = self.inner.lock().unwrap();
        let color = inner
            .accounts
            .get(username)
            .map(|a| a.color.clone())
            .unwrap_or_else(|| COLORS[0].to_string());
        inner.append(username, &color, content)
    }

    /// Messages currently held by the server, oldest first.
    pub fn server_messages(&self) -> Vec<ChatMessage> {
        self.inner.lock().unwrap().messages.clone()
    }

    /// Return `batch` verbatim from the next fetch, ignoring `since`.
    pub fn script_fetch(&self, batch: Vec<ChatMessage>) {
        let mut inner = self.inner.lock().unwrap();
        inner.scripted_fetches.push_back(batch);
    }

    /// Hold every fetch after its response is computed until the gate is
    /// released.
    pub fn hold_fetches(&self) -> RequestGate {
        self.hold(Held::Fetches)
    }

    /// Hold every create, update and delete after it has been applied until
    /// the gate is released.
    pub fn hold_writes(&self) -> RequestGate {
        self.hold(Held::Writes)
    }

    fn hold(&self, held: Held) -> RequestGate {
        let notify = Arc::new(Notify::new());
        let mut inner = self.inner.lock().unwrap();
        match held {
            Held::Fetches => inner.fetch_gate = Some(Arc::clone(&notify)),
            Held::Writes => inner.write_gate = Some(Arc::clone(&notify)),
        }
        RequestGate {
            notify,
            held,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Revoke every issued token, as a server restart or expiry would.
    pub fn revoke_all_tokens(&self) {
        self.inner.lock().unwrap().tokens.clear();
    }

    /// Whether `token` is still accepted.
    pub fn token_is_live(&self, token: &str) -> bool {
        self.inner.lock().unwrap().tokens.contains_key(token)
    }

    /// Cause the next fetch to fail with `error`.
    pub fn fail_next_fetch(&self, error: ApiError) {
        self.inner.lock().unwrap().fail_next_fetch = Some(error);
    }

    /// Cause the next create, update or delete to fail with `error`.
    pub fn fail_next_write(&self, error: ApiError) {
        self.inner.lock().unwrap().fail_next_write = Some(error);
    }

    /// Cause the next presence request to fail with `error`.
    pub fn fail_next_users(&self, error: ApiError) {
        self.inner.lock().unwrap().fail_next_users = Some(error);
    }

    /// Cause the next logout to fail with `error`.
    pub fn fail_next_logout(&self, error: ApiError) {
        self.inner.lock().unwrap().fail_next_logout = Some(error);
    }

    /// Every request received, formatted as `METHOD /path`.
    pub fn requests(&self) -> Vec<String> {
        self.inner.lock().unwrap().requests.clone()
    }

    /// Number of message fetches received.
    pub fn fetch_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| r.starts_with("GET /api/messages"))
            .count()
    }

    fn record(&self, request: String) {
        self.inner.lock().unwrap().requests.push(request);
    }

    /// Apply a write now and deliver its response once any write gate opens.
    async fn write<T>(
        &self,
        apply: impl FnOnce(&mut MockApiInner) -> Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        let (result, gate) = {
            let mut inner = self.inner.lock().unwrap();
            let result = apply(&mut inner);
            (result, inner.write_gate.clone())
        };
        if let Some(notify) = gate {
            notify.notified().await;
        }
        result
    }
}

impl Clone for MockApi {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl ChatApi for MockApi {
    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ApiError> {
        self.record("POST /api/register".into());
        let mut inner = self.inner.lock().unwrap();
        if inner.accounts.contains_key(&request.username) {
            return Err(ApiError::Status {
                status: 409,
                detail: "Username already taken".into(),
            });
        }
        Ok(inner.create_account(&request.username, &request.password))
    }

    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, ApiError> {
        self.record("POST /api/login".into());
        let mut inner = self.inner.lock().unwrap();
        let color = match inner.accounts.get(&request.username) {
            Some(account) if account.password == request.password => account.color.clone(),
            _ => return Err(ApiError::Unauthorized),
        };
        Ok(inner.issue_token(&request.username, color))
    }

    async fn me(&self, token: &str) -> Result<UserInfo, ApiError> {
        self.record("GET /api/me".into());
        self.inner.lock().unwrap().authenticate(token)
    }

    async fn logout(&self, token: &str) -> Result<(), ApiError> {
        self.record("POST /api/logout".into());
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.fail_next_logout.take() {
            return Err(error);
        }
        inner.tokens.remove(token);
        Ok(())
    }

    async fn fetch_messages(
        &self,
        token: &str,
        since: Option<&Timestamp>,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        match since {
            Some(ts) => self.record(format!("GET /api/messages?since={}", ts)),
            None => self.record("GET /api/messages".into()),
        }

        // The response is computed when the request arrives; the gate only
        // delays its delivery.
        let (result, gate) = {
            let mut inner = self.inner.lock().unwrap();
            let result = match inner.fail_next_fetch.take() {
                Some(error) => Err(error),
                None => match inner.authenticate(token) {
                    Err(error) => Err(error),
                    Ok(_) => Ok(match inner.scripted_fetches.pop_front() {
                        Some(batch) => batch,
                        None => inner
                            .messages
                            .iter()
                            .filter(|m| since.map_or(true, |ts| &m.timestamp > ts))
                            .cloned()
                            .collect(),
                    }),
                },
            };
            (result, inner.fetch_gate.clone())
        };

        if let Some(notify) = gate {
            notify.notified().await;
        }
        result
    }

    async fn create_message(&self, token: &str, content: &str) -> Result<ChatMessage, ApiError> {
        self.record("POST /api/messages".into());
        self.write(|inner| inner.create(token, content)).await
    }

    async fn update_message(
        &self,
        token: &str,
        id: &MessageId,
        content: &str,
    ) -> Result<ChatMessage, ApiError> {
        self.record(format!("PUT /api/messages/{}", id));
        self.write(|inner| inner.update(token, id, content)).await
    }

    async fn delete_message(&self, token: &str, id: &MessageId) -> Result<(), ApiError> {
        self.record(format!("DELETE /api/messages/{}", id));
        self.write(|inner| inner.delete(token, id)).await
    }

    async fn list_users(&self, token: &str) -> Result<Vec<UserInfo>, ApiError> {
        self.record("GET /api/users".into());
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.fail_next_users.take() {
            return Err(error);
        }
        inner.authenticate(token)?;

        let mut online: Vec<&String> = inner.tokens.values().collect();
        online.sort();
        online.dedup();
        Ok(online
            .into_iter()
            .filter_map(|name| {
                inner.accounts.get(name).map(|a| UserInfo {
                    username: name.clone(),
                    color: a.color.clone(),
                })
            })
            .collect())
    }
}
