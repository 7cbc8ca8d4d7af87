//! Online-identity snapshot.
//!
//! Each refresh replaces the previous set wholesale.

use flowchat_types::UserInfo;

/// Latest presence snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Presence {
    users: Vec<UserInfo>,
}

impl Presence {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot. Returns `true` if it differs from the previous one.
    pub fn replace(&mut self, users: Vec<UserInfo>) -> bool {
        let changed = self.users != users;
        self.users = users;
        changed
    }

    /// Users in the last snapshot.
    pub fn users(&self) -> &[UserInfo] {
        &self.users
    }

    /// Number of users online.
    pub fn count(&self) -> usize {
        self.users.len()
    }

    /// Check whether `username` was in the last snapshot.
    pub fn contains(&self, username: &str) -> bool {
        self.users.iter().any(|u| u.username == username)
    }

    /// Forget the snapshot (session ended).
    pub fn clear(&mut self) {
        self.users.clear();
    }
}
