//! Credential store seam
//!
//! The authenticator only ever talks to the store through this trait, one
//! parameterized statement per call and no caching.

use async_trait::async_trait;
use common::error::DatabaseResult;

use crate::models::{User, UserRecord};

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Exact-match lookup of an API key
    async fn api_key_exists(&self, key: &str) -> DatabaseResult<bool>;

    async fn email_exists(&self, email: &str) -> DatabaseResult<bool>;

    /// Persist a user; unique violations surface as `DatabaseError::Conflict`
    async fn insert_user(&self, record: &UserRecord) -> DatabaseResult<User>;

    async fn find_user_by_email(&self, email: &str) -> DatabaseResult<Option<User>>;
}

/// In-process credential store
///
/// Enforces the same uniqueness rules as the relational schema (username
/// and email), which makes it suitable for tests and local tooling.
#[derive(Clone, Default)]
pub struct MemoryCredentialStore {
    inner: std::sync::Arc<std::sync::Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    api_keys: Vec<String>,
    users: Vec<User>,
    lookups: usize,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_key(self, key: impl Into<String>) -> Self {
        if let Ok(mut state) = self.inner.lock() {
            state.api_keys.push(key.into());
        }
        self
    }

    pub fn user_count(&self) -> usize {
        self.inner.lock().map(|state| state.users.len()).unwrap_or(0)
    }

    /// Number of store calls served so far
    pub fn lookups(&self) -> usize {
        self.inner.lock().map(|state| state.lookups).unwrap_or(0)
    }

    fn state(&self) -> DatabaseResult<std::sync::MutexGuard<'_, MemoryState>> {
        let mut state = self.inner.lock().map_err(|_| {
            common::error::DatabaseError::Configuration("credential store poisoned".to_string())
        })?;
        state.lookups += 1;
        Ok(state)
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn api_key_exists(&self, key: &str) -> DatabaseResult<bool> {
        Ok(self.state()?.api_keys.iter().any(|k| k == key))
    }

    async fn email_exists(&self, email: &str) -> DatabaseResult<bool> {
        Ok(self.state()?.users.iter().any(|u| u.email == email))
    }

    async fn insert_user(&self, record: &UserRecord) -> DatabaseResult<User> {
        let mut state = self.state()?;
        if state.users.iter().any(|u| u.email == record.email) {
            return Err(common::error::DatabaseError::Conflict(
                "users_email_unique".to_string(),
            ));
        }
        if state.users.iter().any(|u| u.username == record.username) {
            return Err(common::error::DatabaseError::Conflict(
                "users_username_unique".to_string(),
            ));
        }

        let now = chrono::Utc::now();
        let user = User {
            id: uuid::Uuid::new_v4(),
            username: record.username.clone(),
            email: record.email.clone(),
            password_hash: record.password_hash.clone(),
            created_at: now,
            updated_at: now,
        };
        state.users.push(user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> DatabaseResult<Option<User>> {
        Ok(self.state()?.users.iter().find(|u| u.email == email).cloned())
    }
}
