//! In-memory store implementations and record builders for tests.
//!
//! These back the behavior tests without a running database. They honor
//! the same atomicity contracts as the Postgres handlers (single lock
//! section per operation), so tests exercise the same race semantics the
//! production stores guarantee.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::errors::{DbError, Result as DbResult};
use crate::db::models::tokens::{RememberTokenCreateDBRequest, RememberTokenRecord};
use crate::db::models::users::UserRecord;
use crate::db::store::{CredentialStore, ThrottleStore};
use crate::errors::Result;
use crate::notify::ResetNotifier;
use crate::types::{RememberTokenId, RoleLevel, UserId};

/// Install a test subscriber honoring `RUST_LOG`. Safe to call from every
/// test; only the first call wins.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build an active, unbanned principal record with a fresh id.
pub fn user_record(email: &str, role_level: RoleLevel, password_hash: Option<String>) -> UserRecord {
    UserRecord {
        id: Uuid::new_v4(),
        email: email.to_string(),
        username: email.split('@').next().unwrap_or(email).to_string(),
        password_hash,
        role_level,
        is_active: true,
        is_banned: false,
        reset_token_digest: None,
        reset_token_expires_at: None,
        reset_token_used_at: None,
        created_at: Utc::now(),
        last_login: None,
    }
}

#[derive(Default)]
struct CredentialState {
    users: HashMap<UserId, UserRecord>,
    tokens: HashMap<RememberTokenId, RememberTokenRecord>,
}

/// In-memory [`CredentialStore`].
#[derive(Default)]
pub struct MemoryCredentialStore {
    state: Mutex<CredentialState>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, user: UserRecord) {
        self.state.lock().await.users.insert(user.id, user);
    }

    /// Snapshot of a stored record, for asserting on mutations.
    pub async fn get(&self, id: UserId) -> Option<UserRecord> {
        self.state.lock().await.users.get(&id).cloned()
    }

    /// All remember tokens of a principal, in no particular order.
    pub async fn tokens_for(&self, user_id: UserId) -> Vec<RememberTokenRecord> {
        self.state
            .lock()
            .await
            .tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_email(&self, email: &str) -> DbResult<Option<UserRecord>> {
        Ok(self.state.lock().await.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, id: UserId) -> DbResult<Option<UserRecord>> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn update_password_hash(&self, id: UserId, hash: &str) -> DbResult<()> {
        let mut state = self.state.lock().await;
        let user = state.users.get_mut(&id).ok_or(DbError::NotFound)?;
        user.password_hash = Some(hash.to_string());
        Ok(())
    }

    async fn set_reset_token(&self, id: UserId, digest: &str, expires_at: DateTime<Utc>) -> DbResult<()> {
        let mut state = self.state.lock().await;
        let user = state.users.get_mut(&id).ok_or(DbError::NotFound)?;
        user.reset_token_digest = Some(digest.to_string());
        user.reset_token_expires_at = Some(expires_at);
        user.reset_token_used_at = None;
        Ok(())
    }

    async fn clear_reset_token(&self, id: UserId) -> DbResult<()> {
        let mut state = self.state.lock().await;
        let user = state.users.get_mut(&id).ok_or(DbError::NotFound)?;
        user.reset_token_digest = None;
        user.reset_token_expires_at = None;
        user.reset_token_used_at = None;
        Ok(())
    }

    async fn find_by_reset_digest(&self, digest: &str) -> DbResult<Option<UserRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .users
            .values()
            .find(|u| u.reset_token_digest.as_deref() == Some(digest))
            .cloned())
    }

    async fn mark_reset_token_used(&self, id: UserId, at: DateTime<Utc>) -> DbResult<bool> {
        let mut state = self.state.lock().await;
        let user = state.users.get_mut(&id).ok_or(DbError::NotFound)?;
        if user.reset_token_used_at.is_some() {
            return Ok(false);
        }
        user.reset_token_used_at = Some(at);
        Ok(true)
    }

    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> DbResult<()> {
        let mut state = self.state.lock().await;
        let user = state.users.get_mut(&id).ok_or(DbError::NotFound)?;
        user.last_login = Some(at);
        Ok(())
    }

    async fn insert_remember_token(&self, request: &RememberTokenCreateDBRequest) -> DbResult<()> {
        let mut state = self.state.lock().await;
        if state.tokens.values().any(|t| t.selector == request.selector) {
            return Err(DbError::UniqueViolation {
                constraint: Some("remember_tokens_selector_key".to_string()),
                table: Some("remember_tokens".to_string()),
                message: "duplicate selector".to_string(),
            });
        }
        state.tokens.insert(
            request.id,
            RememberTokenRecord {
                id: request.id,
                user_id: request.user_id,
                selector: request.selector.clone(),
                verifier_digest: request.verifier_digest.clone(),
                expires_at: request.expires_at,
                created_at: Utc::now(),
                revoked_at: None,
                superseded_by: None,
            },
        );
        Ok(())
    }

    async fn find_remember_token(&self, selector: &str) -> DbResult<Option<RememberTokenRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .tokens
            .values()
            .find(|t| t.selector == selector)
            .cloned())
    }

    async fn supersede_remember_token(&self, id: RememberTokenId, successor: RememberTokenId) -> DbResult<bool> {
        let mut state = self.state.lock().await;
        match state.tokens.get_mut(&id) {
            Some(token) if token.superseded_by.is_none() => {
                token.superseded_by = Some(successor);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_remember_tokens_for(&self, user_id: UserId) -> DbResult<()> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        for token in state.tokens.values_mut() {
            if token.user_id == user_id && token.revoked_at.is_none() {
                token.revoked_at = Some(now);
            }
        }
        Ok(())
    }
}

/// In-memory [`ThrottleStore`].
#[derive(Default)]
pub struct MemoryThrottleStore {
    counters: Mutex<HashMap<(String, DateTime<Utc>), u32>>,
}

impl MemoryThrottleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ThrottleStore for MemoryThrottleStore {
    async fn hit(&self, identity_key: &str, window_start: DateTime<Utc>) -> DbResult<u32> {
        let mut counters = self.counters.lock().await;
        let count = counters.entry((identity_key.to_string(), window_start)).or_insert(0);
        *count += 1;
        Ok(*count)
    }

    async fn clear(&self, identity_key: &str) -> DbResult<()> {
        self.counters.lock().await.retain(|(key, _), _| key != identity_key);
        Ok(())
    }
}

/// Notifier capturing delivered tokens for assertions.
#[derive(Default)]
pub struct RecordingNotifier {
    deliveries: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn deliveries(&self) -> Vec<(String, String)> {
        self.deliveries.lock().await.clone()
    }

    /// The most recently delivered token, if any.
    pub async fn last_token(&self) -> Option<String> {
        self.deliveries.lock().await.last().map(|(_, token)| token.clone())
    }
}

#[async_trait]
impl ResetNotifier for RecordingNotifier {
    async fn deliver_reset_token(&self, email: &str, token: &str) -> Result<()> {
        self.deliveries.lock().await.push((email.to_string(), token.to_string()));
        Ok(())
    }
}
