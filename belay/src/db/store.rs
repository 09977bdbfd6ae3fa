//! Store protocols consumed by the auth components.
//!
//! The credential store is an external collaborator from the subsystem's
//! point of view: these traits pin down exactly what is consumed from it,
//! and the implementations in [`crate::db::handlers`] provide the
//! Postgres-backed production variant.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::errors::Result;
use crate::db::models::tokens::{RememberTokenCreateDBRequest, RememberTokenRecord};
use crate::db::models::users::UserRecord;
use crate::types::{RememberTokenId, UserId};

/// Principal records and credential/token mutations.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>>;

    async fn update_password_hash(&self, id: UserId, hash: &str) -> Result<()>;

    /// Install a reset token triple, superseding any previous one.
    async fn set_reset_token(&self, id: UserId, digest: &str, expires_at: DateTime<Utc>) -> Result<()>;

    async fn clear_reset_token(&self, id: UserId) -> Result<()>;

    async fn find_by_reset_digest(&self, digest: &str) -> Result<Option<UserRecord>>;

    /// Mark the outstanding reset token consumed. Returns `false` when it
    /// was already consumed — the check and the write are one atomic
    /// conditional update, so a concurrent double-consume loses cleanly.
    async fn mark_reset_token_used(&self, id: UserId, at: DateTime<Utc>) -> Result<bool>;

    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> Result<()>;

    async fn insert_remember_token(&self, request: &RememberTokenCreateDBRequest) -> Result<()>;

    async fn find_remember_token(&self, selector: &str) -> Result<Option<RememberTokenRecord>>;

    /// Chain a rotated-out token to its successor. Returns `false` when a
    /// concurrent rotation already claimed the row — the check and the
    /// write are one atomic conditional update, so racing consumers of
    /// the same cookie cannot both walk away with a live pair.
    async fn supersede_remember_token(&self, id: RememberTokenId, successor: RememberTokenId) -> Result<bool>;

    /// Revoke every remember token of a principal (theft response, and the
    /// follow-through of a credential reset).
    async fn revoke_remember_tokens_for(&self, user_id: UserId) -> Result<()>;
}

/// Failed-attempt counters, one fixed window per identity key.
///
/// Both operations must be atomic at the persistence layer; a
/// read-then-write counter in application code can be raced past.
#[async_trait]
pub trait ThrottleStore: Send + Sync {
    /// Record one attempt in the given window and return the new count,
    /// including this attempt.
    async fn hit(&self, identity_key: &str, window_start: DateTime<Utc>) -> Result<u32>;

    /// Drop all counters for the key (successful login).
    async fn clear(&self, identity_key: &str) -> Result<()>;
}
