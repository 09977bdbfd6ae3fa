//! Database models for remember-me tokens.
//!
//! A remember token is a selector+verifier pair. The selector is stored
//! plaintext (it is the lookup key), the verifier only as a digest. Rows
//! are never deleted on rotation: the superseded row stays behind so a
//! replay of a rotated-out selector is recognizable as theft.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::types::{RememberTokenId, UserId};

#[derive(Debug, Clone, FromRow)]
pub struct RememberTokenRecord {
    pub id: RememberTokenId,
    pub user_id: UserId,
    pub selector: String,
    pub verifier_digest: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub superseded_by: Option<RememberTokenId>,
}

impl RememberTokenRecord {
    /// A token is live when it has not been rotated out or revoked.
    pub fn is_live(&self) -> bool {
        self.revoked_at.is_none() && self.superseded_by.is_none()
    }
}

/// Database request for inserting a freshly minted token pair.
#[derive(Debug, Clone)]
pub struct RememberTokenCreateDBRequest {
    pub id: RememberTokenId,
    pub user_id: UserId,
    pub selector: String,
    pub verifier_digest: String,
    pub expires_at: DateTime<Utc>,
}
