//! Database models for principal records.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::types::{RoleLevel, UserId};

/// Canonical principal record.
///
/// One schema, one identifier column: the email is the login identifier
/// everywhere, there is no fallback column guessing at this boundary.
/// Reset tokens live on the record as a digest + expiry + used-at triple;
/// at most one is outstanding per principal and issuing a new one
/// overwrites (supersedes) the previous triple.
#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub id: UserId,
    pub email: String,
    pub username: String,
    /// None for accounts provisioned without a local credential.
    pub password_hash: Option<String>,
    pub role_level: RoleLevel,
    pub is_active: bool,
    pub is_banned: bool,
    pub reset_token_digest: Option<String>,
    pub reset_token_expires_at: Option<DateTime<Utc>>,
    pub reset_token_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl UserRecord {
    /// Whether the account may authenticate at all. Restriction *levels*
    /// (pending) still authenticate; the boolean overrides do not.
    pub fn can_authenticate(&self) -> bool {
        self.is_active && !self.is_banned
    }
}

/// Database request for creating a new principal at registration.
#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub email: String,
    pub username: String,
    pub password_hash: Option<String>,
    /// Registration default is `Member` or `Pending` depending on whether
    /// the platform requires verification.
    pub role_level: RoleLevel,
}
