//! Postgres repository for principal records and tokens.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::db::errors::Result;
use crate::db::models::tokens::{RememberTokenCreateDBRequest, RememberTokenRecord};
use crate::db::models::users::{UserCreateDBRequest, UserRecord};
use crate::db::store::CredentialStore;
use crate::types::{RememberTokenId, UserId, abbrev_uuid};

const USER_COLUMNS: &str = "id, email, username, password_hash, role_level, is_active, is_banned, \
     reset_token_digest, reset_token_expires_at, reset_token_used_at, created_at, last_login";

const TOKEN_COLUMNS: &str = "id, user_id, selector, verifier_digest, expires_at, created_at, revoked_at, superseded_by";

/// Production [`CredentialStore`] over the platform database.
#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a principal at registration time.
    #[instrument(skip(self, request), fields(email = %request.email), err)]
    pub async fn create(&self, request: &UserCreateDBRequest) -> Result<UserRecord> {
        let query = format!(
            "INSERT INTO users (id, email, username, password_hash, role_level) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, UserRecord>(&query)
            .bind(Uuid::new_v4())
            .bind(&request.email)
            .bind(&request.username)
            .bind(&request.password_hash)
            .bind(request.role_level)
            .fetch_one(&self.pool)
            .await?;
        Ok(user)
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    #[instrument(skip(self, email), err)]
    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, UserRecord>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, UserRecord>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    #[instrument(skip(self, hash), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn update_password_hash(&self, id: UserId, hash: &str) -> Result<()> {
        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, digest), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn set_reset_token(&self, id: UserId, digest: &str, expires_at: DateTime<Utc>) -> Result<()> {
        // Overwrites the whole triple: issuing a new token invalidates any
        // previous one for the principal.
        sqlx::query(
            "UPDATE users SET reset_token_digest = $2, reset_token_expires_at = $3, reset_token_used_at = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .bind(digest)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn clear_reset_token(&self, id: UserId) -> Result<()> {
        sqlx::query(
            "UPDATE users SET reset_token_digest = NULL, reset_token_expires_at = NULL, reset_token_used_at = NULL \
             WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip_all, err)]
    async fn find_by_reset_digest(&self, digest: &str) -> Result<Option<UserRecord>> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE reset_token_digest = $1");
        let user = sqlx::query_as::<_, UserRecord>(&query)
            .bind(digest)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn mark_reset_token_used(&self, id: UserId, at: DateTime<Utc>) -> Result<bool> {
        // Conditional update: the second of two racing consumers matches
        // zero rows and learns the token was already spent.
        let result = sqlx::query("UPDATE users SET reset_token_used_at = $2 WHERE id = $1 AND reset_token_used_at IS NULL")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn record_login(&self, id: UserId, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE users SET last_login = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id)), err)]
    async fn insert_remember_token(&self, request: &RememberTokenCreateDBRequest) -> Result<()> {
        sqlx::query(
            "INSERT INTO remember_tokens (id, user_id, selector, verifier_digest, expires_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(request.id)
        .bind(request.user_id)
        .bind(&request.selector)
        .bind(&request.verifier_digest)
        .bind(request.expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip_all, err)]
    async fn find_remember_token(&self, selector: &str) -> Result<Option<RememberTokenRecord>> {
        let query = format!("SELECT {TOKEN_COLUMNS} FROM remember_tokens WHERE selector = $1");
        let token = sqlx::query_as::<_, RememberTokenRecord>(&query)
            .bind(selector)
            .fetch_optional(&self.pool)
            .await?;
        Ok(token)
    }

    #[instrument(skip(self), err)]
    async fn supersede_remember_token(&self, id: RememberTokenId, successor: RememberTokenId) -> Result<bool> {
        // Conditional update: the loser of a concurrent rotation matches
        // zero rows and learns the pair was already rotated out.
        let result = sqlx::query("UPDATE remember_tokens SET superseded_by = $2 WHERE id = $1 AND superseded_by IS NULL")
            .bind(id)
            .bind(successor)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    async fn revoke_remember_tokens_for(&self, user_id: UserId) -> Result<()> {
        sqlx::query("UPDATE remember_tokens SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
