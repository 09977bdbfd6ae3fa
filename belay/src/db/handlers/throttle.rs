//! Postgres fixed-window attempt counter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::instrument;

use crate::db::errors::Result;
use crate::db::store::ThrottleStore;

/// Production [`ThrottleStore`]: one upsert per attempt, so the increment
/// and the read are a single statement and cannot be raced past.
#[derive(Debug, Clone)]
pub struct PgThrottleStore {
    pool: PgPool,
}

impl PgThrottleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Drop windows that ended before `cutoff`. Intended for a periodic
    /// sweep owned by the host platform.
    #[instrument(skip(self), err)]
    pub async fn prune_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM login_attempts WHERE window_start < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl ThrottleStore for PgThrottleStore {
    #[instrument(skip(self, identity_key), err)]
    async fn hit(&self, identity_key: &str, window_start: DateTime<Utc>) -> Result<u32> {
        let count: i32 = sqlx::query_scalar(
            "INSERT INTO login_attempts (identity_key, window_start, attempt_count) \
             VALUES ($1, $2, 1) \
             ON CONFLICT (identity_key, window_start) \
             DO UPDATE SET attempt_count = login_attempts.attempt_count + 1 \
             RETURNING attempt_count",
        )
        .bind(identity_key)
        .bind(window_start)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.max(0) as u32)
    }

    #[instrument(skip(self, identity_key), err)]
    async fn clear(&self, identity_key: &str) -> Result<()> {
        sqlx::query("DELETE FROM login_attempts WHERE identity_key = $1")
            .bind(identity_key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
