//! Failed-login throttling.
//!
//! Fixed-window counting keyed by identifier + origin. The identifier is
//! the attempted login email (lowercased), the origin is whatever stable
//! client marker the host platform supplies (usually the remote address).
//! Counting happens before credential verification so an attacker cannot
//! burn hashing work past the limit, and every attempt in the window
//! counts, successful or not, until a success clears the key.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tracing::warn;

use crate::config::ThrottleConfig;
use crate::db::store::ThrottleStore;
use crate::errors::Result;

/// Fixed-window attempt limiter over a [`ThrottleStore`].
#[derive(Clone)]
pub struct LoginThrottle {
    store: Arc<dyn ThrottleStore>,
    window: Duration,
    max_attempts: u32,
}

impl LoginThrottle {
    pub fn new(store: Arc<dyn ThrottleStore>, config: &ThrottleConfig) -> Self {
        Self {
            store,
            window: config.window,
            max_attempts: config.max_attempts,
        }
    }

    /// Record one attempt and report whether it is still within the limit.
    ///
    /// Returns `false` when this attempt exceeds `max_attempts` for the
    /// current window. The attempt is counted either way, so hammering a
    /// throttled key never lets the counter drain mid-window.
    pub async fn register_attempt(&self, identifier: &str, origin: &str, now: DateTime<Utc>) -> Result<bool> {
        let key = identity_key(identifier, origin);
        let count = self.store.hit(&key, self.window_start(now)).await?;
        if count > self.max_attempts {
            warn!(origin, attempts = count, "login throttle engaged");
            return Ok(false);
        }
        Ok(true)
    }

    /// Drop all counters for the key after a successful login.
    pub async fn clear(&self, identifier: &str, origin: &str) -> Result<()> {
        self.store.clear(&identity_key(identifier, origin)).await?;
        Ok(())
    }

    fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let width = self.window.as_secs().max(1) as i64;
        let secs = now.timestamp();
        let floored = secs - secs.rem_euclid(width);
        Utc.timestamp_opt(floored, 0).single().unwrap_or(now)
    }
}

/// Composite throttle key. The identifier is lowercased so case variants
/// of one email share a counter.
fn identity_key(identifier: &str, origin: &str) -> String {
    format!("{}|{origin}", identifier.to_lowercase())
}
