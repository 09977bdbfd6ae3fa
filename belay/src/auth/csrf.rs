//! Session-bound CSRF tokens.
//!
//! Policy: one persistent token per session. The token lives under a
//! reserved session key and is rotated on login, logout and any other
//! principal change, so a token handed out pre-login is worthless
//! post-login. Per-form one-time tokens would narrow the window further
//! at the cost of per-form state; the persistent-per-session variant is
//! the one this subsystem commits to.

use serde_json::json;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::auth::password;
use crate::errors::{Rejection, Result};
use crate::session::{Session, keys};

pub struct CsrfManager;

impl CsrfManager {
    /// The session's CSRF token, minting one if none exists yet.
    pub async fn token(session: &dyn Session) -> Result<String> {
        if let Some(value) = session.get(keys::CSRF_TOKEN).await? {
            if let Some(token) = value.as_str() {
                return Ok(token.to_string());
            }
        }
        Self::rotate(session).await
    }

    /// Replace the session's token with a fresh one.
    pub async fn rotate(session: &dyn Session) -> Result<String> {
        let token = password::generate_token();
        session.set(keys::CSRF_TOKEN, json!(token)).await?;
        Ok(token)
    }

    /// Drop the token entirely (logout).
    pub async fn clear(session: &dyn Session) -> Result<()> {
        session.remove(keys::CSRF_TOKEN).await
    }

    /// Validate a candidate against the session-bound token.
    ///
    /// The comparison runs over fixed-length digests of both sides, so
    /// neither content nor length differences shift the timing.
    pub async fn validate(session: &dyn Session, candidate: &str) -> Result<std::result::Result<(), Rejection>> {
        let stored = session.get(keys::CSRF_TOKEN).await?;
        let Some(stored) = stored.as_ref().and_then(|v| v.as_str()) else {
            return Ok(Err(Rejection::CsrfMismatch));
        };

        let stored_digest = Sha256::digest(stored.as_bytes());
        let candidate_digest = Sha256::digest(candidate.as_bytes());

        if bool::from(stored_digest.ct_eq(&candidate_digest)) {
            Ok(Ok(()))
        } else {
            Ok(Err(Rejection::CsrfMismatch))
        }
    }
}
