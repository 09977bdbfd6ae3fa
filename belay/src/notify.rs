//! Out-of-band delivery boundary for password reset tokens.
//!
//! Transport (SMTP, queue, whatever the platform uses) lives outside this
//! subsystem; the reset flow only hands the plaintext token across this
//! trait. The token is never persisted in plaintext, so whatever sits
//! behind this boundary is the only place it exists outside the user's
//! inbox.

use async_trait::async_trait;

use crate::errors::Result;

#[async_trait]
pub trait ResetNotifier: Send + Sync {
    /// Deliver a freshly minted reset token to the account's address.
    async fn deliver_reset_token(&self, email: &str, token: &str) -> Result<()>;
}

/// Notifier for development setups without a mail transport: announces the
/// issuance at `info` and exposes the token itself only at `debug`.
#[derive(Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl ResetNotifier for TracingNotifier {
    async fn deliver_reset_token(&self, email: &str, token: &str) -> Result<()> {
        tracing::info!(email, "password reset token issued");
        tracing::debug!(email, token, "reset token (development notifier)");
        Ok(())
    }
}
