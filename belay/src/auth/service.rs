//! Credential lifecycles: login, logout, password reset, remember-me.
//!
//! Every expected failure leaves this module as a [`Rejection`] value and
//! every externally visible rejection message is uniform, so neither the
//! response body nor the timing of the comparison step reveals whether an
//! identifier exists. Infrastructure failures propagate as [`Error`].

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::csrf::CsrfManager;
use crate::auth::password::{self, Argon2Params};
use crate::auth::resolver::{Auth, CurrentUser};
use crate::config::{AuthConfig, ResetConfig};
use crate::db::models::tokens::RememberTokenCreateDBRequest;
use crate::db::store::CredentialStore;
use crate::errors::{Error, Outcome, Rejection, Result};
use crate::limits::LoginThrottle;
use crate::notify::ResetNotifier;
use crate::session::{Session, keys};
use crate::types::{UserId, abbrev_uuid};

/// Result of a login attempt. Both arms are ordinary values; callers must
/// branch, and `is_success()` gives the boolean view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Success(CurrentUser),
    Rejected(Rejection),
}

impl LoginOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, LoginOutcome::Success(_))
    }

    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            LoginOutcome::Success(_) => None,
            LoginOutcome::Rejected(rejection) => Some(*rejection),
        }
    }
}

/// A rotated remember-me login: the re-authenticated principal plus the
/// replacement cookie value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RememberedLogin {
    pub user: CurrentUser,
    /// New `selector.verifier` pair superseding the presented one.
    pub token: String,
}

/// Authentication service over injected collaborators.
pub struct AuthService {
    users: Arc<dyn CredentialStore>,
    throttle: LoginThrottle,
    notifier: Arc<dyn ResetNotifier>,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn CredentialStore>,
        throttle: LoginThrottle,
        notifier: Arc<dyn ResetNotifier>,
        config: AuthConfig,
    ) -> Self {
        Self {
            users,
            throttle,
            notifier,
            config,
        }
    }

    /// Attempt a credential login.
    ///
    /// Ordering is part of the contract: the throttle counts the attempt
    /// before any hashing work, and unknown identifiers still pay for a
    /// verification against a dummy hash so the comparison step cannot be
    /// timed to enumerate accounts. The identifier lookup itself is an
    /// indexed query and not constant-time; that asymmetry is accepted
    /// and documented here. Success regenerates the session id,
    /// installs the principal keys, rotates the CSRF token, clears the
    /// throttle counter and stamps `last_login`.
    #[instrument(skip(self, session, email, secret))]
    pub async fn attempt(&self, session: &dyn Session, email: &str, secret: &str, origin: &str) -> Result<LoginOutcome> {
        let email = email.trim().to_lowercase();
        let now = Utc::now();

        if !self.throttle.register_attempt(&email, origin, now).await? {
            return Ok(LoginOutcome::Rejected(Rejection::RateLimited));
        }

        let user = self.users.find_by_email(&email).await?;

        let Some((user, hash)) = user.and_then(|u| u.password_hash.clone().map(|h| (u, h))) else {
            // No account or no local credential: equalize the work.
            self.dummy_verify(secret).await;
            info!(email, "login rejected: unknown identifier");
            return Ok(LoginOutcome::Rejected(Rejection::InvalidCredentials));
        };

        if !self.verify_blocking(secret.to_string(), hash).await? {
            info!(user_id = %abbrev_uuid(&user.id), "login rejected: wrong secret");
            return Ok(LoginOutcome::Rejected(Rejection::InvalidCredentials));
        }

        if !user.can_authenticate() {
            // Audit the real reason, surface the generic one.
            warn!(user_id = %abbrev_uuid(&user.id), banned = user.is_banned, "login rejected: {}", Rejection::AccountRestricted);
            return Ok(LoginOutcome::Rejected(Rejection::InvalidCredentials));
        }

        session.regenerate_id().await?;
        Auth::store_principal(session, user.id).await?;
        CsrfManager::rotate(session).await?;
        self.throttle.clear(&email, origin).await?;
        self.users.record_login(user.id, now).await?;

        info!(user_id = %abbrev_uuid(&user.id), "login succeeded");
        Ok(LoginOutcome::Success(user.into()))
    }

    /// End the authenticated session. Non-auth session data survives; the
    /// id is regenerated and the CSRF token discarded.
    #[instrument(skip_all)]
    pub async fn logout(&self, session: &dyn Session) -> Result<()> {
        session.remove(keys::PRINCIPAL_ID).await?;
        session.remove(keys::IS_AUTHENTICATED).await?;
        CsrfManager::clear(session).await?;
        session.regenerate_id().await?;
        Ok(())
    }

    /// Begin a password reset.
    ///
    /// Returns `Ok(())` whether or not the address maps to an account, so
    /// the endpoint cannot be used to enumerate addresses. When it does,
    /// a fresh token supersedes any outstanding one and only its digest
    /// is persisted; the plaintext goes to the notifier and nowhere else.
    #[instrument(skip_all)]
    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        let email = email.trim().to_lowercase();
        let Some(user) = self.users.find_by_email(&email).await? else {
            info!("reset requested for unknown address");
            return Ok(());
        };
        if user.password_hash.is_none() || !user.can_authenticate() {
            info!(user_id = %abbrev_uuid(&user.id), "reset requested for ineligible account");
            return Ok(());
        }

        let ttl = self.config.reset.token_duration.min(ResetConfig::MAX_TOKEN_DURATION);
        let expires_at = Utc::now()
            + chrono::Duration::from_std(ttl).map_err(|e| Error::Internal {
                operation: format!("convert reset ttl: {e}"),
            })?;

        let token = password::generate_token();
        self.users
            .set_reset_token(user.id, &password::lookup_digest(&token), expires_at)
            .await?;
        self.notifier.deliver_reset_token(&user.email, &token).await?;
        Ok(())
    }

    /// Consume a reset token and install a new credential.
    ///
    /// A replayed token answers [`Rejection::TokenAlreadyConsumed`], an
    /// outdated one [`Rejection::TokenExpired`], and anything that never
    /// was a token the generic [`Rejection::InvalidCredentials`]. On
    /// success every remember-me token of the principal is revoked.
    #[instrument(skip_all)]
    pub async fn consume_reset(&self, token: &str, new_secret: &str) -> Outcome<()> {
        if let Err(rejection) = self.validate_secret(new_secret) {
            return Ok(Err(rejection));
        }

        let digest = password::lookup_digest(token);
        let Some(user) = self.users.find_by_reset_digest(&digest).await? else {
            return Ok(Err(Rejection::InvalidCredentials));
        };

        let now = Utc::now();
        if user.reset_token_used_at.is_some() {
            warn!(user_id = %abbrev_uuid(&user.id), "reset token replayed");
            return Ok(Err(Rejection::TokenAlreadyConsumed));
        }
        match user.reset_token_expires_at {
            Some(expires_at) if expires_at > now => {}
            _ => {
                // Expired means no pending reset: drop the triple so the
                // dead digest stops occupying the lookup index.
                self.users.clear_reset_token(user.id).await?;
                return Ok(Err(Rejection::TokenExpired));
            }
        }

        // Loses to any concurrent consumer of the same token.
        if !self.users.mark_reset_token_used(user.id, now).await? {
            warn!(user_id = %abbrev_uuid(&user.id), "reset token replayed");
            return Ok(Err(Rejection::TokenAlreadyConsumed));
        }

        let hash = self.hash_blocking(new_secret.to_string()).await?;
        self.users.update_password_hash(user.id, &hash).await?;
        self.users.revoke_remember_tokens_for(user.id).await?;

        info!(user_id = %abbrev_uuid(&user.id), "credential reset completed");
        Ok(Ok(()))
    }

    /// Issue a remember-me pair for the principal. The returned string is
    /// the cookie value, `selector.verifier`; only the verifier's digest
    /// is stored.
    #[instrument(skip_all, fields(user_id = %abbrev_uuid(&user_id)))]
    pub async fn remember(&self, user_id: UserId) -> Result<String> {
        let (cookie, request) = self.mint_remember_pair(user_id)?;
        self.users.insert_remember_token(&request).await?;
        Ok(cookie)
    }

    /// Re-authenticate from a remember-me cookie, rotating the pair.
    ///
    /// A rotated-out or revoked selector showing up again, or a verifier
    /// mismatch on a live row, is treated as a stolen cookie: the whole
    /// family for that principal is revoked before rejecting.
    #[instrument(skip_all)]
    pub async fn consume_remember_token(&self, candidate: &str) -> Outcome<RememberedLogin> {
        let Some((selector, verifier)) = candidate.split_once('.') else {
            return Ok(Err(Rejection::InvalidCredentials));
        };

        let Some(record) = self.users.find_remember_token(selector).await? else {
            return Ok(Err(Rejection::InvalidCredentials));
        };

        if !record.is_live() {
            warn!(user_id = %abbrev_uuid(&record.user_id), "rotated-out remember token replayed, revoking family");
            self.users.revoke_remember_tokens_for(record.user_id).await?;
            return Ok(Err(Rejection::TokenAlreadyConsumed));
        }

        if record.expires_at <= Utc::now() {
            return Ok(Err(Rejection::TokenExpired));
        }

        if !password::digest_matches(verifier, &record.verifier_digest) {
            warn!(user_id = %abbrev_uuid(&record.user_id), "remember verifier mismatch on live selector, revoking family");
            self.users.revoke_remember_tokens_for(record.user_id).await?;
            return Ok(Err(Rejection::InvalidCredentials));
        }

        let user = match self.users.find_by_id(record.user_id).await? {
            Some(user) if user.can_authenticate() => user,
            _ => {
                self.users.revoke_remember_tokens_for(record.user_id).await?;
                return Ok(Err(Rejection::InvalidCredentials));
            }
        };

        let (cookie, request) = self.mint_remember_pair(user.id)?;
        self.users.insert_remember_token(&request).await?;
        if !self.users.supersede_remember_token(record.id, request.id).await? {
            // A concurrent consumer of the same cookie already rotated it.
            // That is the replay shape, just interleaved: revoke the whole
            // family, this rotation's fresh pair included.
            warn!(user_id = %abbrev_uuid(&record.user_id), "lost remember rotation race, revoking family");
            self.users.revoke_remember_tokens_for(record.user_id).await?;
            return Ok(Err(Rejection::TokenAlreadyConsumed));
        }

        info!(user_id = %abbrev_uuid(&user.id), "remember token rotated");
        Ok(Ok(RememberedLogin {
            user: user.into(),
            token: cookie,
        }))
    }

    fn mint_remember_pair(&self, user_id: UserId) -> Result<(String, RememberTokenCreateDBRequest)> {
        let selector = password::generate_selector();
        let verifier = password::generate_token();
        let expires_at = Utc::now()
            + chrono::Duration::from_std(self.config.remember.token_duration).map_err(|e| Error::Internal {
                operation: format!("convert remember ttl: {e}"),
            })?;

        let request = RememberTokenCreateDBRequest {
            id: Uuid::new_v4(),
            user_id,
            selector: selector.clone(),
            verifier_digest: password::lookup_digest(&verifier),
            expires_at,
        };
        Ok((format!("{selector}.{verifier}"), request))
    }

    fn validate_secret(&self, secret: &str) -> std::result::Result<(), Rejection> {
        let length = secret.chars().count();
        let rules = &self.config.password;
        if length < rules.min_length || length > rules.max_length {
            return Err(Rejection::PasswordPolicy);
        }
        Ok(())
    }

    async fn hash_blocking(&self, secret: String) -> Result<String> {
        let params = Argon2Params::from(&self.config.password);
        tokio::task::spawn_blocking(move || password::hash_secret_with_params(&secret, Some(params)))
            .await
            .map_err(|e| Error::Internal {
                operation: format!("join hashing task: {e}"),
            })?
    }

    async fn verify_blocking(&self, secret: String, hash: String) -> Result<bool> {
        tokio::task::spawn_blocking(move || password::verify_secret(&secret, &hash))
            .await
            .map_err(|e| Error::Internal {
                operation: format!("join verification task: {e}"),
            })?
    }

    /// Burn the same verification work an existing account would cost.
    async fn dummy_verify(&self, secret: &str) {
        static DUMMY_HASH: OnceLock<String> = OnceLock::new();
        let params = Argon2Params::from(&self.config.password);
        let hash = DUMMY_HASH
            .get_or_init(|| password::hash_secret_with_params("timing-equalizer", Some(params)).unwrap_or_default())
            .clone();
        let secret = secret.to_string();
        let _ = tokio::task::spawn_blocking(move || password::verify_secret(&secret, &hash)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThrottleConfig;
    use crate::db::models::users::UserRecord;
    use crate::session::MemorySession;
    use crate::test_utils::{MemoryCredentialStore, MemoryThrottleStore, RecordingNotifier, user_record};
    use crate::types::RoleLevel;
    use serde_json::json;

    struct Fixture {
        service: AuthService,
        users: Arc<MemoryCredentialStore>,
        notifier: Arc<RecordingNotifier>,
    }

    fn fixture_with(config: AuthConfig) -> Fixture {
        crate::test_utils::init_test_tracing();
        let users = Arc::new(MemoryCredentialStore::new());
        let notifier = RecordingNotifier::new();
        let throttle = LoginThrottle::new(Arc::new(MemoryThrottleStore::new()), &config.throttle);
        let service = AuthService::new(users.clone(), throttle, notifier.clone(), config);
        Fixture { service, users, notifier }
    }

    fn fixture() -> Fixture {
        // Cheap Argon2 parameters so the suite stays fast.
        let mut config = AuthConfig::default();
        config.password.argon2_memory_kib = 1024;
        config.password.argon2_iterations = 1;
        fixture_with(config)
    }

    fn cheap_params() -> Argon2Params {
        Argon2Params {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    async fn seed_user(fx: &Fixture, email: &str, secret: &str, role_level: RoleLevel) -> UserRecord {
        let hash = password::hash_secret_with_params(secret, Some(cheap_params())).unwrap();
        let user = user_record(email, role_level, Some(hash));
        fx.users.insert(user.clone()).await;
        user
    }

    #[tokio::test]
    async fn test_successful_login_sets_session_state() {
        let fx = fixture();
        let user = seed_user(&fx, "alice@example.com", "correct-horse-battery", RoleLevel::Member).await;

        let session = MemorySession::new();
        session.set(keys::INTENDED_URL, json!("/routes/42")).await.unwrap();
        let id_before = session.id().await.unwrap();

        let outcome = fx
            .service
            .attempt(&session, "alice@example.com", "correct-horse-battery", "10.0.0.1")
            .await
            .unwrap();
        assert!(outcome.is_success());

        // Fixation defense: new id, old data intact.
        assert_ne!(session.id().await.unwrap(), id_before);
        assert_eq!(session.get(keys::INTENDED_URL).await.unwrap(), Some(json!("/routes/42")));
        assert_eq!(
            session.get(keys::PRINCIPAL_ID).await.unwrap(),
            Some(json!(user.id.to_string()))
        );
        assert_eq!(session.get(keys::IS_AUTHENTICATED).await.unwrap(), Some(json!(true)));
        assert!(session.get(keys::CSRF_TOKEN).await.unwrap().is_some());
        assert!(fx.users.get(user.id).await.unwrap().last_login.is_some());
    }

    #[tokio::test]
    async fn test_unknown_email_and_wrong_password_reject_identically() {
        let fx = fixture();
        seed_user(&fx, "alice@example.com", "correct-horse-battery", RoleLevel::Member).await;
        let session = MemorySession::new();

        let unknown = fx
            .service
            .attempt(&session, "nobody@example.com", "whatever-secret", "10.0.0.1")
            .await
            .unwrap();
        let wrong = fx
            .service
            .attempt(&session, "alice@example.com", "not-the-password", "10.0.0.1")
            .await
            .unwrap();

        assert_eq!(unknown.rejection(), Some(Rejection::InvalidCredentials));
        assert_eq!(wrong.rejection(), Some(Rejection::InvalidCredentials));
        assert_eq!(session.get(keys::PRINCIPAL_ID).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_banned_account_surfaces_generic_rejection() {
        let fx = fixture();
        let mut user = seed_user(&fx, "mallory@example.com", "correct-horse-battery", RoleLevel::Member).await;
        user.is_banned = true;
        fx.users.insert(user).await;

        let session = MemorySession::new();
        let outcome = fx
            .service
            .attempt(&session, "mallory@example.com", "correct-horse-battery", "10.0.0.1")
            .await
            .unwrap();
        assert_eq!(outcome.rejection(), Some(Rejection::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_throttle_engages_before_verification() {
        let mut config = AuthConfig::default();
        config.password.argon2_memory_kib = 1024;
        config.password.argon2_iterations = 1;
        config.throttle = ThrottleConfig {
            window: std::time::Duration::from_secs(900),
            max_attempts: 2,
        };
        let fx = fixture_with(config);
        seed_user(&fx, "alice@example.com", "correct-horse-battery", RoleLevel::Member).await;
        let session = MemorySession::new();

        for _ in 0..2 {
            fx.service
                .attempt(&session, "alice@example.com", "not-the-password", "10.0.0.1")
                .await
                .unwrap();
        }
        // Third attempt is over the limit even with the right secret.
        let outcome = fx
            .service
            .attempt(&session, "alice@example.com", "correct-horse-battery", "10.0.0.1")
            .await
            .unwrap();
        assert_eq!(outcome.rejection(), Some(Rejection::RateLimited));
    }

    #[tokio::test]
    async fn test_success_clears_throttle_counter() {
        let mut config = AuthConfig::default();
        config.password.argon2_memory_kib = 1024;
        config.password.argon2_iterations = 1;
        config.throttle = ThrottleConfig {
            window: std::time::Duration::from_secs(900),
            max_attempts: 3,
        };
        let fx = fixture_with(config);
        seed_user(&fx, "alice@example.com", "correct-horse-battery", RoleLevel::Member).await;
        let session = MemorySession::new();

        for _ in 0..2 {
            fx.service
                .attempt(&session, "alice@example.com", "not-the-password", "10.0.0.1")
                .await
                .unwrap();
        }
        let outcome = fx
            .service
            .attempt(&session, "alice@example.com", "correct-horse-battery", "10.0.0.1")
            .await
            .unwrap();
        assert!(outcome.is_success());

        // Counter restarts: two fresh failures stay under the limit.
        for _ in 0..2 {
            let outcome = fx
                .service
                .attempt(&session, "alice@example.com", "not-the-password", "10.0.0.1")
                .await
                .unwrap();
            assert_eq!(outcome.rejection(), Some(Rejection::InvalidCredentials));
        }
    }

    #[tokio::test]
    async fn test_logout_preserves_unrelated_session_data() {
        let fx = fixture();
        seed_user(&fx, "alice@example.com", "correct-horse-battery", RoleLevel::Member).await;
        let session = MemorySession::new();
        fx.service
            .attempt(&session, "alice@example.com", "correct-horse-battery", "10.0.0.1")
            .await
            .unwrap();
        session.set("locale", json!("de")).await.unwrap();
        let id_before = session.id().await.unwrap();

        fx.service.logout(&session).await.unwrap();

        assert_eq!(session.get(keys::PRINCIPAL_ID).await.unwrap(), None);
        assert_eq!(session.get(keys::IS_AUTHENTICATED).await.unwrap(), None);
        assert_eq!(session.get(keys::CSRF_TOKEN).await.unwrap(), None);
        assert_eq!(session.get("locale").await.unwrap(), Some(json!("de")));
        assert_ne!(session.id().await.unwrap(), id_before);
    }

    #[tokio::test]
    async fn test_reset_request_is_enumeration_safe() {
        let fx = fixture();
        seed_user(&fx, "alice@example.com", "correct-horse-battery", RoleLevel::Member).await;

        fx.service.request_password_reset("alice@example.com").await.unwrap();
        fx.service.request_password_reset("nobody@example.com").await.unwrap();

        // Only the real account got a delivery, and the caller cannot tell.
        let deliveries = fx.notifier.deliveries().await;
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].0, "alice@example.com");
    }

    #[tokio::test]
    async fn test_reset_round_trip_and_replay() {
        let fx = fixture();
        let user = seed_user(&fx, "alice@example.com", "old-password-123", RoleLevel::Member).await;
        fx.service.remember(user.id).await.unwrap();

        fx.service.request_password_reset("alice@example.com").await.unwrap();
        let token = fx.notifier.last_token().await.unwrap();

        assert_eq!(
            fx.service.consume_reset(&token, "new-password-456").await.unwrap(),
            Ok(())
        );

        // New credential works.
        let session = MemorySession::new();
        let outcome = fx
            .service
            .attempt(&session, "alice@example.com", "new-password-456", "10.0.0.1")
            .await
            .unwrap();
        assert!(outcome.is_success());

        // Remember tokens did not survive the reset.
        assert!(fx.users.tokens_for(user.id).await.iter().all(|t| t.revoked_at.is_some()));

        // Replay is recognized as consumption, not as an unknown token.
        assert_eq!(
            fx.service.consume_reset(&token, "another-password-789").await.unwrap(),
            Err(Rejection::TokenAlreadyConsumed)
        );
    }

    #[tokio::test]
    async fn test_reset_expiry_clears_dead_token() {
        let fx = fixture();
        let user = seed_user(&fx, "alice@example.com", "old-password-123", RoleLevel::Member).await;
        let token = password::generate_token();
        fx.users
            .set_reset_token(
                user.id,
                &password::lookup_digest(&token),
                Utc::now() - chrono::Duration::seconds(1),
            )
            .await
            .unwrap();

        assert_eq!(
            fx.service.consume_reset(&token, "new-password-456").await.unwrap(),
            Err(Rejection::TokenExpired)
        );

        // Expired means no pending reset: the triple is gone and a second
        // presentation reads as a token that never existed.
        let record = fx.users.get(user.id).await.unwrap();
        assert!(record.reset_token_digest.is_none());
        assert!(record.reset_token_expires_at.is_none());
        assert_eq!(
            fx.service.consume_reset(&token, "new-password-456").await.unwrap(),
            Err(Rejection::InvalidCredentials)
        );
    }

    #[tokio::test]
    async fn test_reset_rejects_garbage_and_weak_passwords() {
        let fx = fixture();
        assert_eq!(
            fx.service.consume_reset("never-issued", "new-password-456").await.unwrap(),
            Err(Rejection::InvalidCredentials)
        );
        assert_eq!(
            fx.service.consume_reset("whatever", "short").await.unwrap(),
            Err(Rejection::PasswordPolicy)
        );
    }

    #[tokio::test]
    async fn test_remember_rotation() {
        let fx = fixture();
        let user = seed_user(&fx, "alice@example.com", "correct-horse-battery", RoleLevel::Member).await;
        let cookie = fx.service.remember(user.id).await.unwrap();

        let login = fx.service.consume_remember_token(&cookie).await.unwrap().unwrap();
        assert_eq!(login.user.id, user.id);
        assert_ne!(login.token, cookie);

        // The rotated-out pair is spent.
        assert_eq!(
            fx.service.consume_remember_token(&cookie).await.unwrap(),
            Err(Rejection::TokenAlreadyConsumed)
        );
    }

    #[tokio::test]
    async fn test_concurrent_rotation_has_single_winner() {
        let fx = fixture();
        let user = seed_user(&fx, "alice@example.com", "correct-horse-battery", RoleLevel::Member).await;
        let cookie = fx.service.remember(user.id).await.unwrap();
        let (selector, _) = cookie.split_once('.').unwrap();
        let old = fx.users.find_remember_token(selector).await.unwrap().unwrap();

        // Two consumers of the same cookie both saw the live row and both
        // inserted their replacement pair; only one supersede may claim it.
        let mint = |tag: &str| RememberTokenCreateDBRequest {
            id: Uuid::new_v4(),
            user_id: user.id,
            selector: password::generate_selector(),
            verifier_digest: password::lookup_digest(tag),
            expires_at: Utc::now() + chrono::Duration::days(30),
        };
        let first = mint("first");
        let second = mint("second");
        fx.users.insert_remember_token(&first).await.unwrap();
        fx.users.insert_remember_token(&second).await.unwrap();

        assert!(fx.users.supersede_remember_token(old.id, first.id).await.unwrap());
        assert!(!fx.users.supersede_remember_token(old.id, second.id).await.unwrap());
    }

    /// Store that always loses the rotation claim, standing in for a
    /// concurrent consumer winning between the read and the update.
    struct ContestedStore {
        inner: Arc<MemoryCredentialStore>,
    }

    #[async_trait::async_trait]
    impl CredentialStore for ContestedStore {
        async fn find_by_email(&self, email: &str) -> crate::db::errors::Result<Option<UserRecord>> {
            self.inner.find_by_email(email).await
        }
        async fn find_by_id(&self, id: UserId) -> crate::db::errors::Result<Option<UserRecord>> {
            self.inner.find_by_id(id).await
        }
        async fn update_password_hash(&self, id: UserId, hash: &str) -> crate::db::errors::Result<()> {
            self.inner.update_password_hash(id, hash).await
        }
        async fn set_reset_token(
            &self,
            id: UserId,
            digest: &str,
            expires_at: chrono::DateTime<Utc>,
        ) -> crate::db::errors::Result<()> {
            self.inner.set_reset_token(id, digest, expires_at).await
        }
        async fn clear_reset_token(&self, id: UserId) -> crate::db::errors::Result<()> {
            self.inner.clear_reset_token(id).await
        }
        async fn find_by_reset_digest(&self, digest: &str) -> crate::db::errors::Result<Option<UserRecord>> {
            self.inner.find_by_reset_digest(digest).await
        }
        async fn mark_reset_token_used(&self, id: UserId, at: chrono::DateTime<Utc>) -> crate::db::errors::Result<bool> {
            self.inner.mark_reset_token_used(id, at).await
        }
        async fn record_login(&self, id: UserId, at: chrono::DateTime<Utc>) -> crate::db::errors::Result<()> {
            self.inner.record_login(id, at).await
        }
        async fn insert_remember_token(&self, request: &RememberTokenCreateDBRequest) -> crate::db::errors::Result<()> {
            self.inner.insert_remember_token(request).await
        }
        async fn find_remember_token(
            &self,
            selector: &str,
        ) -> crate::db::errors::Result<Option<crate::db::models::tokens::RememberTokenRecord>> {
            self.inner.find_remember_token(selector).await
        }
        async fn supersede_remember_token(
            &self,
            _id: crate::types::RememberTokenId,
            _successor: crate::types::RememberTokenId,
        ) -> crate::db::errors::Result<bool> {
            Ok(false)
        }
        async fn revoke_remember_tokens_for(&self, user_id: UserId) -> crate::db::errors::Result<()> {
            self.inner.revoke_remember_tokens_for(user_id).await
        }
    }

    #[tokio::test]
    async fn test_lost_rotation_race_revokes_family() {
        crate::test_utils::init_test_tracing();
        let inner = Arc::new(MemoryCredentialStore::new());
        let user = user_record("alice@example.com", RoleLevel::Member, None);
        inner.insert(user.clone()).await;

        let config = AuthConfig::default();
        let throttle = LoginThrottle::new(Arc::new(MemoryThrottleStore::new()), &config.throttle);
        let service = AuthService::new(
            Arc::new(ContestedStore { inner: inner.clone() }),
            throttle,
            RecordingNotifier::new(),
            config,
        );

        let cookie = service.remember(user.id).await.unwrap();
        assert_eq!(
            service.consume_remember_token(&cookie).await.unwrap(),
            Err(Rejection::TokenAlreadyConsumed)
        );

        // No live pair survives, the loser's fresh insert included.
        let tokens = inner.tokens_for(user.id).await;
        assert_eq!(tokens.len(), 2);
        assert!(tokens.iter().all(|t| t.revoked_at.is_some()));
    }

    #[tokio::test]
    async fn test_remember_replay_revokes_family() {
        let fx = fixture();
        let user = seed_user(&fx, "alice@example.com", "correct-horse-battery", RoleLevel::Member).await;
        let cookie = fx.service.remember(user.id).await.unwrap();

        let rotated = fx.service.consume_remember_token(&cookie).await.unwrap().unwrap();
        // Old cookie replayed: theft assumption, the successor dies too.
        fx.service.consume_remember_token(&cookie).await.unwrap().unwrap_err();

        assert_eq!(
            fx.service.consume_remember_token(&rotated.token).await.unwrap(),
            Err(Rejection::TokenAlreadyConsumed)
        );
    }

    #[tokio::test]
    async fn test_remember_verifier_mismatch_revokes_family() {
        let fx = fixture();
        let user = seed_user(&fx, "alice@example.com", "correct-horse-battery", RoleLevel::Member).await;
        let cookie = fx.service.remember(user.id).await.unwrap();
        let (selector, _) = cookie.split_once('.').unwrap();

        let forged = format!("{selector}.{}", password::generate_token());
        assert_eq!(
            fx.service.consume_remember_token(&forged).await.unwrap(),
            Err(Rejection::InvalidCredentials)
        );
        // The legitimate cookie is gone with the family.
        assert_eq!(
            fx.service.consume_remember_token(&cookie).await.unwrap(),
            Err(Rejection::TokenAlreadyConsumed)
        );
    }

    #[tokio::test]
    async fn test_remember_families_are_isolated() {
        let fx = fixture();
        let alice = seed_user(&fx, "alice@example.com", "correct-horse-battery", RoleLevel::Member).await;
        let bob = seed_user(&fx, "bob@example.com", "correct-horse-battery", RoleLevel::Member).await;
        let alice_cookie = fx.service.remember(alice.id).await.unwrap();
        let bob_cookie = fx.service.remember(bob.id).await.unwrap();

        // Burn Alice's family via a forged verifier.
        let (selector, _) = alice_cookie.split_once('.').unwrap();
        let forged = format!("{selector}.{}", password::generate_token());
        fx.service.consume_remember_token(&forged).await.unwrap().unwrap_err();

        // Bob is untouched.
        assert!(fx.service.consume_remember_token(&bob_cookie).await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_remember_expiry_and_malformed_cookie() {
        let fx = fixture();
        let user = seed_user(&fx, "alice@example.com", "correct-horse-battery", RoleLevel::Member).await;

        let selector = password::generate_selector();
        let verifier = password::generate_token();
        fx.users
            .insert_remember_token(&RememberTokenCreateDBRequest {
                id: Uuid::new_v4(),
                user_id: user.id,
                selector: selector.clone(),
                verifier_digest: password::lookup_digest(&verifier),
                expires_at: Utc::now() - chrono::Duration::seconds(1),
            })
            .await
            .unwrap();

        assert_eq!(
            fx.service.consume_remember_token(&format!("{selector}.{verifier}")).await.unwrap(),
            Err(Rejection::TokenExpired)
        );
        assert_eq!(
            fx.service.consume_remember_token("no-separator-here").await.unwrap(),
            Err(Rejection::InvalidCredentials)
        );
    }
}
