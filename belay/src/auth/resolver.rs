//! Session-to-principal resolution.
//!
//! The session only ever stores a principal id; whether that id still
//! belongs to a live account is re-checked against the credential store on
//! every resolution. Login state is never trusted on the session's word
//! alone: a deactivated or banned account loses its session the next time
//! it shows up, and the stale keys are purged on the spot.

use serde_json::json;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::db::models::users::UserRecord;
use crate::db::store::CredentialStore;
use crate::errors::Result;
use crate::session::{Session, keys};
use crate::types::{RoleLevel, UserId, abbrev_uuid};

/// The authenticated view of a principal, detached from storage details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub role_level: RoleLevel,
    pub is_active: bool,
    pub is_banned: bool,
}

impl From<UserRecord> for CurrentUser {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            role_level: user.role_level,
            is_active: user.is_active,
            is_banned: user.is_banned,
        }
    }
}

/// The principal acting on a request.
///
/// Always a concrete value: unauthenticated visitors are
/// [`Principal::Anonymous`], never an absent option, so downstream code
/// cannot forget the unauthenticated case.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Principal {
    #[default]
    Anonymous,
    Known(CurrentUser),
}

impl Principal {
    /// Whether a principal is authenticated.
    pub fn check(&self) -> bool {
        matches!(self, Principal::Known(_))
    }

    /// The principal id, or the nil-UUID sentinel for anonymous visitors.
    pub fn id(&self) -> UserId {
        match self {
            Principal::Anonymous => Uuid::nil(),
            Principal::Known(user) => user.id,
        }
    }

    pub fn role_level(&self) -> Option<RoleLevel> {
        match self {
            Principal::Anonymous => None,
            Principal::Known(user) => Some(user.role_level),
        }
    }

    /// True when the identity state forbids any privileged action:
    /// anonymous, banned, inactive, or in a restriction level.
    pub fn is_restricted(&self) -> bool {
        match self {
            Principal::Anonymous => true,
            Principal::Known(user) => !user.is_active || user.is_banned || user.role_level.is_restricted(),
        }
    }
}

/// Resolves the current principal for a request.
pub struct Auth<'a> {
    session: &'a dyn Session,
    users: &'a dyn CredentialStore,
}

impl<'a> Auth<'a> {
    pub fn new(session: &'a dyn Session, users: &'a dyn CredentialStore) -> Self {
        Self { session, users }
    }

    /// Resolve the principal from session state with a live-existence check.
    #[instrument(skip(self))]
    pub async fn resolve_current_principal(&self) -> Result<Principal> {
        let Some(value) = self.session.get(keys::PRINCIPAL_ID).await? else {
            return Ok(Principal::Anonymous);
        };

        let Some(id) = value.as_str().and_then(|s| Uuid::parse_str(s).ok()) else {
            // Unparseable state is stale state.
            self.purge_auth_keys().await?;
            return Ok(Principal::Anonymous);
        };

        match self.users.find_by_id(id).await? {
            Some(user) if user.can_authenticate() => Ok(Principal::Known(user.into())),
            Some(user) => {
                debug!(user_id = %abbrev_uuid(&user.id), "session principal no longer authenticatable, purging");
                self.purge_auth_keys().await?;
                Ok(Principal::Anonymous)
            }
            None => {
                debug!(user_id = %abbrev_uuid(&id), "session principal no longer exists, purging");
                self.purge_auth_keys().await?;
                Ok(Principal::Anonymous)
            }
        }
    }

    /// Write the authenticated keys for a principal.
    pub(crate) async fn store_principal(session: &dyn Session, id: UserId) -> Result<()> {
        session.set(keys::PRINCIPAL_ID, json!(id.to_string())).await?;
        session.set(keys::IS_AUTHENTICATED, json!(true)).await?;
        Ok(())
    }

    async fn purge_auth_keys(&self) -> Result<()> {
        self.session.remove(keys::PRINCIPAL_ID).await?;
        self.session.remove(keys::IS_AUTHENTICATED).await?;
        Ok(())
    }
}
