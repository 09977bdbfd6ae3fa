//! Session store protocol and an in-memory implementation.
//!
//! The host platform owns session persistence (cookie plumbing, backing
//! store, expiry sweeps). This subsystem only talks to the per-visitor
//! key/value state through the [`Session`] trait, so nothing here ever
//! reaches for ambient global state. [`MemorySession`] backs tests and
//! single-process deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::errors::Result;

/// Session keys owned by the auth subsystem. The host must treat these as
/// reserved.
pub mod keys {
    /// UUID of the authenticated principal.
    pub const PRINCIPAL_ID: &str = "principal_id";
    /// Set to `true` on login; purged with the principal id.
    pub const IS_AUTHENTICATED: &str = "is_authenticated";
    /// Session-bound CSRF token.
    pub const CSRF_TOKEN: &str = "_csrf";
    /// URL to return to after a login interrupt.
    pub const INTENDED_URL: &str = "intended_url";
}

/// Per-visitor key/value state with id regeneration.
///
/// Implementations may be backed by anything (database row, Redis hash,
/// signed cookie); all operations are fallible so an unreachable backing
/// store propagates instead of silently passing an empty session.
#[async_trait]
pub trait Session: Send + Sync {
    /// Opaque session id as currently issued to the visitor.
    async fn id(&self) -> Result<String>;

    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    /// Issue a fresh session id while keeping all stored state. Called on
    /// every privilege-level change to defeat session fixation.
    async fn regenerate_id(&self) -> Result<()>;

    /// Store a one-shot value readable exactly once via [`Session::take_flash`].
    async fn flash(&self, key: &str, value: Value) -> Result<()>;

    /// Read-and-clear a flashed value.
    async fn take_flash(&self, key: &str) -> Result<Option<Value>>;
}

#[derive(Debug, Default)]
struct SessionState {
    id: String,
    data: HashMap<String, Value>,
    flash: HashMap<String, Value>,
}

/// In-process [`Session`] implementation.
#[derive(Debug)]
pub struct MemorySession {
    state: Mutex<SessionState>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SessionState {
                id: Uuid::new_v4().to_string(),
                data: HashMap::new(),
                flash: HashMap::new(),
            }),
        }
    }
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn id(&self) -> Result<String> {
        Ok(self.state.lock().await.id.clone())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.state.lock().await.data.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.state.lock().await.data.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.state.lock().await.data.remove(key);
        Ok(())
    }

    async fn regenerate_id(&self) -> Result<()> {
        self.state.lock().await.id = Uuid::new_v4().to_string();
        Ok(())
    }

    async fn flash(&self, key: &str, value: Value) -> Result<()> {
        self.state.lock().await.flash.insert(key.to_string(), value);
        Ok(())
    }

    async fn take_flash(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.state.lock().await.flash.remove(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_remove() {
        let session = MemorySession::new();
        session.set("greeting", json!("hello")).await.unwrap();
        assert_eq!(session.get("greeting").await.unwrap(), Some(json!("hello")));

        session.remove("greeting").await.unwrap();
        assert_eq!(session.get("greeting").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_regenerate_id_preserves_data() {
        let session = MemorySession::new();
        session.set(keys::INTENDED_URL, json!("/routes/42")).await.unwrap();

        let before = session.id().await.unwrap();
        session.regenerate_id().await.unwrap();
        let after = session.id().await.unwrap();

        assert_ne!(before, after);
        assert_eq!(session.get(keys::INTENDED_URL).await.unwrap(), Some(json!("/routes/42")));
    }

    #[tokio::test]
    async fn test_flash_reads_once() {
        let session = MemorySession::new();
        session.flash("notice", json!("saved")).await.unwrap();

        assert_eq!(session.take_flash("notice").await.unwrap(), Some(json!("saved")));
        assert_eq!(session.take_flash("notice").await.unwrap(), None);
    }
}
