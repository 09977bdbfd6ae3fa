//! Configuration loading and validation.
//!
//! Settings load from an optional YAML file merged with `BELAY_`-prefixed
//! environment variables (nested fields split on `__`, so
//! `BELAY_AUTH__THROTTLE__MAX_ATTEMPTS=5` overrides
//! `auth.throttle.max_attempts`). The permission matrix is part of this
//! configuration: it is read once at startup and immutable afterwards.

use std::path::Path;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};
use crate::types::RoleLevel;

/// Top-level configuration for the auth subsystem.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub auth: AuthConfig,
}

impl Config {
    /// Load configuration from an optional YAML file plus environment
    /// overrides. Missing file means defaults + env only.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment
            .merge(Env::prefixed("BELAY_").split("__"))
            .extract()
            .map_err(|e| Error::Other(e.into()))
    }
}

/// Authentication and authorization settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Password validation rules and hashing cost
    pub password: PasswordConfig,
    /// Session cookie parameters handed to the host platform
    pub session: SessionConfig,
    /// Password reset token lifetime
    pub reset: ResetConfig,
    /// Remember-me token lifetime
    pub remember: RememberConfig,
    /// Failed-login throttling
    pub throttle: ThrottleConfig,
    /// Authorization engine settings
    pub authorization: AuthorizationConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            password: PasswordConfig::default(),
            session: SessionConfig::default(),
            reset: ResetConfig::default(),
            remember: RememberConfig::default(),
            throttle: ThrottleConfig::default(),
            authorization: AuthorizationConfig::default(),
        }
    }
}

/// Password validation rules.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PasswordConfig {
    /// Minimum password length
    pub min_length: usize,
    /// Maximum password length
    pub max_length: usize,
    /// Argon2 memory cost in KiB (default: 19456 KiB = 19 MB, secure for production)
    pub argon2_memory_kib: u32,
    /// Argon2 iterations (default: 2, secure for production)
    pub argon2_iterations: u32,
    /// Argon2 parallelism (default: 1)
    pub argon2_parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 128,
            argon2_memory_kib: 19456,
            argon2_iterations: 2,
            argon2_parallelism: 1,
        }
    }
}

/// Session cookie configuration.
///
/// The session store itself belongs to the host platform; these values
/// describe how the cookie carrying the session id should be issued.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Session timeout duration
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Cookie name for the session id
    pub cookie_name: String,
    /// Set Secure flag on cookies (HTTPS only)
    pub cookie_secure: bool,
    /// SameSite cookie attribute ("strict", "lax", or "none")
    pub cookie_same_site: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(24 * 60 * 60),
            cookie_name: "belay_session".to_string(),
            cookie_secure: true,
            cookie_same_site: "strict".to_string(),
        }
    }
}

/// Password reset token settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResetConfig {
    /// How long password reset tokens are valid. Values above one hour are
    /// clamped at issue time.
    #[serde(with = "humantime_serde")]
    pub token_duration: Duration,
}

impl ResetConfig {
    /// Hard ceiling on reset token lifetime.
    pub const MAX_TOKEN_DURATION: Duration = Duration::from_secs(60 * 60);
}

impl Default for ResetConfig {
    fn default() -> Self {
        Self {
            token_duration: Duration::from_secs(30 * 60),
        }
    }
}

/// Remember-me token settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RememberConfig {
    /// How long a remember-me token pair stays valid without rotation
    #[serde(with = "humantime_serde")]
    pub token_duration: Duration,
}

impl Default for RememberConfig {
    fn default() -> Self {
        Self {
            token_duration: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

/// Failed-login throttling settings (fixed window per identifier+origin).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThrottleConfig {
    /// Width of the counting window
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    /// Attempts allowed inside one window before rejection
    pub max_attempts: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(15 * 60),
            max_attempts: 10,
        }
    }
}

/// Authorization engine settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthorizationConfig {
    /// Answer denied requests with 404 instead of 403, hiding whether the
    /// resource exists from principals not allowed to see it.
    pub conceal_forbidden: bool,
    /// Permission rules replacing the built-in matrix. Empty means the
    /// built-in matrix is used.
    pub rules: Vec<RuleConfig>,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            conceal_forbidden: false,
            rules: Vec::new(),
        }
    }
}

/// One permission rule as written in configuration.
///
/// `pattern` is an exact path, or a prefix when it ends in `/*`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    pub level: RoleLevel,
    pub pattern: String,
    pub allow: bool,
}
