//! Password hashing, token minting and token digests.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::{Engine as _, engine::general_purpose};
use rand::{Rng, thread_rng};
use sha2::{Digest, Sha256};

use crate::config::PasswordConfig;
use crate::errors::Error;

/// Argon2 hashing parameters.
#[derive(Debug, Clone, Copy)]
pub struct Argon2Params {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Argon2Params {
    /// Create Argon2 instance with these parameters.
    fn to_argon2(self) -> Result<Argon2<'static>, Error> {
        let params = Params::new(self.memory_kib, self.iterations, self.parallelism, None).map_err(|e| Error::Internal {
            operation: format!("create argon2 params: {e}"),
        })?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

impl Default for Argon2Params {
    /// Secure defaults for production (Argon2id RFC recommendations)
    fn default() -> Self {
        Self {
            memory_kib: 19456, // 19 MB
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl From<&PasswordConfig> for Argon2Params {
    fn from(config: &PasswordConfig) -> Self {
        Self {
            memory_kib: config.argon2_memory_kib,
            iterations: config.argon2_iterations,
            parallelism: config.argon2_parallelism,
        }
    }
}

/// Hash a secret using Argon2id.
///
/// Uses the provided parameters or secure defaults if None.
pub fn hash_secret_with_params(input: &str, params: Option<Argon2Params>) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = params.unwrap_or_default().to_argon2()?;

    let hash = argon2.hash_password(input.as_bytes(), &salt).map_err(|e| Error::Internal {
        operation: format!("hash secret: {e}"),
    })?;

    Ok(hash.to_string())
}

/// Hash a secret using Argon2id with default secure parameters.
pub fn hash_secret(input: &str) -> Result<String, Error> {
    hash_secret_with_params(input, None)
}

/// Verify a secret against a hash.
///
/// Note: Verification uses the parameters embedded in the hash itself.
pub fn verify_secret(input: &str, hash: &str) -> Result<bool, Error> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| Error::Internal {
        operation: format!("parse hash: {e}"),
    })?;

    // Verification always uses params from the hash
    let argon2 = Argon2::default();
    Ok(argon2.verify_password(input.as_bytes(), &parsed_hash).is_ok())
}

/// Generate a secure random token (reset tokens, remember verifiers, CSRF).
///
/// 32 bytes (256 bits) of cryptographically secure random data, base64url
/// without padding.
pub fn generate_token() -> String {
    let mut token_bytes = [0u8; 32];
    thread_rng().fill(&mut token_bytes);

    general_purpose::URL_SAFE_NO_PAD.encode(token_bytes)
}

/// Generate a short random selector for remember-token lookup.
pub fn generate_selector() -> String {
    let mut selector_bytes = [0u8; 12];
    thread_rng().fill(&mut selector_bytes);

    general_purpose::URL_SAFE_NO_PAD.encode(selector_bytes)
}

/// Deterministic digest for token lookup at rest.
///
/// Single-use and remember tokens are stored as SHA-256 digests rather
/// than Argon2 hashes: the stored form must be an indexable lookup key,
/// and the 256-bit random input leaves nothing for an offline attacker to
/// grind through.
pub fn lookup_digest(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

/// Constant-time check of a presented token against its stored digest.
pub fn digest_matches(presented: &str, stored_digest: &str) -> bool {
    use subtle::ConstantTimeEq;
    bool::from(lookup_digest(presented).as_bytes().ct_eq(stored_digest.as_bytes()))
}
