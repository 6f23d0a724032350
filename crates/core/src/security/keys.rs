//! Source credential generation and verification.
//!
//! API keys are bearer secrets handed to upstream emitters exactly once, at
//! source creation or rotation. Only a salted Argon2id hash is ever stored;
//! verification runs the full hash even when the source is unknown so every
//! rejection shares a timing class.

use argon2::{
    password_hash::{rand_core::OsRng as SaltRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Argon2, Params, Version,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};

use crate::{config::SecurityConfig, error::Result, Error};

/// Printable prefix carried by every issued API key.
pub const API_KEY_PREFIX: &str = "irm_";

/// Bytes of CSPRNG output behind the prefix (43 base64url chars).
const API_KEY_RANDOM_BYTES: usize = 32;

/// Generate a fresh high-entropy API key: `irm_` followed by 43 URL-safe
/// characters. The caller must hand the value to the operator immediately;
/// it is never persisted.
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; API_KEY_RANDOM_BYTES];
    OsRng.fill_bytes(&mut bytes);
    format!("{}{}", API_KEY_PREFIX, URL_SAFE_NO_PAD.encode(bytes))
}

#[derive(Clone)]
pub struct ApiKeyHasher {
    argon2: Argon2<'static>,
    /// Hash of a throwaway value, verified against when no real hash exists
    /// so unknown-source rejections take as long as bad-secret rejections.
    decoy_hash: String,
}

impl ApiKeyHasher {
    pub fn new(config: &SecurityConfig) -> Result<Self> {
        let params = Params::new(
            config.argon2_memory_cost,
            config.argon2_time_cost,
            config.argon2_parallelism,
            None,
        )
        .map_err(|e| Error::internal(format!("Invalid Argon2 parameters: {}", e)))?;

        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params);

        let salt = SaltString::generate(&mut SaltRng);
        let decoy_hash = argon2
            .hash_password(b"irm-decoy-credential", &salt)
            .map_err(|e| Error::internal(format!("Failed to derive decoy hash: {}", e)))?
            .to_string();

        Ok(Self { argon2, decoy_hash })
    }

    pub fn hash_key(&self, api_key: &str) -> Result<String> {
        let salt = SaltString::generate(&mut SaltRng);

        let hash = self
            .argon2
            .hash_password(api_key.as_bytes(), &salt)
            .map_err(|e| Error::internal(format!("Failed to hash API key: {}", e)))?;

        Ok(hash.to_string())
    }

    /// Verify a presented key against a stored hash. The comparison inside
    /// argon2 is constant-time with respect to the secret.
    pub fn verify_key(&self, api_key: &str, stored_hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(stored_hash)
            .map_err(|e| Error::internal(format!("Invalid API key hash format: {}", e)))?;

        match self.argon2.verify_password(api_key.as_bytes(), &parsed) {
            Ok(_) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(Error::internal(format!("API key verification error: {}", e))),
        }
    }

    /// Burn one verification against the decoy hash. Called on lookup misses
    /// to keep rejection timing uniform; the result is always `false`.
    pub fn verify_decoy(&self, api_key: &str) -> bool {
        if let Ok(parsed) = PasswordHash::new(&self.decoy_hash) {
            let _ = self.argon2.verify_password(api_key.as_bytes(), &parsed);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_hasher() -> ApiKeyHasher {
        let config = SecurityConfig {
            argon2_memory_cost: 8,
            argon2_time_cost: 1,
            argon2_parallelism: 1,
        };
        ApiKeyHasher::new(&config).unwrap()
    }

    #[test]
    fn generated_keys_have_prefix_and_entropy() {
        let key = generate_api_key();
        assert!(key.starts_with(API_KEY_PREFIX));
        let random_part = &key[API_KEY_PREFIX.len()..];
        assert!(random_part.len() >= 32);
        assert!(random_part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));

        // Two draws never collide
        assert_ne!(generate_api_key(), generate_api_key());
    }

    #[test]
    fn hash_and_verify_round_trip() {
        let hasher = test_hasher();
        let key = generate_api_key();

        let hash = hasher.hash_key(&key).unwrap();
        assert_ne!(hash, key);

        assert!(hasher.verify_key(&key, &hash).unwrap());
        assert!(!hasher.verify_key("irm_not-the-key", &hash).unwrap());
    }

    #[test]
    fn decoy_verification_always_rejects() {
        let hasher = test_hasher();
        assert!(!hasher.verify_decoy("irm_anything"));
        assert!(!hasher.verify_decoy(""));
    }
}
