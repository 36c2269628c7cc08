//! Password hashing.
//!
//! Hashes are PBKDF2-HMAC-SHA256 (ring) stored as
//! `base64(salt):base64(hash)`. Verification is constant-time.

use std::num::NonZeroU32;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{AuthError, Result};

/// Shortest accepted password, in characters.
pub const MIN_PASSWORD_LEN: usize = 5;

/// PBKDF2-HMAC-SHA256 with 600,000 iterations (OWASP 2023).
pub const DEFAULT_ITERATIONS: u32 = 600_000;

const SALT_LEN: usize = 32;
const HASH_LEN: usize = 32;

static PBKDF2_ALG: &pbkdf2::Algorithm = &pbkdf2::PBKDF2_HMAC_SHA256;

/// Turns plain passwords into storable hashes and checks them later.
pub trait PasswordHasher: Send + Sync {
    /// Hash `plain`. Fails with [`AuthError::PasswordTooShort`] below
    /// [`MIN_PASSWORD_LEN`] characters.
    fn hash(&self, plain: &str) -> Result<String>;

    /// Whether `plain` matches the stored `hash`.
    fn verify(&self, hash: &str, plain: &str) -> Result<bool>;
}

/// PBKDF2-HMAC-SHA256 hasher.
#[derive(Debug, Clone)]
pub struct Pbkdf2Hasher {
    iterations: NonZeroU32,
}

impl Pbkdf2Hasher {
    /// A hasher with a custom iteration count, clamped to at least one.
    pub fn with_iterations(iterations: u32) -> Self {
        Self {
            iterations: NonZeroU32::new(iterations).unwrap_or(NonZeroU32::MIN),
        }
    }
}

impl Default for Pbkdf2Hasher {
    fn default() -> Self {
        Self::with_iterations(DEFAULT_ITERATIONS)
    }
}

impl PasswordHasher for Pbkdf2Hasher {
    fn hash(&self, plain: &str) -> Result<String> {
        if plain.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::PasswordTooShort {
                min: MIN_PASSWORD_LEN,
            });
        }

        let mut salt = [0u8; SALT_LEN];
        SystemRandom::new()
            .fill(&mut salt)
            .map_err(|_| AuthError::EncryptionFailed {
                reason: "failed to generate random salt".into(),
            })?;

        let mut hash = [0u8; HASH_LEN];
        pbkdf2::derive(*PBKDF2_ALG, self.iterations, &salt, plain.as_bytes(), &mut hash);

        Ok(format!("{}:{}", BASE64.encode(salt), BASE64.encode(hash)))
    }

    fn verify(&self, hash: &str, plain: &str) -> Result<bool> {
        let (salt, expected) = hash.split_once(':').ok_or_else(|| AuthError::MalformedHash {
            reason: "missing salt separator".into(),
        })?;
        let salt = BASE64.decode(salt).map_err(|e| AuthError::MalformedHash {
            reason: format!("invalid salt encoding: {e}"),
        })?;
        let expected = BASE64.decode(expected).map_err(|e| AuthError::MalformedHash {
            reason: format!("invalid hash encoding: {e}"),
        })?;

        Ok(pbkdf2::verify(*PBKDF2_ALG, self.iterations, &salt, plain.as_bytes(), &expected).is_ok())
    }
}
