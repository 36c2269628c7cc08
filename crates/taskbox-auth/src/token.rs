//! Stateless session tokens.
//!
//! A token is the JSON [`TokenPayload`] sealed with AES-256-GCM under the
//! process key, carried as
//!
//! ```text
//! v1.local.<base64url(nonce || ciphertext || tag)>
//! ```
//!
//! The `v1.local.` header is bound as associated data, so it cannot be
//! swapped without failing authentication. Nothing is stored server-side:
//! a token is valid exactly while its signature checks out and its expiry
//! has not passed. There is no revocation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::crypto::{self, KEY_LEN, NONCE_LEN_BYTES, TAG_LEN};
use crate::error::{AuthError, Result};

/// Version and purpose prefix of every token.
pub const TOKEN_HEADER: &str = "v1.local.";

/// Verified contents of a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    /// Unique per token, even for the same subject and instant.
    pub id: Uuid,
    /// Username the token was issued to.
    pub subject: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TokenPayload {
    /// Whether the token is past its expiry at `now`. A token is still valid
    /// at the exact instant of `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Issues and validates session tokens under one symmetric key.
pub struct TokenManager {
    key: [u8; KEY_LEN],
    clock: Arc<dyn Clock>,
}

impl TokenManager {
    /// Create a manager from raw key bytes, which must be exactly
    /// [`KEY_LEN`] long.
    pub fn new(key: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LEN] = key.try_into().map_err(|_| AuthError::InvalidKey {
            expected: KEY_LEN,
            actual: key.len(),
        })?;
        Ok(Self {
            key,
            clock: Arc::new(SystemClock),
        })
    }

    /// Create a manager from a configured secret string of exactly
    /// [`KEY_LEN`] bytes.
    pub fn from_secret(secret: &str) -> Result<Self> {
        Self::new(secret.as_bytes())
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Issue a token for `subject` that expires `ttl` from now.
    #[instrument(skip(self))]
    pub fn create_token(&self, subject: &str, ttl: Duration) -> Result<(String, TokenPayload)> {
        if subject.is_empty() {
            return Err(AuthError::EmptySubject);
        }
        let lifetime = chrono::Duration::from_std(ttl).map_err(|_| AuthError::InvalidTtl { ttl })?;
        let issued_at = self.clock.now();
        let expires_at = issued_at
            .checked_add_signed(lifetime)
            .ok_or(AuthError::InvalidTtl { ttl })?;

        let payload = TokenPayload {
            id: Uuid::now_v7(),
            subject: subject.to_string(),
            issued_at,
            expires_at,
        };

        let plaintext = serde_json::to_vec(&payload)?;
        let (nonce, sealed) = crypto::seal(&self.key, &plaintext, TOKEN_HEADER.as_bytes())?;

        let mut blob = Vec::with_capacity(NONCE_LEN_BYTES + sealed.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&sealed);
        let token = format!("{TOKEN_HEADER}{}", URL_SAFE_NO_PAD.encode(blob));

        debug!(token_id = %payload.id, %expires_at, "token issued");
        Ok((token, payload))
    }

    /// Authenticate and decrypt `token`.
    ///
    /// Fails with [`AuthError::InvalidToken`] when the token is malformed or
    /// was not produced by this key, and with [`AuthError::TokenExpired`]
    /// when it is genuine but past its expiry.
    pub fn validate_token(&self, token: &str) -> Result<TokenPayload> {
        let body = token
            .strip_prefix(TOKEN_HEADER)
            .ok_or_else(|| AuthError::invalid_token("unknown token header"))?;
        let blob = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|_| AuthError::invalid_token("token is not base64url"))?;
        if blob.len() < NONCE_LEN_BYTES + TAG_LEN {
            return Err(AuthError::invalid_token("token is truncated"));
        }

        let (nonce, sealed) = blob.split_at(NONCE_LEN_BYTES);
        let nonce: [u8; NONCE_LEN_BYTES] = nonce
            .try_into()
            .map_err(|_| AuthError::invalid_token("token is truncated"))?;
        let plaintext = crypto::open(&self.key, &nonce, sealed, TOKEN_HEADER.as_bytes())
            .map_err(|_| AuthError::invalid_token("authentication failed"))?;
        let payload: TokenPayload = serde_json::from_slice(&plaintext)
            .map_err(|_| AuthError::invalid_token("unreadable payload"))?;

        if payload.is_expired_at(self.clock.now()) {
            debug!(token_id = %payload.id, expired_at = %payload.expires_at, "expired token presented");
            return Err(AuthError::TokenExpired {
                expired_at: payload.expires_at,
            });
        }
        Ok(payload)
    }
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
