//! Error types for the taskbox-auth crate.
//!
//! Every operation in this crate reports [`AuthError`]. Token validation
//! keeps forged and expired tokens apart: the first is
//! [`AuthError::InvalidToken`], the second [`AuthError::TokenExpired`].

use chrono::{DateTime, Utc};

/// Unified error type for tokens, the authorization gate and passwords.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    // -- Token errors -------------------------------------------------------
    /// The token is malformed, was not issued with this key, or has been
    /// tampered with.
    #[error("invalid token: {reason}")]
    InvalidToken { reason: String },

    /// The token was genuine but its lifetime is over.
    #[error("token expired at {expired_at}")]
    TokenExpired { expired_at: DateTime<Utc> },

    /// The symmetric key does not have the required length.
    #[error("token key must be {expected} bytes, got {actual}")]
    InvalidKey { expected: usize, actual: usize },

    /// A token cannot be issued for an empty subject.
    #[error("token subject must not be empty")]
    EmptySubject,

    /// The requested lifetime cannot be represented.
    #[error("token lifetime out of range: {ttl:?}")]
    InvalidTtl { ttl: std::time::Duration },

    // -- Gate errors --------------------------------------------------------
    /// No token was presented.
    #[error("authentication required")]
    Unauthenticated,

    /// The presented identity does not own the resource.
    #[error("{subject} may not act on a {entity} owned by {owner}")]
    Forbidden {
        entity: &'static str,
        subject: String,
        owner: String,
    },

    // -- Password errors ----------------------------------------------------
    /// The plain password is shorter than the accepted minimum.
    #[error("password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    /// A stored password hash could not be parsed.
    #[error("malformed password hash: {reason}")]
    MalformedHash { reason: String },

    // -- Underlying errors --------------------------------------------------
    /// Encryption failed (ring internal error, RNG failure).
    #[error("encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    /// Decryption failed (wrong key, corrupted ciphertext, bad nonce).
    #[error("decryption failed: {reason}")]
    DecryptionFailed { reason: String },

    /// JSON serialization error while encoding a payload.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AuthError {
    pub(crate) fn invalid_token(reason: impl Into<String>) -> Self {
        Self::InvalidToken {
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, AuthError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
