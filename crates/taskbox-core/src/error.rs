//! Error types for the taskbox-core crate.
//!
//! [`ServiceError`] is what callers of the service see. Storage and auth
//! errors are translated at the service boundary; internal details are
//! logged where they happen and never carried outward.

use taskbox_auth::AuthError;
use taskbox_store::RepoError;

/// Failures of a service operation.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Input failed validation.
    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The username exists but the password does not match.
    #[error("wrong password")]
    WrongPassword,

    /// The request carried no session token.
    #[error("not logged in")]
    Unauthenticated,

    /// The session token is malformed or forged.
    #[error("session token is invalid")]
    TokenInvalid,

    /// The session token was genuine but has expired.
    #[error("session has expired, log in again")]
    TokenExpired,

    /// The caller does not own the resource.
    #[error("not allowed to access this {entity}")]
    Forbidden { entity: &'static str },

    /// The storage deadline passed before the operation completed.
    #[error("operation timed out")]
    Timeout,

    /// Anything else. The cause has already been logged.
    #[error("internal error")]
    Internal,
}

impl ServiceError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::AlreadyExists { entity, id } => Self::AlreadyExists { entity, id },
            RepoError::NotFound { entity, id } => Self::NotFound { entity, id },
            RepoError::NotOwner { entity, .. } => Self::Forbidden { entity },
            RepoError::Timeout => Self::Timeout,
            // Logged by the repository.
            RepoError::Internal(_) => Self::Internal,
        }
    }
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidToken { .. } => Self::TokenInvalid,
            AuthError::TokenExpired { .. } => Self::TokenExpired,
            AuthError::Unauthenticated => Self::Unauthenticated,
            AuthError::Forbidden { entity, .. } => Self::Forbidden { entity },
            AuthError::PasswordTooShort { min } => {
                Self::invalid("password", format!("must be at least {min} characters"))
            }
            other => {
                tracing::error!(error = %other, "auth operation failed");
                Self::Internal
            }
        }
    }
}

/// Configuration loading and validation failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, ServiceError>;
