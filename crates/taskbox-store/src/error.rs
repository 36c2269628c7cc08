//! Error types for the taskbox-store crate.
//!
//! The key-value engine reports [`StoreError`]. The entity repositories
//! ([`UserStore`](crate::UserStore), [`TaskStore`](crate::TaskStore)) narrow
//! those down to [`RepoError`], which is the only error type their callers
//! ever see.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Alias for `Result<T, RepoError>`.
pub type RepoResult<T> = Result<T, RepoError>;

/// Errors that can occur in the key-value engine.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another handle (in this or another process) holds the store lock.
    #[error("store is locked by another handle: {path}")]
    Locked { path: PathBuf },

    /// The file exists but is not a valid store.
    #[error("store file is corrupt or not a database: {path}")]
    Corrupt { path: PathBuf },

    /// The store file could not be opened (permissions, missing directory, ...).
    #[error("failed to open store {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    /// The handle was closed.
    #[error("store is closed")]
    Closed,

    /// SQLite operation failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filesystem error outside of SQLite (lock file).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A schema migration failed.
    #[error("migration v{version} failed: {message}")]
    Migration { version: u32, message: String },

    /// The requested record was not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A record with the same key already exists.
    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    /// The record belongs to a different user.
    #[error("{entity} {id} is not owned by {user}")]
    NotOwner {
        entity: &'static str,
        id: String,
        user: String,
    },

    /// An invalid argument was provided to a store operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation did not finish before its deadline.
    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },

    /// A blocking task was cancelled or panicked.
    #[error("background task failed: {0}")]
    TaskJoin(String),
}

impl StoreError {
    /// Whether this error was raised while opening the store.
    pub fn is_open_error(&self) -> bool {
        matches!(
            self,
            Self::Locked { .. } | Self::Corrupt { .. } | Self::Open { .. }
        )
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}

/// Errors surfaced by the entity repositories.
///
/// Expected outcomes keep their own variants; anything else from the engine
/// is wrapped in [`RepoError::Internal`] so that engine details never leak
/// past the repository.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("{entity} already exists: {id}")]
    AlreadyExists { entity: &'static str, id: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} {id} is not owned by {user}")]
    NotOwner {
        entity: &'static str,
        id: String,
        user: String,
    },

    #[error("storage operation timed out")]
    Timeout,

    #[error("internal storage error")]
    Internal(#[source] StoreError),
}

impl RepoError {
    /// Translate an engine error, logging it when it is not an expected outcome.
    pub(crate) fn from_store(err: StoreError, operation: &'static str) -> Self {
        match err {
            StoreError::AlreadyExists { entity, id } => Self::AlreadyExists { entity, id },
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::NotOwner { entity, id, user } => Self::NotOwner { entity, id, user },
            StoreError::Timeout { elapsed, .. } => {
                tracing::warn!(operation, ?elapsed, "storage operation timed out");
                Self::Timeout
            }
            other => {
                tracing::error!(operation, error = %other, "storage operation failed");
                Self::Internal(other)
            }
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────
