//! Entity records persisted by the repositories.
//!
//! Both records are stored as JSON. Field names are part of the on-disk
//! format, so renaming a field here is a format change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered account, keyed by `username` in the `user` bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    /// Password hash, never the plain password.
    pub password: String,
    pub email: String,
}

/// A task, keyed by its hyphenated `id` in the `task` bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    /// Username of the owner.
    pub user: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// A fresh task whose `created_at` and `updated_at` are both `now`.
    pub fn new(
        id: Uuid,
        title: impl Into<String>,
        user: impl Into<String>,
        text: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            user: user.into(),
            text: text.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, username: &str) -> bool {
        self.user == username
    }
}
