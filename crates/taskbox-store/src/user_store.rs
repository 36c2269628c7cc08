//! User accounts, keyed by username in the `user` bucket.

use tracing::{debug, instrument};

use crate::db::KvStore;
use crate::error::{RepoError, RepoResult, StoreError};
use crate::model::User;

/// Bucket holding every [`User`].
pub const USER_BUCKET: &str = "user";

/// Create and look up user accounts.
#[derive(Clone)]
pub struct UserStore {
    db: KvStore,
}

impl UserStore {
    /// Create a new user store backed by `db`.
    pub fn new(db: KvStore) -> Self {
        Self { db }
    }

    /// Store a new account.
    ///
    /// The existence check and the insert run in one write transaction, so
    /// two concurrent registrations of the same username cannot both win.
    /// Fails with [`RepoError::AlreadyExists`] and leaves the stored record
    /// untouched when the username is taken.
    #[instrument(skip(self, user), fields(username = %user.username))]
    pub async fn create(&self, user: &User) -> RepoResult<()> {
        let user = user.clone();
        self.db
            .run_write(USER_BUCKET, move |txn| {
                let key = user.username.as_bytes();
                if txn.contains_key(key)? {
                    return Err(StoreError::AlreadyExists {
                        entity: "user",
                        id: user.username.clone(),
                    });
                }
                txn.put(key, &serde_json::to_vec(&user)?)
            })
            .await
            .map_err(|e| RepoError::from_store(e, "create_user"))?;

        debug!("user created");
        Ok(())
    }

    /// Fetch the account for `username`.
    ///
    /// An unknown username and a store with no users yet are both
    /// [`RepoError::NotFound`].
    #[instrument(skip(self))]
    pub async fn get(&self, username: &str) -> RepoResult<User> {
        let username = username.to_string();
        self.db
            .run_read(USER_BUCKET, move |txn| {
                let bytes = txn
                    .get(username.as_bytes())?
                    .ok_or_else(|| StoreError::NotFound {
                        entity: "user",
                        id: username.clone(),
                    })?;
                Ok(serde_json::from_slice(&bytes)?)
            })
            .await
            .map_err(|e| RepoError::from_store(e, "get_user"))
    }
}

// ── tests ────────────────────────────────────────────────────────────
