//! # taskbox-store
//!
//! Embedded storage for taskbox.
//!
//! A single-file, bucketed key-value store with one writer and
//! snapshot-isolated readers, plus the repositories that map users and
//! tasks onto it.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  UserStore ("user")  TaskStore ("task") │
//! │  JSON records, RepoError boundary       │
//! ├─────────────────────────────────────────┤
//! │  ReadTxn / WriteTxn / Cursor            │
//! │  KvStore (file lock, writer, readers)   │
//! ├─────────────────────────────────────────┤
//! │  SQLite (rusqlite, WAL) + migrations    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use taskbox_store::{KvStore, UserStore, User};
//!
//! let db = KvStore::open("data/taskbox.db")?;
//! let users = UserStore::new(db.clone());
//! users.create(&User { username: "alice".into(), password: hash, email }).await?;
//! ```

pub mod db;
pub mod error;
pub mod migration;
pub mod model;
pub mod task_store;
pub mod txn;
pub mod user_store;

// ── re-exports ───────────────────────────────────────────────────────

pub use db::{BucketStats, KvStore, StoreOptions};
pub use error::{RepoError, RepoResult, StoreError, StoreResult};
pub use model::{Task, User};
pub use task_store::{TASK_BUCKET, TaskStore};
pub use txn::{Cursor, KeyValue, MAX_KEY_SIZE, ReadTxn, WriteTxn};
pub use user_store::{USER_BUCKET, UserStore};
