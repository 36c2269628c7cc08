//! On-disk schema.
//!
//! The schema version is SQLite's `user_version` header field. Entry `n` of
//! [`UPGRADES`] takes a file from version `n` to `n + 1`; a fresh file is
//! version 0. A file written by a newer build (version above
//! [`SCHEMA_VERSION`]) is refused rather than guessed at.

use std::path::Path;

use rusqlite::{Connection, TransactionBehavior};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

/// Buckets and their entries. BLOB keys compare with `memcmp`, which gives
/// cursors their byte order.
const V1_BUCKETS: &str = "
    CREATE TABLE buckets (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        name       TEXT NOT NULL UNIQUE,
        created_at INTEGER NOT NULL
    );

    CREATE TABLE entries (
        bucket_id INTEGER NOT NULL REFERENCES buckets(id),
        key       BLOB NOT NULL,
        value     BLOB NOT NULL,
        PRIMARY KEY (bucket_id, key)
    ) WITHOUT ROWID;
";

const UPGRADES: &[&str] = &[V1_BUCKETS];

/// Schema version this build reads and writes.
pub const SCHEMA_VERSION: u32 = UPGRADES.len() as u32;

/// Bring the file behind `conn` up to [`SCHEMA_VERSION`].
///
/// Each step runs in its own immediate transaction together with the
/// version bump, so a failed step leaves the file at the previous version.
pub fn upgrade(conn: &mut Connection, path: &Path) -> StoreResult<u32> {
    let found = schema_version(conn)?;
    if found > SCHEMA_VERSION {
        tracing::error!(
            path = %path.display(),
            found,
            supported = SCHEMA_VERSION,
            "store was written by a newer version"
        );
        return Err(StoreError::Corrupt {
            path: path.to_path_buf(),
        });
    }
    if found == SCHEMA_VERSION {
        debug!(version = found, "store schema is current");
        return Ok(found);
    }

    for (step, sql) in UPGRADES.iter().enumerate().skip(found as usize) {
        let target = step as u32 + 1;
        let failed = |e: rusqlite::Error| StoreError::Migration {
            version: target,
            message: e.to_string(),
        };

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(failed)?;
        tx.execute_batch(sql).map_err(failed)?;
        tx.pragma_update(None, "user_version", target).map_err(failed)?;
        tx.commit().map_err(failed)?;
        info!(from = target - 1, to = target, "store schema upgraded");
    }
    Ok(SCHEMA_VERSION)
}

/// The version recorded in the file header.
pub fn schema_version(conn: &Connection) -> StoreResult<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}
