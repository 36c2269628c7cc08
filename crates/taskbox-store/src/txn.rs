//! Bucket-scoped transactions and cursors.
//!
//! Both transaction types are scoped guards: the SQLite transaction ends
//! when the guard goes away. A [`WriteTxn`] that was not committed is rolled
//! back on drop, which also covers early returns and panics unwinding
//! through the caller.

use std::ops::Deref;
use std::time::Instant;

use parking_lot::{MappedMutexGuard, MutexGuard};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, trace, warn};

use crate::db::StoreInner;
use crate::error::{StoreError, StoreResult};

/// Largest accepted key, in bytes.
pub const MAX_KEY_SIZE: usize = 32 * 1024;

/// A key and its value.
pub type KeyValue = (Vec<u8>, Vec<u8>);

// ═══════════════════════════════════════════════════════════════════════
//  Read transactions
// ═══════════════════════════════════════════════════════════════════════

/// Pooled reader connection, returned to the pool on drop.
struct PooledReader<'s> {
    store: &'s StoreInner,
    conn: Option<Connection>,
}

impl Deref for PooledReader<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn
            .as_ref()
            .expect("reader connection is held until drop")
    }
}

impl Drop for PooledReader<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.store.checkin_reader(conn);
        }
    }
}

/// Read-only transaction on one bucket, pinned to the snapshot that was
/// current when it started.
pub struct ReadTxn<'s> {
    conn: PooledReader<'s>,
    bucket: String,
    bucket_id: Option<i64>,
}

impl<'s> ReadTxn<'s> {
    pub(crate) fn begin(store: &'s StoreInner, bucket: &str) -> StoreResult<Self> {
        validate_bucket_name(bucket)?;
        let conn = PooledReader {
            store,
            conn: Some(store.checkout_reader()?),
        };

        conn.execute_batch("BEGIN DEFERRED;")?;
        // The first read inside the transaction pins the snapshot.
        let bucket_id = match lookup_bucket(&conn, bucket) {
            Ok(id) => id,
            Err(err) => {
                let _ = conn.execute_batch("ROLLBACK;");
                return Err(err);
            }
        };

        trace!(bucket, exists = bucket_id.is_some(), "read transaction started");
        Ok(Self {
            conn,
            bucket: bucket.to_string(),
            bucket_id,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Whether the bucket existed when the snapshot was taken.
    pub fn bucket_exists(&self) -> bool {
        self.bucket_id.is_some()
    }

    /// Value stored under `key`, or `None` when absent.
    pub fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        fetch(&self.conn, self.bucket_id, key)
    }

    pub fn contains_key(&self, key: &[u8]) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Cursor over the bucket in ascending key order.
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::new(&self.conn, self.bucket_id)
    }
}

impl Drop for ReadTxn<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.conn.execute_batch("ROLLBACK;") {
            warn!(bucket = %self.bucket, %err, "ending read transaction failed");
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Write transactions
// ═══════════════════════════════════════════════════════════════════════

/// The single write transaction, scoped to one bucket.
///
/// Holding a `WriteTxn` holds the store's writer slot; other writers block
/// until it is committed, rolled back or dropped.
pub struct WriteTxn<'s> {
    conn: MappedMutexGuard<'s, Connection>,
    bucket: String,
    bucket_id: Option<i64>,
    finished: bool,
}

impl<'s> WriteTxn<'s> {
    pub(crate) fn begin(
        store: &'s StoreInner,
        bucket: &str,
        deadline: Option<Instant>,
    ) -> StoreResult<Self> {
        validate_bucket_name(bucket)?;
        store.ensure_open()?;

        let started = Instant::now();
        let guard = match deadline {
            None => store.writer.lock(),
            Some(deadline) => {
                store
                    .writer
                    .try_lock_until(deadline)
                    .ok_or(StoreError::Timeout {
                        operation: "begin_write",
                        elapsed: started.elapsed(),
                    })?
            }
        };
        let conn = MutexGuard::try_map(guard, |slot| slot.as_mut()).map_err(|_| StoreError::Closed)?;

        conn.execute_batch("BEGIN IMMEDIATE;")?;
        let bucket_id = match lookup_bucket(&conn, bucket) {
            Ok(id) => id,
            Err(err) => {
                let _ = conn.execute_batch("ROLLBACK;");
                return Err(err);
            }
        };

        trace!(bucket, waited = ?started.elapsed(), "write transaction started");
        Ok(Self {
            conn,
            bucket: bucket.to_string(),
            bucket_id,
            finished: false,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn bucket_exists(&self) -> bool {
        self.bucket_id.is_some()
    }

    /// Value stored under `key`, including writes made earlier in this
    /// transaction.
    pub fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        fetch(&self.conn, self.bucket_id, key)
    }

    pub fn contains_key(&self, key: &[u8]) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::new(&self.conn, self.bucket_id)
    }

    /// Insert or overwrite `key`. Creates the bucket on its first write.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        validate_key(key)?;
        let bucket_id = self.ensure_bucket()?;
        self.conn
            .prepare_cached(
                "INSERT INTO entries (bucket_id, key, value) VALUES (?1, ?2, ?3) \
                 ON CONFLICT (bucket_id, key) DO UPDATE SET value = excluded.value",
            )?
            .execute(rusqlite::params![bucket_id, key, value])?;
        Ok(())
    }

    /// Remove `key`, returning whether it was present.
    pub fn delete(&mut self, key: &[u8]) -> StoreResult<bool> {
        let Some(bucket_id) = self.bucket_id else {
            return Ok(false);
        };
        let removed = self
            .conn
            .prepare_cached("DELETE FROM entries WHERE bucket_id = ?1 AND key = ?2")?
            .execute(rusqlite::params![bucket_id, key])?;
        Ok(removed > 0)
    }

    /// Make every write of this transaction visible to later readers.
    ///
    /// A failed commit is rolled back; the store stays usable.
    pub fn commit(mut self) -> StoreResult<()> {
        self.finished = true;
        if let Err(err) = self.conn.execute_batch("COMMIT;") {
            warn!(bucket = %self.bucket, %err, "commit failed, rolling back");
            let _ = self.conn.execute_batch("ROLLBACK;");
            return Err(err.into());
        }
        trace!(bucket = %self.bucket, "write transaction committed");
        Ok(())
    }

    /// Discard every write of this transaction.
    pub fn rollback(mut self) -> StoreResult<()> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK;")?;
        debug!(bucket = %self.bucket, "write transaction rolled back");
        Ok(())
    }

    fn ensure_bucket(&mut self) -> StoreResult<i64> {
        if let Some(id) = self.bucket_id {
            return Ok(id);
        }
        self.conn.execute(
            "INSERT INTO buckets (name, created_at) VALUES (?1, ?2)",
            rusqlite::params![self.bucket, chrono::Utc::now().timestamp()],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(bucket = %self.bucket, id, "bucket created");
        self.bucket_id = Some(id);
        Ok(id)
    }
}

impl Drop for WriteTxn<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        match self.conn.execute_batch("ROLLBACK;") {
            Ok(()) => debug!(bucket = %self.bucket, "uncommitted write transaction rolled back"),
            Err(err) => warn!(bucket = %self.bucket, %err, "rollback on drop failed"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Cursor
// ═══════════════════════════════════════════════════════════════════════

enum Position {
    Unpositioned,
    At(Vec<u8>),
    Exhausted,
}

/// Ordered walk over one bucket within a transaction.
///
/// Keys come back in byte-lexicographic order. Each step is an indexed
/// lookup of the next key, so walking does not load the bucket into memory.
/// As an [`Iterator`] it starts at the first key unless positioned with
/// [`Cursor::seek`].
pub struct Cursor<'t> {
    conn: &'t Connection,
    bucket_id: Option<i64>,
    position: Position,
}

impl<'t> Cursor<'t> {
    fn new(conn: &'t Connection, bucket_id: Option<i64>) -> Self {
        Self {
            conn,
            bucket_id,
            position: Position::Unpositioned,
        }
    }

    /// Move to the first entry of the bucket.
    pub fn first(&mut self) -> StoreResult<Option<KeyValue>> {
        let found = self.query(
            "SELECT key, value FROM entries WHERE bucket_id = ?1 ORDER BY key LIMIT 1",
            None,
        )?;
        Ok(self.land(found))
    }

    /// Move to the first entry whose key is `>= key`.
    pub fn seek(&mut self, key: &[u8]) -> StoreResult<Option<KeyValue>> {
        let found = self.query(
            "SELECT key, value FROM entries WHERE bucket_id = ?1 AND key >= ?2 \
             ORDER BY key LIMIT 1",
            Some(key),
        )?;
        Ok(self.land(found))
    }

    fn advance(&mut self) -> StoreResult<Option<KeyValue>> {
        let after = match &self.position {
            Position::At(key) => Some(key.clone()),
            Position::Exhausted => return Ok(None),
            Position::Unpositioned => None,
        };
        let Some(after) = after else {
            return self.first();
        };
        let found = self.query(
            "SELECT key, value FROM entries WHERE bucket_id = ?1 AND key > ?2 \
             ORDER BY key LIMIT 1",
            Some(&after),
        )?;
        Ok(self.land(found))
    }

    fn land(&mut self, found: Option<KeyValue>) -> Option<KeyValue> {
        self.position = match &found {
            Some((key, _)) => Position::At(key.clone()),
            None => Position::Exhausted,
        };
        found
    }

    fn query(&self, sql: &str, bound: Option<&[u8]>) -> StoreResult<Option<KeyValue>> {
        let Some(bucket_id) = self.bucket_id else {
            return Ok(None);
        };
        let mut stmt = self.conn.prepare_cached(sql)?;
        let map = |row: &rusqlite::Row<'_>| -> rusqlite::Result<KeyValue> {
            Ok((row.get(0)?, row.get(1)?))
        };
        let found = match bound {
            Some(key) => stmt
                .query_row(rusqlite::params![bucket_id, key], map)
                .optional()?,
            None => stmt.query_row(rusqlite::params![bucket_id], map).optional()?,
        };
        Ok(found)
    }
}

impl Iterator for Cursor<'_> {
    type Item = StoreResult<KeyValue>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.advance() {
            Ok(found) => found.map(Ok),
            Err(err) => {
                self.position = Position::Exhausted;
                Some(Err(err))
            }
        }
    }
}

// ── helpers ──────────────────────────────────────────────────────────

fn lookup_bucket(conn: &Connection, name: &str) -> StoreResult<Option<i64>> {
    let id = conn
        .prepare_cached("SELECT id FROM buckets WHERE name = ?1")?
        .query_row(rusqlite::params![name], |row| row.get(0))
        .optional()?;
    Ok(id)
}

fn fetch(conn: &Connection, bucket_id: Option<i64>, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
    let Some(bucket_id) = bucket_id else {
        return Ok(None);
    };
    let value = conn
        .prepare_cached("SELECT value FROM entries WHERE bucket_id = ?1 AND key = ?2")?
        .query_row(rusqlite::params![bucket_id, key], |row| row.get(0))
        .optional()?;
    Ok(value)
}

fn validate_bucket_name(name: &str) -> StoreResult<()> {
    if name.is_empty() {
        return Err(StoreError::InvalidArgument(
            "bucket name must not be empty".into(),
        ));
    }
    Ok(())
}

fn validate_key(key: &[u8]) -> StoreResult<()> {
    if key.is_empty() {
        return Err(StoreError::InvalidArgument("key must not be empty".into()));
    }
    if key.len() > MAX_KEY_SIZE {
        return Err(StoreError::InvalidArgument(format!(
            "key is {} bytes, limit is {MAX_KEY_SIZE}",
            key.len()
        )));
    }
    Ok(())
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use crate::db::{KvStore, StoreOptions};
    use crate::error::StoreError;

    use super::*;

    fn temp_store() -> (tempfile::TempDir, KvStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(dir.path().join("app.db")).unwrap();
        (dir, store)
    }

    fn committed(store: &KvStore, bucket: &str, pairs: &[(&[u8], &[u8])]) {
        let mut txn = store.begin_write(bucket).unwrap();
        for (k, v) in pairs {
            txn.put(k, v).unwrap();
        }
        txn.commit().unwrap();
    }

    #[test]
    fn put_then_get() {
        let (_dir, store) = temp_store();
        committed(&store, "user", &[(b"alice", b"one")]);

        let txn = store.begin_read("user").unwrap();
        assert!(txn.bucket_exists());
        assert_eq!(txn.get(b"alice").unwrap().as_deref(), Some(&b"one"[..]));
        assert!(txn.get(b"bob").unwrap().is_none());
    }

    #[test]
    fn put_overwrites() {
        let (_dir, store) = temp_store();
        committed(&store, "user", &[(b"alice", b"one")]);
        committed(&store, "user", &[(b"alice", b"two")]);

        let txn = store.begin_read("user").unwrap();
        assert_eq!(txn.get(b"alice").unwrap().as_deref(), Some(&b"two"[..]));
    }

    #[test]
    fn absent_bucket_reads_as_empty() {
        let (_dir, store) = temp_store();
        let txn = store.begin_read("nothing-here").unwrap();
        assert!(!txn.bucket_exists());
        assert!(txn.get(b"k").unwrap().is_none());
        assert_eq!(txn.cursor().count(), 0);
    }

    #[test]
    fn buckets_are_independent() {
        let (_dir, store) = temp_store();
        committed(&store, "user", &[(b"same", b"user-value")]);
        committed(&store, "task", &[(b"same", b"task-value")]);

        let users = store.begin_read("user").unwrap();
        let tasks = store.begin_read("task").unwrap();
        assert_eq!(users.get(b"same").unwrap().as_deref(), Some(&b"user-value"[..]));
        assert_eq!(tasks.get(b"same").unwrap().as_deref(), Some(&b"task-value"[..]));
    }

    #[test]
    fn writes_are_visible_inside_their_transaction() {
        let (_dir, store) = temp_store();
        let mut txn = store.begin_write("user").unwrap();
        assert!(!txn.bucket_exists());
        txn.put(b"alice", b"v").unwrap();
        assert!(txn.bucket_exists());
        assert!(txn.contains_key(b"alice").unwrap());
        txn.rollback().unwrap();
    }

    #[test]
    fn rollback_discards_everything_including_the_bucket() {
        let (_dir, store) = temp_store();
        let mut txn = store.begin_write("user").unwrap();
        txn.put(b"alice", b"v").unwrap();
        txn.rollback().unwrap();

        let txn = store.begin_read("user").unwrap();
        assert!(!txn.bucket_exists());
        assert!(txn.get(b"alice").unwrap().is_none());
    }

    #[test]
    fn dropping_an_uncommitted_transaction_rolls_back() {
        let (_dir, store) = temp_store();
        {
            let mut txn = store.begin_write("user").unwrap();
            txn.put(b"alice", b"v").unwrap();
        }
        let txn = store.begin_read("user").unwrap();
        assert!(txn.get(b"alice").unwrap().is_none());
    }

    #[test]
    fn delete_reports_presence() {
        let (_dir, store) = temp_store();
        committed(&store, "user", &[(b"alice", b"v")]);

        let mut txn = store.begin_write("user").unwrap();
        assert!(txn.delete(b"alice").unwrap());
        assert!(!txn.delete(b"alice").unwrap());
        txn.commit().unwrap();

        let txn = store.begin_read("user").unwrap();
        assert!(txn.get(b"alice").unwrap().is_none());
    }

    #[test]
    fn empty_and_oversized_keys_are_rejected() {
        let (_dir, store) = temp_store();
        let mut txn = store.begin_write("user").unwrap();
        assert!(matches!(
            txn.put(b"", b"v"),
            Err(StoreError::InvalidArgument(_))
        ));
        let big = vec![b'k'; MAX_KEY_SIZE + 1];
        assert!(matches!(
            txn.put(&big, b"v"),
            Err(StoreError::InvalidArgument(_))
        ));
        let max = vec![b'k'; MAX_KEY_SIZE];
        txn.put(&max, b"v").unwrap();
    }

    #[test]
    fn failed_commit_is_rolled_back_and_store_stays_usable() {
        let (_dir, store) = temp_store();
        let mut txn = store.begin_write("user").unwrap();
        txn.put(b"alice", b"v").unwrap();
        // A dangling bucket reference only fails when COMMIT checks the
        // deferred foreign keys.
        txn.conn
            .execute_batch(
                "PRAGMA defer_foreign_keys = ON; \
                 INSERT INTO entries (bucket_id, key, value) VALUES (9999, x'01', x'01');",
            )
            .unwrap();

        let err = txn.commit().unwrap_err();
        assert!(matches!(err, StoreError::Sqlite(_)), "got: {err}");

        let reader = store.begin_read("user").unwrap();
        assert!(!reader.bucket_exists());
        assert!(reader.get(b"alice").unwrap().is_none());
        drop(reader);

        let mut txn = store.begin_write("user").unwrap();
        txn.put(b"alice", b"v2").unwrap();
        txn.commit().unwrap();
        let reader = store.begin_read("user").unwrap();
        assert_eq!(reader.get(b"alice").unwrap().as_deref(), Some(&b"v2"[..]));
    }

    #[test]
    fn cursor_walks_in_byte_order() {
        let (_dir, store) = temp_store();
        committed(
            &store,
            "task",
            &[
                (b"b", b"2"),
                (b"a", b"1"),
                (b"\xff", b"4"),
                (b"ab", b"1.5"),
                (b"B", b"0"),
            ],
        );

        let txn = store.begin_read("task").unwrap();
        let keys: Vec<Vec<u8>> = txn
            .cursor()
            .map(|entry| entry.unwrap().0)
            .collect();
        assert_eq!(
            keys,
            vec![
                b"B".to_vec(),
                b"a".to_vec(),
                b"ab".to_vec(),
                b"b".to_vec(),
                b"\xff".to_vec()
            ]
        );
    }

    #[test]
    fn cursor_first_and_seek() {
        let (_dir, store) = temp_store();
        committed(&store, "task", &[(b"apple", b"1"), (b"banana", b"2"), (b"cherry", b"3")]);

        let txn = store.begin_read("task").unwrap();
        let mut cursor = txn.cursor();
        assert_eq!(cursor.first().unwrap().unwrap().0, b"apple");

        let (key, value) = cursor.seek(b"b").unwrap().unwrap();
        assert_eq!(key, b"banana");
        assert_eq!(value, b"2");
        assert_eq!(cursor.next().unwrap().unwrap().0, b"cherry");
        assert!(cursor.next().is_none());

        assert!(cursor.seek(b"zzz").unwrap().is_none());
        assert!(cursor.next().is_none());
    }

    #[test]
    fn readers_keep_their_snapshot() {
        let (_dir, store) = temp_store();
        committed(&store, "user", &[(b"alice", b"v1")]);

        let readers: Vec<_> = (0..4).map(|_| store.begin_read("user").unwrap()).collect();

        let mut writer = store.begin_write("user").unwrap();
        writer.put(b"alice", b"v2").unwrap();
        writer.put(b"bobby", b"v1").unwrap();
        for reader in &readers {
            assert_eq!(reader.get(b"alice").unwrap().as_deref(), Some(&b"v1"[..]));
        }
        writer.commit().unwrap();

        for reader in &readers {
            assert_eq!(reader.get(b"alice").unwrap().as_deref(), Some(&b"v1"[..]));
            assert!(reader.get(b"bobby").unwrap().is_none());
            assert_eq!(reader.cursor().count(), 1);
        }
        drop(readers);

        let fresh = store.begin_read("user").unwrap();
        assert_eq!(fresh.get(b"alice").unwrap().as_deref(), Some(&b"v2"[..]));
        assert!(fresh.get(b"bobby").unwrap().is_some());
    }

    #[test]
    fn reader_started_before_bucket_creation_sees_no_bucket() {
        let (_dir, store) = temp_store();
        let reader = store.begin_read("user").unwrap();
        committed(&store, "user", &[(b"alice", b"v1")]);
        assert!(!reader.bucket_exists());
        assert!(reader.get(b"alice").unwrap().is_none());
    }

    #[test]
    fn writers_are_serialized() {
        let (_dir, store) = temp_store();
        let first_committed = Arc::new(AtomicBool::new(false));

        std::thread::scope(|scope| {
            let mut first = store.begin_write("user").unwrap();
            first.put(b"k", b"first").unwrap();

            let flag = Arc::clone(&first_committed);
            let store_ref = &store;
            let second = scope.spawn(move || {
                let mut txn = store_ref.begin_write("user").unwrap();
                assert!(flag.load(Ordering::SeqCst), "second writer ran early");
                assert_eq!(txn.get(b"k").unwrap().as_deref(), Some(&b"first"[..]));
                txn.put(b"k", b"second").unwrap();
                txn.commit().unwrap();
            });

            std::thread::sleep(Duration::from_millis(50));
            first_committed.store(true, Ordering::SeqCst);
            first.commit().unwrap();
            second.join().unwrap();
        });

        let txn = store.begin_read("user").unwrap();
        assert_eq!(txn.get(b"k").unwrap().as_deref(), Some(&b"second"[..]));
    }

    #[test]
    fn begin_write_until_times_out_while_writer_busy() {
        let (_dir, store) = temp_store();
        let _held = store.begin_write("user").unwrap();

        std::thread::scope(|scope| {
            let store_ref = &store;
            let waiter = scope.spawn(move || {
                store_ref
                    .begin_write_until("user", Instant::now() + Duration::from_millis(50))
                    .err()
            });
            let err = waiter.join().unwrap().unwrap();
            assert!(matches!(
                err,
                StoreError::Timeout {
                    operation: "begin_write",
                    ..
                }
            ));
        });
    }

    #[tokio::test]
    async fn run_write_rolls_back_on_error() {
        let (_dir, store) = temp_store();
        let result: StoreResult<()> = store
            .run_write("user", |txn| {
                txn.put(b"alice", b"v")?;
                Err(StoreError::AlreadyExists {
                    entity: "user",
                    id: "alice".into(),
                })
            })
            .await;
        assert!(matches!(result, Err(StoreError::AlreadyExists { .. })));

        let found = store
            .run_read("user", |txn| txn.get(b"alice"))
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn run_write_rolls_back_on_panic() {
        let (_dir, store) = temp_store();
        let result: StoreResult<()> = store
            .run_write("user", |txn| {
                txn.put(b"alice", b"v")?;
                panic!("handler blew up");
            })
            .await;
        assert!(matches!(result, Err(StoreError::TaskJoin(_))));

        let found = store
            .run_read("user", |txn| txn.get(b"alice"))
            .await
            .unwrap();
        assert!(found.is_none());

        // The writer slot was released by the unwind.
        store
            .run_write("user", |txn| txn.put(b"bobby", b"v"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn run_write_past_deadline_is_rolled_back() {
        let dir = tempfile::tempdir().unwrap();
        let options = StoreOptions {
            op_timeout: Duration::from_millis(30),
            ..StoreOptions::default()
        };
        let store = KvStore::open_with(dir.path().join("app.db"), options).unwrap();

        let result = store
            .run_write("user", |txn| {
                txn.put(b"alice", b"v")?;
                std::thread::sleep(Duration::from_millis(80));
                Ok(())
            })
            .await;
        assert!(matches!(
            result,
            Err(StoreError::Timeout {
                operation: "write",
                ..
            })
        ));

        let txn = store.begin_read("user").unwrap();
        assert!(txn.get(b"alice").unwrap().is_none());
    }
}
