//! Store handle: file lock, connections and transaction entry points.
//!
//! A [`KvStore`] owns one SQLite file in WAL mode. Writes go through a single
//! writer connection behind a mutex, so at most one write transaction is in
//! flight and concurrent writers queue up behind it. Reads use pooled
//! connections that each pin a WAL snapshot when their transaction starts,
//! so readers never wait for the writer and never see uncommitted pages.
//!
//! The async helpers ([`KvStore::run_read`], [`KvStore::run_write`]) dispatch
//! onto the blocking pool via `tokio::task::spawn_blocking` and bound every
//! transaction with a deadline.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use fs4::FileExt;
use parking_lot::Mutex;
use rusqlite::{Connection, ErrorCode};
use tracing::{debug, info, instrument, warn};

use crate::error::{StoreError, StoreResult};
use crate::migration;
use crate::txn::{ReadTxn, WriteTxn};

/// How often a contended file lock is retried while `lock_timeout` runs.
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(25);

/// Tunables for [`KvStore::open`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Deadline applied by [`KvStore::run_read`] and [`KvStore::run_write`].
    pub op_timeout: Duration,
    /// How long `open` waits for a lock held elsewhere. `None` fails at once.
    pub lock_timeout: Option<Duration>,
    /// Idle reader connections kept for reuse.
    pub max_idle_readers: usize,
    /// SQLite busy timeout for every connection.
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            op_timeout: Duration::from_secs(5),
            lock_timeout: None,
            max_idle_readers: 8,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// Entry count of a single bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketStats {
    pub name: String,
    pub entries: u64,
}

/// Thread-safe, cloneable handle to an open store.
///
/// All clones share the same file lock and connections. The store is closed
/// by [`KvStore::close`] or when the last clone is dropped.
#[derive(Clone)]
pub struct KvStore {
    inner: Arc<StoreInner>,
}

pub(crate) struct StoreInner {
    path: PathBuf,
    options: StoreOptions,
    pub(crate) writer: Mutex<Option<Connection>>,
    readers: Mutex<ReaderPool>,
    closed: AtomicBool,
}

/// Reader connections and the file lock.
///
/// The lock lives here because it must outlast every reader connection:
/// after `close` it is released by whichever of `close` or the last
/// checked-in reader finishes second.
struct ReaderPool {
    idle: Vec<Connection>,
    /// Connections currently checked out.
    live: usize,
    lock_file: Option<File>,
    writer_closed: bool,
}

impl ReaderPool {
    fn release_lock_if_unused(&mut self, path: &Path) {
        if self.writer_closed && self.live == 0 && self.lock_file.take().is_some() {
            debug!(path = %path.display(), "store lock released");
        }
    }
}

impl KvStore {
    /// Open (or create) the store at `path` with default options.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        Self::open_with(path, StoreOptions::default())
    }

    /// Open (or create) the store at `path`.
    ///
    /// Fails with [`StoreError::Locked`] when another handle holds the file,
    /// [`StoreError::Corrupt`] when the file is not a store, and
    /// [`StoreError::Open`] when it cannot be opened at all. This call does
    /// blocking file I/O; run it during startup.
    pub fn open_with(path: impl AsRef<Path>, options: StoreOptions) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        info!(path = %path.display(), "opening store");

        let lock_file = acquire_file_lock(&path, options.lock_timeout)?;

        let mut conn = open_connection(&path, &options)?;
        apply_writer_pragmas(&conn).map_err(|e| classify_open_error(&path, e))?;
        migration::upgrade(&mut conn, &path)?;

        info!(path = %path.display(), "store opened");
        Ok(Self {
            inner: Arc::new(StoreInner {
                path,
                options,
                writer: Mutex::new(Some(conn)),
                readers: Mutex::new(ReaderPool {
                    idle: Vec::new(),
                    live: 0,
                    lock_file: Some(lock_file),
                    writer_closed: false,
                }),
                closed: AtomicBool::new(false),
            }),
        })
    }

    /// Path of the store file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Flush the WAL into the main file, drop every connection and release
    /// the file lock. Waits for an in-flight write transaction to finish.
    /// Read transactions still open keep working; the file lock is held
    /// until the last of them ends. Calling it again is a no-op.
    pub fn close(&self) -> StoreResult<()> {
        self.inner.close()
    }

    /// Start a read-only transaction on `bucket`.
    ///
    /// The snapshot is fixed before this returns. The bucket does not need
    /// to exist; reads from an absent bucket find nothing.
    pub fn begin_read(&self, bucket: &str) -> StoreResult<ReadTxn<'_>> {
        ReadTxn::begin(&self.inner, bucket)
    }

    /// Start the write transaction on `bucket`, blocking while another
    /// writer is in flight.
    pub fn begin_write(&self, bucket: &str) -> StoreResult<WriteTxn<'_>> {
        WriteTxn::begin(&self.inner, bucket, None)
    }

    /// Like [`KvStore::begin_write`], but gives up with
    /// [`StoreError::Timeout`] once `deadline` passes.
    pub fn begin_write_until(&self, bucket: &str, deadline: Instant) -> StoreResult<WriteTxn<'_>> {
        WriteTxn::begin(&self.inner, bucket, Some(deadline))
    }

    /// Run `f` inside a read transaction on the blocking pool, bounded by
    /// [`StoreOptions::op_timeout`].
    pub async fn run_read<F, T>(&self, bucket: &str, f: F) -> StoreResult<T>
    where
        F: FnOnce(&ReadTxn<'_>) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let deadline = Instant::now() + self.inner.options.op_timeout;
        self.run_read_until(bucket, deadline, f).await
    }

    /// Run `f` inside a read transaction that must finish before `deadline`.
    pub async fn run_read_until<F, T>(&self, bucket: &str, deadline: Instant, f: F) -> StoreResult<T>
    where
        F: FnOnce(&ReadTxn<'_>) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let bucket = bucket.to_string();
        let started = Instant::now();
        tokio::task::spawn_blocking(move || {
            let txn = ReadTxn::begin(&inner, &bucket)?;
            let value = f(&txn)?;
            if Instant::now() > deadline {
                return Err(StoreError::Timeout {
                    operation: "read",
                    elapsed: started.elapsed(),
                });
            }
            Ok(value)
        })
        .await?
    }

    /// Run `f` inside the write transaction on the blocking pool, bounded by
    /// [`StoreOptions::op_timeout`].
    ///
    /// Commits when `f` returns `Ok`. Rolls back when `f` returns an error,
    /// panics, or finishes after the deadline.
    pub async fn run_write<F, T>(&self, bucket: &str, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut WriteTxn<'_>) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let deadline = Instant::now() + self.inner.options.op_timeout;
        self.run_write_until(bucket, deadline, f).await
    }

    /// Run `f` inside the write transaction, which must commit before
    /// `deadline`.
    pub async fn run_write_until<F, T>(
        &self,
        bucket: &str,
        deadline: Instant,
        f: F,
    ) -> StoreResult<T>
    where
        F: FnOnce(&mut WriteTxn<'_>) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let bucket = bucket.to_string();
        let started = Instant::now();
        tokio::task::spawn_blocking(move || {
            let mut txn = WriteTxn::begin(&inner, &bucket, Some(deadline))?;
            let value = f(&mut txn)?;
            if Instant::now() > deadline {
                txn.rollback()?;
                return Err(StoreError::Timeout {
                    operation: "write",
                    elapsed: started.elapsed(),
                });
            }
            txn.commit()?;
            Ok(value)
        })
        .await?
    }

    /// List every bucket with its number of entries, ordered by name.
    #[instrument(skip(self))]
    pub async fn bucket_stats(&self) -> StoreResult<Vec<BucketStats>> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let conn = inner.checkout_reader()?;
            let stats = (|| -> StoreResult<Vec<BucketStats>> {
                let mut stmt = conn.prepare(
                    "SELECT b.name, COUNT(e.key) FROM buckets b \
                     LEFT JOIN entries e ON e.bucket_id = b.id \
                     GROUP BY b.id ORDER BY b.name",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(BucketStats {
                            name: row.get(0)?,
                            entries: row.get::<_, i64>(1)?.max(0) as u64,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })();
            inner.checkin_reader(conn);
            stats
        })
        .await?
    }
}

impl StoreInner {
    pub(crate) fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    /// Take an idle reader connection or open a new one.
    pub(crate) fn checkout_reader(&self) -> StoreResult<Connection> {
        let mut pool = self.readers.lock();
        self.ensure_open()?;
        let conn = match pool.idle.pop() {
            Some(conn) => conn,
            None => {
                debug!(path = %self.path.display(), "opening reader connection");
                let conn = open_connection(&self.path, &self.options)?;
                conn.pragma_update(None, "query_only", "ON")?;
                conn
            }
        };
        pool.live += 1;
        Ok(conn)
    }

    /// Return a reader connection to the idle pool, or drop it when the pool
    /// is full or the store is closed.
    pub(crate) fn checkin_reader(&self, conn: Connection) {
        let mut pool = self.readers.lock();
        pool.live -= 1;
        if self.closed.load(Ordering::Acquire) {
            drop(conn);
            pool.release_lock_if_unused(&self.path);
            return;
        }
        if pool.idle.len() < self.options.max_idle_readers {
            pool.idle.push(conn);
        }
    }

    fn close(&self) -> StoreResult<()> {
        let live_readers = {
            let mut pool = self.readers.lock();
            if self.closed.swap(true, Ordering::AcqRel) {
                debug!(path = %self.path.display(), "store already closed");
                return Ok(());
            }
            pool.idle.clear();
            pool.live
        };

        // A full checkpoint would wait on the open readers' snapshots.
        let checkpoint = if live_readers == 0 {
            "PRAGMA wal_checkpoint(TRUNCATE)"
        } else {
            "PRAGMA wal_checkpoint(PASSIVE)"
        };

        let mut result = Ok(());
        if let Some(conn) = self.writer.lock().take() {
            if let Err(err) = conn.query_row(checkpoint, [], |_| Ok(())) {
                warn!(%err, "wal checkpoint on close failed");
                result = Err(err.into());
            }
            if let Err((_, err)) = conn.close() {
                warn!(%err, "closing writer connection failed");
                result = Err(err.into());
            }
        }

        let mut pool = self.readers.lock();
        pool.writer_closed = true;
        pool.release_lock_if_unused(&self.path);
        if pool.live > 0 {
            debug!(live = pool.live, "store lock held until open readers finish");
        }

        info!(path = %self.path.display(), "store closed");
        result
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(%err, "error while closing store on drop");
        }
    }
}

// ── file lock ────────────────────────────────────────────────────────

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

fn acquire_file_lock(path: &Path, timeout: Option<Duration>) -> StoreResult<File> {
    let lock_path = lock_path_for(path);
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)
        .map_err(|e| StoreError::Open {
            path: path.to_path_buf(),
            reason: format!("cannot open lock file {}: {e}", lock_path.display()),
        })?;

    let deadline = timeout.map(|t| Instant::now() + t);
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => {
                debug!(lock = %lock_path.display(), "store lock acquired");
                return Ok(file);
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => match deadline {
                Some(deadline) if Instant::now() < deadline => {
                    std::thread::sleep(LOCK_RETRY_INTERVAL);
                }
                _ => {
                    warn!(path = %path.display(), "store is locked by another handle");
                    return Err(StoreError::Locked {
                        path: path.to_path_buf(),
                    });
                }
            },
            Err(err) => return Err(StoreError::Io(err)),
        }
    }
}

// ── connections ──────────────────────────────────────────────────────

fn open_connection(path: &Path, options: &StoreOptions) -> StoreResult<Connection> {
    let conn = Connection::open(path).map_err(|e| classify_open_error(path, e))?;
    conn.busy_timeout(options.busy_timeout)?;
    Ok(conn)
}

/// Pragmas for the writer connection. `journal_mode` is persistent in the
/// file, so reader connections pick up WAL without setting it again.
fn apply_writer_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    debug!("applying SQLite pragmas");

    // WAL mode: readers keep their snapshot while the writer commits.
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // FULL: every commit is fsynced before it returns.
    conn.pragma_update(None, "synchronous", "FULL")?;

    conn.pragma_update(None, "foreign_keys", "ON")?;

    // Temp tables and indices in memory, not on disk.
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    Ok(())
}

fn classify_open_error(path: &Path, err: rusqlite::Error) -> StoreError {
    let path = path.to_path_buf();
    match &err {
        rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
            ErrorCode::NotADatabase => StoreError::Corrupt { path },
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => StoreError::Locked { path },
            _ => StoreError::Open {
                path,
                reason: err.to_string(),
            },
        },
        _ => StoreError::Open {
            path,
            reason: err.to_string(),
        },
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, KvStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(dir.path().join("app.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn open_creates_file_and_lock() {
        let (dir, store) = temp_store();
        assert!(dir.path().join("app.db").exists());
        assert!(dir.path().join("app.db.lock").exists());
        assert!(!store.is_closed());
    }

    #[test]
    fn second_open_fails_while_locked() {
        let (dir, _store) = temp_store();
        let err = KvStore::open(dir.path().join("app.db")).err().unwrap();
        assert!(matches!(err, StoreError::Locked { .. }), "got: {err}");
        assert!(err.is_open_error());
    }

    #[test]
    fn lock_timeout_still_fails_when_lock_is_held() {
        let (dir, _store) = temp_store();
        let options = StoreOptions {
            lock_timeout: Some(Duration::from_millis(100)),
            ..StoreOptions::default()
        };
        let started = Instant::now();
        let err = KvStore::open_with(dir.path().join("app.db"), options)
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::Locked { .. }));
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn reopen_after_close() {
        let (dir, store) = temp_store();
        store.close().unwrap();
        let reopened = KvStore::open(dir.path().join("app.db")).unwrap();
        assert!(!reopened.is_closed());
    }

    #[test]
    fn reopen_after_drop() {
        let (dir, store) = temp_store();
        drop(store);
        KvStore::open(dir.path().join("app.db")).unwrap();
    }

    #[test]
    fn close_is_idempotent() {
        let (_dir, store) = temp_store();
        store.close().unwrap();
        store.close().unwrap();
        assert!(store.is_closed());
    }

    #[test]
    fn close_with_open_reader_keeps_the_file_locked() {
        let (dir, store) = temp_store();
        let path = dir.path().join("app.db");
        let mut txn = store.begin_write("user").unwrap();
        txn.put(b"alice", b"v1").unwrap();
        txn.commit().unwrap();

        let reader = store.begin_read("user").unwrap();
        let started = Instant::now();
        store.close().unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));

        let err = KvStore::open(&path).err().unwrap();
        assert!(matches!(err, StoreError::Locked { .. }), "got: {err}");
        assert_eq!(reader.get(b"alice").unwrap().as_deref(), Some(&b"v1"[..]));

        drop(reader);
        let reopened = KvStore::open(&path).unwrap();
        let txn = reopened.begin_read("user").unwrap();
        assert_eq!(txn.get(b"alice").unwrap().as_deref(), Some(&b"v1"[..]));
    }

    #[test]
    fn operations_after_close_fail() {
        let (_dir, store) = temp_store();
        store.close().unwrap();
        assert!(matches!(store.begin_read("user"), Err(StoreError::Closed)));
        assert!(matches!(store.begin_write("user"), Err(StoreError::Closed)));
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.db");
        std::fs::write(&path, vec![0xAB_u8; 4096]).unwrap();

        let err = KvStore::open(&path).err().unwrap();
        assert!(matches!(err, StoreError::Corrupt { .. }), "got: {err}");
    }

    #[test]
    fn file_from_a_newer_build_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.pragma_update(None, "user_version", migration::SCHEMA_VERSION + 1)
                .unwrap();
        }

        let err = KvStore::open(&path).err().unwrap();
        assert!(matches!(err, StoreError::Corrupt { .. }), "got: {err}");
        assert!(err.is_open_error());
    }

    #[test]
    fn missing_directory_is_an_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no-such-dir").join("app.db");

        let err = KvStore::open(&path).err().unwrap();
        assert!(matches!(err, StoreError::Open { .. }), "got: {err}");
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");
        {
            let store = KvStore::open(&path).unwrap();
            let mut txn = store.begin_write("user").unwrap();
            txn.put(b"alice", b"{}").unwrap();
            txn.commit().unwrap();
            store.close().unwrap();
        }
        let store = KvStore::open(&path).unwrap();
        let txn = store.begin_read("user").unwrap();
        assert_eq!(txn.get(b"alice").unwrap().as_deref(), Some(&b"{}"[..]));
    }

    #[tokio::test]
    async fn bucket_stats_counts_entries() {
        let (_dir, store) = temp_store();
        store
            .run_write("user", |txn| {
                txn.put(b"alice", b"1")?;
                txn.put(b"bobby", b"2")?;
                Ok(())
            })
            .await
            .unwrap();
        store
            .run_write("task", |txn| txn.put(b"t1", b"x"))
            .await
            .unwrap();

        let stats = store.bucket_stats().await.unwrap();
        assert_eq!(
            stats,
            vec![
                BucketStats {
                    name: "task".into(),
                    entries: 1
                },
                BucketStats {
                    name: "user".into(),
                    entries: 2
                },
            ]
        );
    }
}
