//! Tasks, keyed by hyphenated id in the `task` bucket.
//!
//! Updates and deletes are read-check-write sequences inside a single write
//! transaction: the record is read, its owner compared with the caller, and
//! the result written back before any other writer can run.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::db::KvStore;
use crate::error::{RepoError, RepoResult, StoreError, StoreResult};
use crate::model::Task;
use crate::txn::WriteTxn;

/// Bucket holding every [`Task`].
pub const TASK_BUCKET: &str = "task";

/// CRUD operations on tasks.
#[derive(Clone)]
pub struct TaskStore {
    db: KvStore,
}

impl TaskStore {
    /// Create a new task store backed by `db`.
    pub fn new(db: KvStore) -> Self {
        Self { db }
    }

    /// Store a new task under its id.
    ///
    /// Fails with [`RepoError::AlreadyExists`] when the id is already taken.
    #[instrument(skip(self, task), fields(task_id = %task.id, user = %task.user))]
    pub async fn create(&self, task: &Task) -> RepoResult<()> {
        let task = task.clone();
        self.db
            .run_write(TASK_BUCKET, move |txn| {
                let key = task_key(&task.id);
                if txn.contains_key(key.as_bytes())? {
                    return Err(StoreError::AlreadyExists {
                        entity: "task",
                        id: key,
                    });
                }
                txn.put(key.as_bytes(), &serde_json::to_vec(&task)?)
            })
            .await
            .map_err(|e| RepoError::from_store(e, "create_task"))?;

        debug!("task created");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn get(&self, id: Uuid) -> RepoResult<Task> {
        self.db
            .run_read(TASK_BUCKET, move |txn| {
                let key = task_key(&id);
                let bytes = txn
                    .get(key.as_bytes())?
                    .ok_or(StoreError::NotFound { entity: "task", id: key })?;
                Ok(serde_json::from_slice(&bytes)?)
            })
            .await
            .map_err(|e| RepoError::from_store(e, "get_task"))
    }

    /// Apply `mutate` to the task `id` owned by `owner` and store the result.
    ///
    /// `updated_at` is set to `now`, or one millisecond past its previous
    /// value when `now` is not later, so every update moves it forward.
    /// `id`, `user` and `created_at` cannot be changed by `mutate`.
    #[instrument(skip(self, mutate))]
    pub async fn update<F>(
        &self,
        id: Uuid,
        owner: &str,
        now: DateTime<Utc>,
        mutate: F,
    ) -> RepoResult<Task>
    where
        F: FnOnce(&mut Task) + Send + 'static,
    {
        let owner = owner.to_string();
        let task = self
            .db
            .run_write(TASK_BUCKET, move |txn| {
                let current = load_owned(txn, &id, &owner)?;

                let mut task = current.clone();
                mutate(&mut task);
                task.id = current.id;
                task.user = current.user;
                task.created_at = current.created_at;
                task.updated_at = if now > current.updated_at {
                    now
                } else {
                    current.updated_at + Duration::milliseconds(1)
                };

                txn.put(task_key(&id).as_bytes(), &serde_json::to_vec(&task)?)?;
                Ok(task)
            })
            .await
            .map_err(|e| RepoError::from_store(e, "update_task"))?;

        debug!(updated_at = %task.updated_at, "task updated");
        Ok(task)
    }

    /// Remove the task `id` owned by `owner`, returning the removed record.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid, owner: &str) -> RepoResult<Task> {
        let owner = owner.to_string();
        let task = self
            .db
            .run_write(TASK_BUCKET, move |txn| {
                let task = load_owned(txn, &id, &owner)?;
                txn.delete(task_key(&id).as_bytes())?;
                Ok(task)
            })
            .await
            .map_err(|e| RepoError::from_store(e, "delete_task"))?;

        debug!("task deleted");
        Ok(task)
    }

    /// Every task owned by `user`, oldest first.
    #[instrument(skip(self))]
    pub async fn list_by_user(&self, user: &str) -> RepoResult<Vec<Task>> {
        let user = user.to_string();
        let tasks = self
            .db
            .run_read(TASK_BUCKET, move |txn| {
                let mut tasks = Vec::new();
                for entry in txn.cursor() {
                    let (_, value) = entry?;
                    let task: Task = serde_json::from_slice(&value)?;
                    if task.is_owned_by(&user) {
                        tasks.push(task);
                    }
                }
                tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
                Ok(tasks)
            })
            .await
            .map_err(|e| RepoError::from_store(e, "list_tasks"))?;

        debug!(count = tasks.len(), "tasks listed");
        Ok(tasks)
    }
}

fn task_key(id: &Uuid) -> String {
    id.hyphenated().to_string()
}

/// Read the task `id` inside `txn` and check that `owner` owns it.
fn load_owned(txn: &WriteTxn<'_>, id: &Uuid, owner: &str) -> StoreResult<Task> {
    let key = task_key(id);
    let bytes = txn.get(key.as_bytes())?.ok_or_else(|| StoreError::NotFound {
        entity: "task",
        id: key.clone(),
    })?;
    let task: Task = serde_json::from_slice(&bytes)?;
    if !task.is_owned_by(owner) {
        return Err(StoreError::NotOwner {
            entity: "task",
            id: key,
            user: owner.to_string(),
        });
    }
    Ok(task)
}

// ── tests ────────────────────────────────────────────────────────────
