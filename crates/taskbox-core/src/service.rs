//! The task service: registration, sessions and owner-scoped task CRUD.
//!
//! Every task operation goes through the [`AuthGate`] first; a request
//! with a missing, forged or expired token is rejected before storage is
//! touched. Updates and deletes pass the caller's identity down to the
//! repository, which checks ownership inside the write transaction.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use taskbox_auth::{
    AuthGate, Clock, Identity, PasswordHasher, Pbkdf2Hasher, SystemClock, TokenManager,
    TokenPayload,
};
use taskbox_store::{KvStore, Task, TaskStore, User, UserStore};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::error::{Result, ServiceError};
use crate::ids::{IdGenerator, UuidV7Generator};
use crate::validate;

const TASK_ENTITY: &str = "task";

/// A logged-in session as handed to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub payload: TokenPayload,
}

/// Fields of a task supplied by its creator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    /// Owner; must match the caller.
    pub user: String,
    pub text: String,
}

/// Changes to an existing task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub title: String,
    /// New body. `None` or an empty string keeps the current body.
    pub text: Option<String>,
}

/// Wires the repositories and the token machinery into user-facing
/// operations.
#[derive(Clone)]
pub struct TaskService {
    users: UserStore,
    tasks: TaskStore,
    tokens: Arc<TokenManager>,
    gate: AuthGate,
    hasher: Arc<dyn PasswordHasher>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    token_ttl: Duration,
}

impl TaskService {
    /// A service over `store` issuing tokens that live for `token_ttl`.
    pub fn new(store: KvStore, tokens: Arc<TokenManager>, token_ttl: Duration) -> Self {
        Self {
            users: UserStore::new(store.clone()),
            tasks: TaskStore::new(store),
            gate: AuthGate::new(tokens.clone()),
            tokens,
            hasher: Arc::new(Pbkdf2Hasher::default()),
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidV7Generator),
            token_ttl,
        }
    }

    pub fn with_hasher(mut self, hasher: Arc<dyn PasswordHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Clock for task timestamps. Token expiry uses the token manager's own
    /// clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    // -----------------------------------------------------------------------
    // Accounts and sessions
    // -----------------------------------------------------------------------

    /// Create an account. The username must not be taken.
    #[instrument(skip(self, password, email))]
    pub async fn register(&self, username: &str, password: &str, email: &str) -> Result<()> {
        validate::username(username)?;
        validate::password(password)?;
        validate::email(email)?;

        let hasher = self.hasher.clone();
        let plain = password.to_string();
        let hash = blocking(move || hasher.hash(&plain)).await??;

        self.users
            .create(&User {
                username: username.to_string(),
                password: hash,
                email: email.to_string(),
            })
            .await?;

        info!("user registered");
        Ok(())
    }

    /// Check credentials and issue a session token.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<Session> {
        let user = self.users.get(username).await?;

        let hasher = self.hasher.clone();
        let plain = password.to_string();
        let matches = blocking(move || hasher.verify(&user.password, &plain)).await??;
        if !matches {
            info!("login rejected: wrong password");
            return Err(ServiceError::WrongPassword);
        }

        let (token, payload) = self.tokens.create_token(username, self.token_ttl)?;
        info!(expires_at = %payload.expires_at, "user logged in");
        Ok(Session { token, payload })
    }

    /// End a session on the client side.
    ///
    /// Tokens are stateless, so there is nothing to invalidate here: the
    /// token stays valid until it expires wherever a copy survives.
    pub fn logout(&self, _token: &str) {
        debug!("logout requested; token remains valid until expiry");
    }

    /// Resolve the caller behind `token`.
    pub fn whoami(&self, token: Option<&str>) -> Result<Identity> {
        Ok(self.gate.authorize(token)?)
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    /// Create a task owned by the caller.
    #[instrument(skip(self, token, new), fields(title = %new.title))]
    pub async fn create_task(&self, token: Option<&str>, new: NewTask) -> Result<Task> {
        let identity = self.gate.authorize(token)?;
        identity.ensure_owns(TASK_ENTITY, &new.user)?;
        validate::title(&new.title)?;

        let task = Task::new(
            self.ids.next_id(),
            new.title,
            new.user,
            new.text,
            self.clock.now(),
        );
        self.tasks.create(&task).await?;

        info!(task_id = %task.id, "task created");
        Ok(task)
    }

    /// Fetch one of the caller's tasks.
    #[instrument(skip(self, token))]
    pub async fn get_task(&self, token: Option<&str>, id: Uuid) -> Result<Task> {
        let identity = self.gate.authorize(token)?;
        let task = self.tasks.get(id).await?;
        identity.ensure_owns(TASK_ENTITY, &task.user)?;
        Ok(task)
    }

    /// Every task of the caller, oldest first.
    #[instrument(skip(self, token))]
    pub async fn list_tasks(&self, token: Option<&str>) -> Result<Vec<Task>> {
        let identity = self.gate.authorize(token)?;
        Ok(self.tasks.list_by_user(identity.subject()).await?)
    }

    /// Change the title and optionally the body of one of the caller's tasks.
    #[instrument(skip(self, token, update))]
    pub async fn update_task(
        &self,
        token: Option<&str>,
        id: Uuid,
        update: TaskUpdate,
    ) -> Result<Task> {
        let identity = self.gate.authorize(token)?;
        validate::title(&update.title)?;

        let TaskUpdate { title, text } = update;
        let text = text.filter(|text| !text.is_empty());
        let task = self
            .tasks
            .update(id, identity.subject(), self.clock.now(), move |task| {
                task.title = title;
                if let Some(text) = text {
                    task.text = text;
                }
            })
            .await?;

        info!(task_id = %task.id, "task updated");
        Ok(task)
    }

    /// Remove one of the caller's tasks, returning it.
    #[instrument(skip(self, token))]
    pub async fn delete_task(&self, token: Option<&str>, id: Uuid) -> Result<Task> {
        let identity = self.gate.authorize(token)?;
        let task = self.tasks.delete(id, identity.subject()).await?;
        info!(task_id = %task.id, "task deleted");
        Ok(task)
    }
}

/// Run CPU-heavy work (password hashing) off the async workers.
async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|err| {
        error!(error = %err, "blocking task failed");
        ServiceError::Internal
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
