//! CLI entry point for taskbox.
//!
//! This binary provides the `taskbox` command: account registration,
//! login sessions and task management against the local store. The session
//! token from `login` is kept in a file next to the store and presented by
//! every task command.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use taskbox_auth::TokenManager;
use taskbox_core::{Config, NewTask, Session, TaskService, TaskUpdate, init_tracing};
use taskbox_store::KvStore;
use tracing::{debug, info};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

/// taskbox: personal tasks in a local store.
#[derive(Parser)]
#[command(name = "taskbox", version, about = "Personal task manager with local storage")]
struct Cli {
    /// Configuration file. Defaults to `config/taskbox.toml` when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Session file. Defaults to `session.json` next to the store.
    #[arg(long, global = true)]
    session: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account.
    Register {
        username: String,
        email: String,
        /// Read from stdin when omitted.
        #[arg(long)]
        password: Option<String>,
    },

    /// Log in and store the session token.
    Login {
        username: String,
        /// Read from stdin when omitted.
        #[arg(long)]
        password: Option<String>,
    },

    /// Forget the stored session token.
    Logout,

    /// Show who the stored session belongs to.
    Whoami,

    /// Show store and session status.
    Status,

    /// Manage tasks of the logged-in user.
    #[command(subcommand)]
    Task(TaskCommand),
}

#[derive(Subcommand)]
enum TaskCommand {
    /// Create a task.
    Create {
        title: String,
        #[arg(long, default_value = "")]
        text: String,
    },

    /// Show one task.
    Get { id: Uuid },

    /// List all of your tasks.
    List,

    /// Change a task's title and optionally its text.
    Update {
        id: Uuid,
        title: String,
        #[arg(long)]
        text: Option<String>,
    },

    /// Delete a task.
    Delete { id: Uuid },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(|| {
        let default = PathBuf::from("config/taskbox.toml");
        default.exists().then_some(default)
    });
    let config = Config::load(config_path.as_deref()).context("failed to load configuration")?;
    init_tracing(&config.log_level);

    let app = App::open(&config, cli.session.clone())?;
    let result = app.run(cli.command).await;
    app.store.close().context("failed to close store")?;
    result
}

struct App {
    store: KvStore,
    service: TaskService,
    session_path: PathBuf,
}

impl App {
    fn open(config: &Config, session: Option<PathBuf>) -> Result<Self> {
        let db_path = &config.store.path;
        if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).context("failed to create data directory")?;
        }

        let store = KvStore::open_with(db_path, config.store_options())
            .with_context(|| format!("failed to open store {}", db_path.display()))?;
        info!(path = %db_path.display(), "store opened");

        let tokens = Arc::new(
            TokenManager::from_secret(&config.auth.token_secret)
                .context("invalid token secret")?,
        );
        let service = TaskService::new(store.clone(), tokens, config.token_ttl());

        let session_path = session.unwrap_or_else(|| {
            db_path
                .parent()
                .map(|dir| dir.join("session.json"))
                .unwrap_or_else(|| PathBuf::from("session.json"))
        });

        Ok(Self {
            store,
            service,
            session_path,
        })
    }

    async fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Register {
                username,
                email,
                password,
            } => self.cmd_register(&username, &email, password).await,
            Commands::Login { username, password } => self.cmd_login(&username, password).await,
            Commands::Logout => self.cmd_logout(),
            Commands::Whoami => self.cmd_whoami(),
            Commands::Status => self.cmd_status().await,
            Commands::Task(task) => self.cmd_task(task).await,
        }
    }

    // -----------------------------------------------------------------------
    // Accounts and sessions
    // -----------------------------------------------------------------------

    async fn cmd_register(&self, username: &str, email: &str, password: Option<String>) -> Result<()> {
        let password = password_or_prompt(password)?;
        self.service.register(username, &password, email).await?;
        println!("registered {username}");
        Ok(())
    }

    async fn cmd_login(&self, username: &str, password: Option<String>) -> Result<()> {
        let password = password_or_prompt(password)?;
        let session = self.service.login(username, &password).await?;
        save_session(&self.session_path, &session)?;
        println!(
            "logged in as {} until {}",
            session.payload.subject, session.payload.expires_at
        );
        Ok(())
    }

    fn cmd_logout(&self) -> Result<()> {
        let Some(session) = load_session(&self.session_path)? else {
            println!("not logged in");
            return Ok(());
        };
        self.service.logout(&session.token);
        std::fs::remove_file(&self.session_path).context("failed to remove session file")?;
        println!("logged out");
        Ok(())
    }

    fn cmd_whoami(&self) -> Result<()> {
        let token = self.token()?;
        let identity = self.service.whoami(token.as_deref())?;
        println!(
            "{} (session expires {})",
            identity.subject(),
            identity.payload().expires_at
        );
        Ok(())
    }

    async fn cmd_status(&self) -> Result<()> {
        println!();
        println!("  taskbox status");
        println!("  ==============");
        println!();
        println!("  Store:    {}", self.store.path().display());

        for bucket in self.store.bucket_stats().await? {
            println!("    {:<8} {} entries", bucket.name, bucket.entries);
        }

        match load_session(&self.session_path)? {
            Some(session) => match self.service.whoami(Some(&session.token)) {
                Ok(identity) => println!("  Session:  {}", identity.subject()),
                Err(err) => println!("  Session:  unusable ({err})"),
            },
            None => println!("  Session:  none"),
        }
        println!();
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    async fn cmd_task(&self, command: TaskCommand) -> Result<()> {
        let token = self.token()?;
        let token = token.as_deref();

        match command {
            TaskCommand::Create { title, text } => {
                let user = self.service.whoami(token)?.subject().to_string();
                let task = self
                    .service
                    .create_task(token, NewTask { title, user, text })
                    .await?;
                print_json(&task)
            }
            TaskCommand::Get { id } => print_json(&self.service.get_task(token, id).await?),
            TaskCommand::List => print_json(&self.service.list_tasks(token).await?),
            TaskCommand::Update { id, title, text } => {
                let task = self
                    .service
                    .update_task(token, id, TaskUpdate { title, text })
                    .await?;
                print_json(&task)
            }
            TaskCommand::Delete { id } => {
                let task = self.service.delete_task(token, id).await?;
                println!("deleted {}", task.id);
                Ok(())
            }
        }
    }

    fn token(&self) -> Result<Option<String>> {
        Ok(load_session(&self.session_path)?.map(|session| session.token))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn password_or_prompt(password: Option<String>) -> Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    print!("password: ");
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read password")?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("no password given");
    }
    Ok(password)
}

fn load_session(path: &Path) -> Result<Option<Session>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read session file {}", path.display()))?;
    let session = serde_json::from_str(&content).context("session file is corrupt")?;
    Ok(Some(session))
}

/// Write the session file readable by the owner only.
fn save_session(path: &Path, session: &Session) -> Result<()> {
    let content = serde_json::to_string_pretty(session)?;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("failed to open session file {}", path.display()))?;

    // `mode` only applies on creation; tighten a file left by an older run.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .context("failed to restrict session file permissions")?;
    }

    file.write_all(content.as_bytes())
        .with_context(|| format!("failed to write session file {}", path.display()))?;
    debug!(path = %path.display(), "session saved");
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_task_update() {
        let cli = Cli::try_parse_from([
            "taskbox",
            "task",
            "update",
            "0190b8a6-7c3e-7c11-9a5e-1b2c3d4e5f60",
            "Groceries",
            "--text",
            "milk, eggs",
        ])
        .unwrap();
        match cli.command {
            Commands::Task(TaskCommand::Update { title, text, .. }) => {
                assert_eq!(title, "Groceries");
                assert_eq!(text.as_deref(), Some("milk, eggs"));
            }
            _ => panic!("parsed the wrong command"),
        }
    }

    #[test]
    fn session_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        assert!(load_session(&path).unwrap().is_none());

        let tokens = TokenManager::from_secret("0123456789abcdef0123456789abcdef").unwrap();
        let (token, payload) = tokens
            .create_token("alice", std::time::Duration::from_secs(60))
            .unwrap();
        let session = Session { token, payload };
        save_session(&path, &session).unwrap();
        assert_eq!(load_session(&path).unwrap(), Some(session));
    }

    #[cfg(unix)]
    #[test]
    fn session_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        // Left behind world-readable by an earlier run.
        std::fs::write(&path, "{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let tokens = TokenManager::from_secret("0123456789abcdef0123456789abcdef").unwrap();
        let (token, payload) = tokens
            .create_token("alice", std::time::Duration::from_secs(60))
            .unwrap();
        save_session(&path, &Session { token, payload }).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        let fresh = dir.path().join("fresh.json");
        let (token, payload) = tokens
            .create_token("alice", std::time::Duration::from_secs(60))
            .unwrap();
        save_session(&fresh, &Session { token, payload }).unwrap();
        let mode = std::fs::metadata(&fresh).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
