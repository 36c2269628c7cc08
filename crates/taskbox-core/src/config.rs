//! Process configuration.
//!
//! Sources, later ones winning:
//!
//! 1. built-in defaults
//! 2. an optional TOML file
//! 3. `TASKBOX_*` environment variables (a `.env` file in the working
//!    directory is loaded into the environment first)
//!
//! ```toml
//! log_level = "info"
//!
//! [store]
//! path = "data/taskbox.db"
//! op_timeout_ms = 5000
//! lock_timeout_ms = 0
//! max_idle_readers = 8
//!
//! [auth]
//! token_secret = "<exactly 32 bytes>"
//! token_ttl_secs = 900
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use taskbox_store::StoreOptions;
use tracing::{debug, info};

use crate::error::ConfigError;

/// Environment variable overriding [`StoreConfig::path`].
pub const ENV_DB_PATH: &str = "TASKBOX_DB_PATH";
/// Environment variable overriding [`AuthConfig::token_secret`].
pub const ENV_TOKEN_SECRET: &str = "TASKBOX_TOKEN_SECRET";
/// Environment variable overriding [`AuthConfig::token_ttl_secs`].
pub const ENV_TOKEN_TTL_SECS: &str = "TASKBOX_TOKEN_TTL_SECS";
/// Environment variable overriding [`Config::log_level`].
pub const ENV_LOG_LEVEL: &str = "TASKBOX_LOG_LEVEL";
/// Environment variable overriding [`StoreConfig::op_timeout_ms`].
pub const ENV_OP_TIMEOUT_MS: &str = "TASKBOX_OP_TIMEOUT_MS";

/// Required length of the token secret, in bytes.
pub const TOKEN_SECRET_LEN: usize = 32;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default tracing filter; `RUST_LOG` takes precedence.
    pub log_level: String,
    pub store: StoreConfig,
    pub auth: AuthConfig,
}

/// `[store]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// Deadline for every store transaction.
    pub op_timeout_ms: u64,
    /// How long to wait for a store locked by another process. 0 fails at
    /// once.
    pub lock_timeout_ms: u64,
    pub max_idle_readers: usize,
}

/// `[auth]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Symmetric key for session tokens.
    pub token_secret: String,
    pub token_ttl_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            store: StoreConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/taskbox.db"),
            op_timeout_ms: 5_000,
            lock_timeout_ms: 0,
            max_idle_readers: 8,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: String::new(),
            token_ttl_secs: 15 * 60,
        }
    }
}

impl Config {
    /// Load defaults, then `path` if given, then `.env` and the process
    /// environment, and validate the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Ok(dotenv) = dotenvy::dotenv() {
            debug!(path = %dotenv.display(), "loaded .env");
        }

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;

        info!(
            store = %config.store.path.display(),
            token_ttl_secs = config.auth.token_ttl_secs,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Read a TOML file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `TASKBOX_*` overrides, reading variables through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DB_PATH) {
            self.store.path = PathBuf::from(path);
        }
        if let Some(secret) = lookup(ENV_TOKEN_SECRET) {
            self.auth.token_secret = secret;
        }
        if let Some(ttl) = lookup(ENV_TOKEN_TTL_SECS) {
            self.auth.token_ttl_secs = parse_number(ENV_TOKEN_TTL_SECS, &ttl)?;
        }
        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(timeout) = lookup(ENV_OP_TIMEOUT_MS) {
            self.store.op_timeout_ms = parse_number(ENV_OP_TIMEOUT_MS, &timeout)?;
        }
        Ok(())
    }

    /// Check values that cannot be caught by the TOML types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let secret_len = self.auth.token_secret.len();
        if secret_len != TOKEN_SECRET_LEN {
            return Err(ConfigError::Invalid {
                key: "auth.token_secret",
                reason: format!("must be exactly {TOKEN_SECRET_LEN} bytes, got {secret_len}"),
            });
        }
        if self.auth.token_ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "auth.token_ttl_secs",
                reason: "must be positive".into(),
            });
        }
        if self.store.op_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "store.op_timeout_ms",
                reason: "must be positive".into(),
            });
        }
        Ok(())
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            op_timeout: Duration::from_millis(self.store.op_timeout_ms),
            lock_timeout: match self.store.lock_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
            max_idle_readers: self.store.max_idle_readers,
            ..StoreOptions::default()
        }
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.auth.token_ttl_secs)
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        reason: format!("expected a number, got {value:?}"),
    })
}
