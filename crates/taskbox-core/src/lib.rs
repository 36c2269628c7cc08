//! # taskbox-core
//!
//! The taskbox application layer: the [`TaskService`] that ties the
//! storage repositories to session authentication, plus configuration
//! loading, logging setup and input validation.
//!
//! ```text
//! TaskService
//! ├── AuthGate / TokenManager   (taskbox-auth)
//! ├── UserStore / TaskStore     (taskbox-store)
//! ├── PasswordHasher, Clock, IdGenerator
//! └── validate
//! ```

pub mod config;
pub mod error;
pub mod ids;
pub mod service;
pub mod telemetry;
pub mod validate;

pub use config::{AuthConfig, Config, StoreConfig};
pub use error::{ConfigError, Result, ServiceError};
pub use ids::{IdGenerator, UuidV7Generator};
pub use service::{NewTask, Session, TaskService, TaskUpdate};
pub use telemetry::init_tracing;
