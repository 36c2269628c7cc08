//! Session authentication for taskbox.
//!
//! - **Tokens**: [`TokenManager`] issues and validates stateless session
//!   tokens sealed with AES-256-GCM (`ring`).
//! - **Gate**: [`AuthGate`] turns the token presented with a request into
//!   an [`Identity`], or rejects the request before it reaches storage.
//! - **Passwords**: [`PasswordHasher`] with a PBKDF2 implementation.
//!
//! # Architecture
//!
//! ```text
//! AuthGate
//! └── TokenManager  (key material, Clock)
//!     └── crypto    (AES-256-GCM seal/open)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use taskbox_auth::{AuthGate, TokenManager};
//!
//! # fn example() -> taskbox_auth::Result<()> {
//! let tokens = Arc::new(TokenManager::from_secret("0123456789abcdef0123456789abcdef")?);
//! let (token, _payload) = tokens.create_token("alice", Duration::from_secs(900))?;
//!
//! let gate = AuthGate::new(tokens);
//! let identity = gate.authorize(Some(&token))?;
//! identity.ensure_owns("task", "alice")?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod crypto;
pub mod error;
pub mod gate;
pub mod password;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AuthError, Result};
pub use gate::{AuthGate, Identity};
pub use password::{MIN_PASSWORD_LEN, PasswordHasher, Pbkdf2Hasher};
pub use token::{TOKEN_HEADER, TokenManager, TokenPayload};
