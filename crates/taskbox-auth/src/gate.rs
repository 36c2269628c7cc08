//! Request-scoped authorization.
//!
//! The gate runs before any domain operation: a request either yields an
//! [`Identity`] or is rejected. Ownership checks are made against that
//! identity.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{AuthError, Result};
use crate::token::{TokenManager, TokenPayload};

/// Admits requests that present a valid token.
#[derive(Debug, Clone)]
pub struct AuthGate {
    tokens: Arc<TokenManager>,
}

impl AuthGate {
    pub fn new(tokens: Arc<TokenManager>) -> Self {
        Self { tokens }
    }

    /// Validate the token presented with a request.
    ///
    /// A missing or blank token is [`AuthError::Unauthenticated`]; token
    /// failures keep their own variants so callers can tell an expired
    /// session from a forged one. Any other input is validated exactly as
    /// presented.
    pub fn authorize(&self, token: Option<&str>) -> Result<Identity> {
        let token = match token {
            Some(token) if !token.trim().is_empty() => token,
            _ => {
                debug!("request without token rejected");
                return Err(AuthError::Unauthenticated);
            }
        };

        match self.tokens.validate_token(token) {
            Ok(payload) => {
                debug!(subject = %payload.subject, "request authorized");
                Ok(Identity { payload })
            }
            Err(err) => {
                warn!(error = %err, "request rejected");
                Err(err)
            }
        }
    }
}

/// The authenticated caller of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    payload: TokenPayload,
}

impl Identity {
    /// Username the token was issued to.
    pub fn subject(&self) -> &str {
        &self.payload.subject
    }

    pub fn payload(&self) -> &TokenPayload {
        &self.payload
    }

    /// Fail with [`AuthError::Forbidden`] unless this identity is `owner`
    /// of the `entity` being acted on.
    pub fn ensure_owns(&self, entity: &'static str, owner: &str) -> Result<()> {
        if self.payload.subject == owner {
            return Ok(());
        }
        warn!(subject = %self.payload.subject, entity, owner, "ownership check failed");
        Err(AuthError::Forbidden {
            entity,
            subject: self.payload.subject.clone(),
            owner: owner.to_string(),
        })
    }
}
