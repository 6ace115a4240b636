//! Identity provider contract and the local Argon2/JWT implementation.

pub mod local;
pub mod token;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use moodboard_db::StoreError;

pub use local::LocalIdentity;
pub use token::Claims;

/// Minimum accepted password length.
pub const MIN_SECRET_LEN: usize = 8;

/// A signed-in identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub principal: Principal,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn(Principal),
    SignedOut { principal_id: String },
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("no user with that handle")]
    UnknownUser,

    #[error("that email address is already registered")]
    EmailTaken,

    #[error("that handle is already taken")]
    HandleTaken,

    #[error("invalid email address")]
    InvalidEmail,

    #[error("password must be at least 8 characters")]
    WeakPassword,

    #[error("session token is invalid or expired")]
    InvalidToken,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("identity provider error: {0}")]
    Internal(String),
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn sign_up(&self, email: &str, secret: &str) -> Result<Session, AuthError>;

    async fn sign_in(&self, identifier: &str, secret: &str) -> Result<Session, AuthError>;

    /// Ends every outstanding session of the principal.
    async fn sign_out(&self, principal_id: &str) -> Result<(), AuthError>;

    async fn verify(&self, token: &str) -> Result<Principal, AuthError>;

    fn on_session_change(&self) -> broadcast::Receiver<SessionEvent>;
}

pub(crate) fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
        }
        None => false,
    };
    if valid { Ok(email) } else { Err(AuthError::InvalidEmail) }
}
