use thiserror::Error;

use moodboard_auth::AuthError;
use moodboard_db::StoreError;

/// Failures surfaced to the presentation layer.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(String),

    /// Rejected locally, before any store call.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Forbidden(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Network or service failure; not retried.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { collection, id } => Error::NotFound(format!("{collection}/{id}")),
            other => Error::Store(other),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Store(StoreError::Serialization(e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn require(value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{what} is required")));
    }
    Ok(())
}
