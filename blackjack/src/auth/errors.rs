//! Authentication and session errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("session {0:?} not found")]
    SessionNotFound(String),
    #[error("identity provider error: {0}")]
    Provider(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("session manager is closed")]
    ManagerClosed,
}

pub type AuthResult<T> = Result<T, AuthError>;
