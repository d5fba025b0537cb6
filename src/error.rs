use crate::scene::SceneError;
use crate::store::StoreError;
use std::fmt;

/// Session-level failures, each mapping to one HTTP status
#[derive(Debug)]
pub enum SessionError {
    /// Malformed command, unknown tool or role, bad pacing values
    Validation(String),
    /// Missing or wrong token for the requested scope
    Unauthorized,
    /// Unknown session id
    NotFound(String),
    /// Duplicate session id or seed
    Conflict(String),
    /// Unexpected failure while ticking or talking to the store
    Internal(anyhow::Error),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Validation(msg) => write!(f, "{}", msg),
            SessionError::Unauthorized => write!(f, "Invalid or missing token"),
            SessionError::NotFound(id) => write!(f, "Session '{}' not found", id),
            SessionError::Conflict(msg) => write!(f, "{}", msg),
            SessionError::Internal(e) => write!(f, "Internal error: {:#}", e),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<SceneError> for SessionError {
    fn from(e: SceneError) -> Self {
        SessionError::Validation(e.to_string())
    }
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::DuplicateSeed(_) => SessionError::Conflict(e.to_string()),
            StoreError::Backend(inner) => SessionError::Internal(inner),
        }
    }
}

impl From<anyhow::Error> for SessionError {
    fn from(e: anyhow::Error) -> Self {
        SessionError::Internal(e)
    }
}
