use thiserror::Error;
use uuid::Uuid;

/// Result type used throughout the portal core
pub type Result<T> = std::result::Result<T, PortalError>;

#[derive(Error, Debug)]
pub enum PortalError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("unknown patient: {0}")]
    UnknownPatient(Uuid),

    #[error("media record not found: {0}")]
    MediaNotFound(Uuid),

    #[error("user not found: {0}")]
    UserNotFound(Uuid),

    #[error("email already registered: {0}")]
    DuplicateEmail(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("blob store error: {0}")]
    Blob(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PortalError {
    /// Referential errors are reported to API callers as a not-found condition.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PortalError::SessionNotFound(_)
                | PortalError::UnknownPatient(_)
                | PortalError::MediaNotFound(_)
                | PortalError::UserNotFound(_)
        )
    }
}

impl From<sqlx::Error> for PortalError {
    fn from(err: sqlx::Error) -> Self {
        PortalError::Storage(err.to_string())
    }
}
