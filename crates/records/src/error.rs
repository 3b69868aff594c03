use portal_backend::BackendError;
use portal_session::{Role, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordsError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("student PIN is required")]
    PinRequired,
    #[error("student PIN was not accepted")]
    PinRejected,
    #[error("enter at least one grade")]
    NoGrades,
    #[error("invalid grade value `{0}`")]
    InvalidGrade(String),
    #[error("record {0} not found")]
    NotFound(String),
    #[error("this view requires the {0} role")]
    WrongRole(Role),
    #[error("request refused: {0}")]
    Refused(String),
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("session storage error: {0}")]
    Store(#[from] StoreError),
}

impl RecordsError {
    /// Network or remote failures, as opposed to input the caller can fix.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            RecordsError::Backend(_) | RecordsError::Refused(_) | RecordsError::NotFound(_)
        )
    }
}

pub type RecordsResult<T> = Result<T, RecordsError>;
