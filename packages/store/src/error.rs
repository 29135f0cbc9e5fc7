use thiserror::Error;

/// Failure of a storage operation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The named record does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),
    /// The write would break a uniqueness or reference rule.
    #[error("{0}")]
    Conflict(String),
    /// The input failed validation.
    #[error("{0}")]
    Invalid(String),
    /// The backend itself failed (connection, query, ...).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        StoreError::Invalid(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        StoreError::Conflict(msg.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
