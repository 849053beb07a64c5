use thiserror::Error;

/// Infrastructure errors raised by a record store.
///
/// "Not found" and "condition failed" are not errors: stores report them as
/// ordinary return values (`Option`, `bool`, [`UpdateOutcome`]).
///
/// [`UpdateOutcome`]: super::UpdateOutcome
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Query failed: {0}")]
    QueryFailed(String),
    #[error("Throttled: {0}")]
    Throttled(String),
    #[error("Timed out after {0}ms")]
    Timeout(u64),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    /// Concurrent writers kept moving the record's version.
    #[error("Write conflict: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Returns true for errors a caller may reasonably retry as a whole operation.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RepositoryError::ConnectionFailed(_)
                | RepositoryError::Throttled(_)
                | RepositoryError::Timeout(_)
                | RepositoryError::Conflict(_)
        )
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;
