//! Error types shared by the classifier, aggregator, filter and stores.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvaluationError {
    /// Store access failed (connection, query or constraint error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Input rejected before reaching the store
    #[error("{0}")]
    Validation(String),

    /// Fallback snapshot could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl EvaluationError {
    pub fn validation(reason: impl Into<String>) -> Self {
        EvaluationError::Validation(reason.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, EvaluationError::Validation(_))
    }

    /// True when the store could not be reached at all, as opposed to a
    /// store that answered and rejected the request.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            EvaluationError::Database(
                sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::Io(_)
                    | sqlx::Error::Tls(_)
            )
        )
    }
}

pub type Result<T> = std::result::Result<T, EvaluationError>;
