//! Storage error types.

use thiserror::Error;

use crate::filter::FilterError;
use crate::pool::PoolError;

/// Errors that can occur during resource store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No row matched the lookup or mutation.
    #[error("no resourceone found")]
    NotFound,

    /// The statement could not be executed or committed.
    #[error("store unavailable: {0}")]
    Unavailable(#[from] rusqlite::Error),

    /// No pooled connection could be obtained.
    #[error("connection pool: {0}")]
    Pool(#[from] PoolError),

    /// The caller cancelled the operation while it was in flight.
    #[error("operation cancelled")]
    Cancelled,

    /// The request deadline passed while the operation was in flight.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The blocking worker running the statement failed.
    #[error("store worker failed: {0}")]
    Task(String),

    /// A persisted row could not be mapped back into a resource.
    #[error("invalid persisted data: {0}")]
    InvalidData(String),

    /// The query could not be composed.
    #[error("query composition: {0}")]
    Filter(#[from] FilterError),
}

impl StoreError {
    /// Returns true for the explicit absence signal.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

/// A specialized Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
