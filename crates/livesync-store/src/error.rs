//! Store error types.

use thiserror::Error;

/// Errors raised by a [`GraphStore`](crate::GraphStore) call itself.
///
/// Slow or missing propagation is never an error here; the store has no way
/// to know it happened.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Keys must be non-empty.
    #[error("invalid key: {0:?}")]
    InvalidKey(String),

    /// Writes schedule propagation on the ambient Tokio runtime.
    #[error("no async runtime available: {0}")]
    NoRuntime(String),

    /// The store connection is gone.
    #[error("store closed")]
    Closed,
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
