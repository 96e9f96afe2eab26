use thiserror::Error;

use crate::Key;

/// Errors that can occur in a storage engine.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed key does not exist.
    #[error("key {0:#018x} was not found")]
    NotFound(Key),

    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Whether this error is a missing-key condition rather than an engine
    /// failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
