//! Error types for location index operations.

use thiserror::Error;

/// Errors from location index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// No record exists for the image.
    #[error("image not found in location index: {0}")]
    NotFound(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored value failed validation on the way out.
    #[error("corrupt index entry: {0}")]
    Corrupt(String),

    #[error("internal index error: {0}")]
    Internal(String),
}

impl IndexError {
    /// Returns true if this error indicates the image has no record.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
