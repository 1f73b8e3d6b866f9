//! Error types for name parsing.

use thiserror::Error;

/// Errors that can occur when parsing a name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The input string is empty.
    #[error("{kind} cannot be empty")]
    Empty { kind: &'static str },

    /// A name contains characters it may not carry.
    #[error("invalid {kind}: {message}")]
    InvalidName {
        kind: &'static str,
        message: String,
    },
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty { .. })
    }
}
