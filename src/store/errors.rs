//! # Store Errors

use thiserror::Error;

/// Result type for store calls
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the store RPC
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// The store refused the command
    #[error("Store rejected {command}: {message}")]
    Rejected { command: String, message: String },

    /// The store could not be reached
    #[error("Store transport error: {0}")]
    Transport(String),

    /// The reply did not have the expected shape
    #[error("Unexpected response to {command}: {detail}")]
    UnexpectedResponse { command: String, detail: String },
}

impl StoreError {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Rejected { .. } => "NQ_STORE_REJECTED",
            StoreError::Transport(_) => "NQ_STORE_TRANSPORT",
            StoreError::UnexpectedResponse { .. } => "NQ_STORE_UNEXPECTED_RESPONSE",
        }
    }

    pub fn unexpected(command: impl Into<String>, detail: impl Into<String>) -> Self {
        StoreError::UnexpectedResponse {
            command: command.into(),
            detail: detail.into(),
        }
    }
}
