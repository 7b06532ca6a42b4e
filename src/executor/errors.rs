//! Executor error types
//!
//! Error codes:
//! - NQ_EXEC_MALFORMED_REPLY
//! - NQ_EXEC_WIRE
//! - NQ_EXEC_BRIDGE
//!
//! Store and bridge failures are propagated unchanged.

use thiserror::Error;

use crate::bridge::BridgeError;
use crate::store::StoreError;

/// Result type for executor operations
pub type ExecutorResult<T> = Result<T, ExecutorError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    /// The store answered with rows of the wrong shape
    #[error("Malformed reply to {command}: {detail}")]
    MalformedReply { command: String, detail: String },

    /// Wire struct could not be encoded or decoded
    #[error("Wire format error: {0}")]
    Wire(String),
}

impl ExecutorError {
    pub fn malformed_reply(command: impl Into<String>, detail: impl Into<String>) -> Self {
        ExecutorError::MalformedReply {
            command: command.into(),
            detail: detail.into(),
        }
    }

    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            ExecutorError::Store(e) => e.code(),
            ExecutorError::Bridge(_) => "NQ_EXEC_BRIDGE",
            ExecutorError::MalformedReply { .. } => "NQ_EXEC_MALFORMED_REPLY",
            ExecutorError::Wire(_) => "NQ_EXEC_WIRE",
        }
    }
}
