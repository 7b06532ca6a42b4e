//! # Subscription Errors
//!
//! Error types for live queries and the server-side registry.

use thiserror::Error;

use crate::decoder::DecodeError;
use crate::executor::ExecutorError;

/// Result type for subscription operations
pub type SubscriptionResult<T> = Result<T, SubscriptionError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SubscriptionError {
    // ==================
    // Client Errors
    // ==================
    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    // ==================
    // Server Errors
    // ==================
    /// Registration record could not be parsed or patched
    #[error("Invalid subscription record: {0}")]
    InvalidRecord(String),

    /// Subscription id already registered
    #[error("Subscription already registered: {0}")]
    DuplicateSubscription(u32),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(u32),

    /// Native watch arm/disarm/poll failed
    #[error("Watch error: {0}")]
    Watch(String),
}

impl SubscriptionError {
    pub fn code(&self) -> &'static str {
        match self {
            SubscriptionError::Executor(e) => e.code(),
            SubscriptionError::Decode(e) => e.code(),
            SubscriptionError::InvalidRecord(_) => "NQ_SUB_INVALID_RECORD",
            SubscriptionError::DuplicateSubscription(_) => "NQ_SUB_DUPLICATE",
            SubscriptionError::SubscriptionNotFound(_) => "NQ_SUB_NOT_FOUND",
            SubscriptionError::Watch(_) => "NQ_SUB_WATCH",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_pass_through() {
        let err: SubscriptionError = DecodeError::UnknownPrefix("zz1".into()).into();
        assert_eq!(err.code(), "NQ_DECODE_UNKNOWN_PREFIX");
        assert_eq!(SubscriptionError::Watch("gone".into()).code(), "NQ_SUB_WATCH");
    }
}
