//! Client error types
//!
//! Every lower-layer error passes through unchanged; `code()` reports the
//! code of the layer that failed.

use thiserror::Error;

use crate::compiler::CompileError;
use crate::config::ConfigError;
use crate::decoder::DecodeError;
use crate::executor::ExecutorError;
use crate::schema::SchemaError;
use crate::subscription::SubscriptionError;

/// Result type for client entry points
pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl ClientError {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            ClientError::Compile(e) => e.code(),
            ClientError::Executor(e) => e.code(),
            ClientError::Decode(e) => e.code(),
            ClientError::Subscription(e) => e.code(),
            ClientError::Config(e) => e.code(),
            ClientError::Schema(e) => e.code().code(),
        }
    }
}
