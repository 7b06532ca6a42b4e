//! Command executor
//!
//! Compiled commands → store calls → raw replies.
//!
//! # Execution Flow (per command)
//!
//! 1. Build the `FindArgs` wire struct and the RPN filter program
//! 2. Register the subscription marker (subscription mode only)
//! 3. Call `hierarchy.find` or `hierarchy.aggregate`
//! 4. Seed the next phase of a nested find with the returned ids
//!
//! # Guarantees
//!
//! - A marker is registered before the read it shadows
//! - The marker carries the same wire bytes and filter program as the read
//! - Unresolved alias sources never reach the store

mod context;
mod errors;
mod executor;
mod wire;

pub use context::{ExecContext, Marker};
pub use errors::{ExecutorError, ExecutorResult};
pub use executor::{direction_for, CommandExecutor, CommandOutput};
pub use wire::{AggregateFn, FindArgs, MergeStrategy, ResultType, SortOrder, TraversalDirection};
