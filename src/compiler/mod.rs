//! Query compiler
//!
//! Raw nested query → ordered command list. See `walk` for the merge rule
//! and `command` for the command model and its content hash.

mod alias;
mod command;
mod errors;
mod walk;

pub use alias::{AliasCache, AliasResolver};
pub use command::{
    Aggregate, AggregateFunction, Command, CommandKind, CompiledQuery, DefaultValue, Field,
    FieldSelection, InheritOptions, Paging, Sort, SortDirection, Source, TraverseSource,
};
pub use errors::{CompileError, CompileResult};
pub use walk::QueryCompiler;
