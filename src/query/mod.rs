//! Query language surface
//!
//! Raw queries are `serde_json::Value` objects. This module classifies
//! their keys, validates directive placement before compilation, and
//! holds the filter AST shared by the compiler, the executor and the
//! subscription engine.

mod directive;
mod errors;
mod filter;
mod now;
mod validate;

pub use directive::{Directive, QueryKey};
pub use errors::{ValidationError, ValidationResult};
pub use filter::{FilterLeaf, FilterNode, FilterOperator, Fork, NowBoundary};
pub use now::NowExpr;
pub use validate::QueryValidator;
