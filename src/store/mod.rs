//! Store RPC contract
//!
//! The storage engine is an external collaborator. The query layer only
//! needs `command(name, args) -> reply`; replies are JSON values whose
//! shape depends on the command:
//!
//! | Command | Reply |
//! |---|---|
//! | `resolve.nodeid` | id string, or null when the alias is unknown |
//! | `hierarchy.find` | array of `[nodeId, [key, value, ...]]` rows, or id strings |
//! | `hierarchy.aggregate` | number |
//! | `subscriptions.add` | marker id (ignored) |
//! | `subscriptions.delmarker` | anything |

mod errors;

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

pub use errors::{StoreError, StoreResult};

/// Commands the query layer issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreCommand {
    ResolveNodeId,
    HierarchyFind,
    HierarchyAggregate,
    SubscriptionsAdd,
    SubscriptionsDelMarker,
}

impl StoreCommand {
    pub fn name(&self) -> &'static str {
        match self {
            StoreCommand::ResolveNodeId => "resolve.nodeid",
            StoreCommand::HierarchyFind => "hierarchy.find",
            StoreCommand::HierarchyAggregate => "hierarchy.aggregate",
            StoreCommand::SubscriptionsAdd => "subscriptions.add",
            StoreCommand::SubscriptionsDelMarker => "subscriptions.delmarker",
        }
    }
}

impl fmt::Display for StoreCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One positional RPC argument
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Text(String),
    /// Encoded wire struct
    Bytes(Vec<u8>),
}

impl Arg {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Arg::Text(s) => Some(s),
            Arg::Bytes(_) => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Arg::Bytes(b) => Some(b),
            Arg::Text(_) => None,
        }
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Text(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Text(s)
    }
}

/// Reply future of a store call
pub type StoreFuture<'a> = Pin<Box<dyn Future<Output = StoreResult<Value>> + Send + 'a>>;

/// Async RPC to the storage engine
///
/// Timeouts and retries belong to the implementation; the query layer
/// propagates every error unchanged.
pub trait Store: Send + Sync {
    fn command(&self, command: StoreCommand, args: Vec<Arg>) -> StoreFuture<'_>;
}
