//! # Subscriptions
//!
//! Client side: `LiveQuery` keeps one compiled query current by re-running
//! the commands that can change and scheduling re-evaluation of
//! now-relative filters.
//!
//! Server side: `SubscriptionRegistry` keeps reference-counted listener
//! sets on top of a `NativeWatch`, `SubscriptionScheduler` polls it on a
//! timer, and `SubscriptionRecord` is the binary registration format.

pub mod boundary;
mod errors;
mod live;
mod record;
mod registry;
mod scheduler;

pub use errors::{SubscriptionError, SubscriptionResult};
pub use live::LiveQuery;
pub use record::{NowEntry, RecordKind, RecordTarget, SubscriptionRecord};
pub use registry::{
    DirtySet, Fire, FireReceiver, FireSender, NativeWatch, SubscriptionRegistry, WatchFuture,
    WatchKey,
};
pub use scheduler::{SubscriptionScheduler, TickReport};
