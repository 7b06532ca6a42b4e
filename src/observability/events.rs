//! Observable events
//!
//! Every log line emitted by the query layer names one of these events.

use std::fmt;

/// Observable events in the query layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Configuration loaded
    ConfigLoaded,
    /// Schema loaded
    SchemaLoaded,

    // Compilation
    /// Query compiled into commands
    QueryCompiled,
    /// Query rejected by validation or compilation
    QueryRejected,

    // Execution
    /// A command finished its store round trip
    CommandExecuted,
    /// A store RPC was rejected
    StoreCallFailed,

    // Markers
    /// Marker registered with the store
    MarkerRegistered,
    /// Marker removed from the store
    MarkerRemoved,
    /// Marker removal failed (best effort)
    MarkerCleanupFailed,

    // Client subscriptions
    /// Live query established
    SubscriptionStarted,
    /// Live query refreshed
    SubscriptionRefreshed,
    /// Late fetch result discarded after cleanup
    SubscriptionResultDropped,
    /// Live query torn down
    SubscriptionClosed,

    // Server scheduler
    /// Scheduler timer started
    SchedulerStarted,
    /// Scheduler timer stopped
    SchedulerStopped,
    /// Dirty poll failed for one tick
    SchedulerTickFailed,
    /// Native watch armed
    WatchArmed,
    /// Native watch disarmed
    WatchDisarmed,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::SchemaLoaded => "SCHEMA_LOADED",

            Event::QueryCompiled => "QUERY_COMPILED",
            Event::QueryRejected => "QUERY_REJECTED",

            Event::CommandExecuted => "COMMAND_EXECUTED",
            Event::StoreCallFailed => "STORE_CALL_FAILED",

            Event::MarkerRegistered => "MARKER_REGISTERED",
            Event::MarkerRemoved => "MARKER_REMOVED",
            Event::MarkerCleanupFailed => "MARKER_CLEANUP_FAILED",

            Event::SubscriptionStarted => "SUBSCRIPTION_STARTED",
            Event::SubscriptionRefreshed => "SUBSCRIPTION_REFRESHED",
            Event::SubscriptionResultDropped => "SUBSCRIPTION_RESULT_DROPPED",
            Event::SubscriptionClosed => "SUBSCRIPTION_CLOSED",

            Event::SchedulerStarted => "SCHEDULER_STARTED",
            Event::SchedulerStopped => "SCHEDULER_STOPPED",
            Event::SchedulerTickFailed => "SCHEDULER_TICK_FAILED",
            Event::WatchArmed => "WATCH_ARMED",
            Event::WatchDisarmed => "WATCH_DISARMED",
        }
    }

    /// Returns true if this event reports a failure
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Event::QueryRejected
                | Event::StoreCallFailed
                | Event::MarkerCleanupFailed
                | Event::SchedulerTickFailed
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
