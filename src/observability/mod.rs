//! Observability for the query layer
//!
//! - Structured logging (JSON lines)
//! - Monotonic counters
//! - Lifecycle event names
//!
//! # Usage
//!
//! ```ignore
//! use nestquery::observability::{Logger, Event, MetricsRegistry, ObservationScope};
//!
//! Logger::info("QUERY_COMPILED", &[("commands", "3")]);
//!
//! let metrics = MetricsRegistry::new();
//! metrics.increment_store_calls();
//!
//! let scope = ObservationScope::new("GET");
//! // ... do work ...
//! scope.complete();
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::ObservationScope;

/// Log a lifecycle event
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields
///
/// Failure events are written at WARN, everything else at INFO.
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_failure() {
        Severity::Warn
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}
