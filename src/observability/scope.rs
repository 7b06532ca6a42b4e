//! ObservationScope for automatic begin/complete logging
//!
//! - Logs `{name}_BEGIN` on creation
//! - Logs `{name}_COMPLETE` on `complete()`
//! - Logs `{name}_FAILED` on `fail()`
//! - Logs `{name}_INCOMPLETE` when dropped without either

use std::cell::Cell;
use std::time::Instant;

use super::logger::Logger;

/// A scope that logs its own begin and end
pub struct ObservationScope<'a> {
    name: &'a str,
    completed: Cell<bool>,
    fields: Vec<(&'a str, String)>,
    started_at: Instant,
}

impl<'a> ObservationScope<'a> {
    /// Create a new observation scope
    pub fn new(name: &'a str) -> Self {
        Self::with_fields(name, &[])
    }

    /// Create a new observation scope carrying fields on every line
    pub fn with_fields(name: &'a str, fields: &[(&'a str, &str)]) -> Self {
        Logger::trace(&format!("{}_BEGIN", name), fields);

        Self {
            name,
            completed: Cell::new(false),
            fields: fields.iter().map(|(k, v)| (*k, v.to_string())).collect(),
            started_at: Instant::now(),
        }
    }

    fn field_refs(&self) -> Vec<(&str, &str)> {
        self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect()
    }

    /// Mark the scope as successfully completed
    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    /// Mark the scope as completed with additional fields
    pub fn complete_with_fields(self, extra_fields: &[(&str, &str)]) {
        self.completed.set(true);
        let elapsed = self.elapsed_ms();
        let mut all = self.field_refs();
        all.extend(extra_fields.iter().copied());
        all.push(("elapsed_ms", elapsed.as_str()));
        Logger::info(&format!("{}_COMPLETE", self.name), &all);
    }

    /// Mark the scope as failed with a reason
    pub fn fail(self, reason: &str) {
        self.completed.set(true);
        let mut all = self.field_refs();
        all.push(("reason", reason));
        Logger::error(&format!("{}_FAILED", self.name), &all);
    }

    /// Elapsed milliseconds since the scope began
    pub fn elapsed_ms(&self) -> String {
        self.started_at.elapsed().as_millis().to_string()
    }

    /// Check if the scope has been completed
    pub fn is_completed(&self) -> bool {
        self.completed.get()
    }
}

impl Drop for ObservationScope<'_> {
    fn drop(&mut self) {
        if !self.completed.get() {
            Logger::warn(
                &format!("{}_INCOMPLETE", self.name),
                &[("reason", "scope dropped without completion")],
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_lifecycle() {
        let scope = ObservationScope::with_fields("GET", &[("root", "root")]);
        assert!(!scope.is_completed());
        scope.complete_with_fields(&[("commands", "1")]);
    }

    #[test]
    fn test_scope_fail() {
        let scope = ObservationScope::new("SUB");
        scope.fail("store rejected");
    }

    #[test]
    fn test_scope_drop_without_complete() {
        let scope = ObservationScope::new("GET");
        drop(scope);
    }
}
