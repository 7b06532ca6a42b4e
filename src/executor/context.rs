//! Execution context
//!
//! One `ExecContext` is created per top-level call (`get`, `sub`, or one
//! subscription refresh) and passed explicitly through every step. Clones
//! share the marker collector and alias cache of the call they came from;
//! `with_sub_id` and `with_lang` derive an overridden copy.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::bridge::ExpressionBridge;
use crate::compiler::{AliasCache, AliasResolver};
use crate::observability::MetricsRegistry;
use crate::schema::Schema;
use crate::store::Store;

/// A store-side registration shadowing one executed read
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Marker {
    pub cmd_id: u64,
    pub sub_id: String,
    pub has_now: bool,
}

#[derive(Clone)]
pub struct ExecContext {
    pub store: Arc<dyn Store>,
    pub schema: Arc<Schema>,
    pub bridge: Arc<dyn ExpressionBridge>,
    pub metrics: Arc<MetricsRegistry>,
    pub lang: String,
    pub sub_id: Option<String>,
    markers: Arc<Mutex<Vec<Marker>>>,
    aliases: Arc<AliasCache>,
}

impl ExecContext {
    pub fn new(
        store: Arc<dyn Store>,
        schema: Arc<Schema>,
        bridge: Arc<dyn ExpressionBridge>,
        metrics: Arc<MetricsRegistry>,
        lang: impl Into<String>,
    ) -> Self {
        Self {
            store,
            schema,
            bridge,
            metrics,
            lang: lang.into(),
            sub_id: None,
            markers: Arc::new(Mutex::new(Vec::new())),
            aliases: Arc::new(AliasCache::new()),
        }
    }

    pub fn with_sub_id(&self, sub_id: impl Into<String>) -> Self {
        Self {
            sub_id: Some(sub_id.into()),
            ..self.clone()
        }
    }

    /// Same call, no marker mirroring
    pub fn without_sub_id(&self) -> Self {
        Self {
            sub_id: None,
            ..self.clone()
        }
    }

    pub fn with_lang(&self, lang: impl Into<String>) -> Self {
        Self {
            lang: lang.into(),
            ..self.clone()
        }
    }

    /// Same collaborators, fresh marker collector and alias cache
    pub fn fresh(&self) -> Self {
        Self {
            markers: Arc::new(Mutex::new(Vec::new())),
            aliases: Arc::new(AliasCache::new()),
            ..self.clone()
        }
    }

    pub fn alias_resolver(&self) -> AliasResolver<'_> {
        AliasResolver::new(self.store.as_ref(), &self.lang, &self.aliases)
    }

    /// Recovers the collector from a panicked holder so no registered marker is lost
    fn collector(&self) -> MutexGuard<'_, Vec<Marker>> {
        self.markers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn record_marker(&self, marker: Marker) {
        let mut markers = self.collector();
        if !markers.contains(&marker) {
            markers.push(marker);
        }
    }

    /// Markers registered so far, in registration order
    pub fn markers(&self) -> Vec<Marker> {
        self.collector().clone()
    }

    pub fn take_markers(&self) -> Vec<Marker> {
        std::mem::take(&mut *self.collector())
    }
}

impl std::fmt::Debug for ExecContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecContext")
            .field("lang", &self.lang)
            .field("sub_id", &self.sub_id)
            .field("markers", &self.markers().len())
            .field("aliases", &self.aliases.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::RpnBridge;
    use crate::store::{Arg, StoreCommand, StoreFuture};
    use serde_json::Value;

    struct Silent;

    impl Store for Silent {
        fn command(&self, _command: StoreCommand, _args: Vec<Arg>) -> StoreFuture<'_> {
            Box::pin(async { Ok(Value::Null) })
        }
    }

    fn context() -> ExecContext {
        ExecContext::new(
            Arc::new(Silent),
            Arc::new(Schema::default()),
            Arc::new(RpnBridge::new()),
            Arc::new(MetricsRegistry::new()),
            "en",
        )
        .with_sub_id("sub-1")
    }

    fn marker(cmd_id: u64) -> Marker {
        Marker {
            cmd_id,
            sub_id: "sub-1".into(),
            has_now: false,
        }
    }

    #[test]
    fn test_markers_are_deduplicated_and_shared() {
        let ctx = context();
        let clone = ctx.clone();
        ctx.record_marker(marker(1));
        clone.record_marker(marker(1));
        clone.record_marker(marker(2));
        assert_eq!(ctx.markers(), vec![marker(1), marker(2)]);
        assert!(ctx.fresh().markers().is_empty());
        assert_eq!(ctx.take_markers().len(), 2);
        assert!(clone.markers().is_empty());
    }

    #[test]
    fn test_markers_survive_poisoned_collector() {
        let ctx = context();
        ctx.record_marker(marker(1));
        let shared = ctx.clone();
        let _ = std::thread::spawn(move || {
            let _guard = shared.markers.lock().unwrap();
            panic!("holder panicked");
        })
        .join();
        assert!(ctx.markers.is_poisoned());

        ctx.record_marker(marker(2));
        assert_eq!(ctx.markers(), vec![marker(1), marker(2)]);
        assert_eq!(ctx.take_markers().len(), 2);
        assert!(ctx.markers().is_empty());
    }
}
