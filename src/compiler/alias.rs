//! Alias resolution
//!
//! `$alias` values resolve to node ids through `resolve.nodeid`. Results,
//! including misses, are cached for the lifetime of one execution context
//! so a query naming the same alias twice costs one round trip.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::Value;

use crate::store::{Arg, Store, StoreCommand, StoreError, StoreResult};

/// Per-context alias→id cache
#[derive(Debug, Default)]
pub struct AliasCache {
    entries: Mutex<HashMap<String, Option<String>>>,
}

impl AliasCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(lang: &str, aliases: &[String]) -> String {
        format!("{}\u{1f}{}", lang, aliases.join("\u{1f}"))
    }

    pub fn get(&self, lang: &str, aliases: &[String]) -> Option<Option<String>> {
        let entries = self.entries.lock().ok()?;
        entries.get(&Self::key(lang, aliases)).cloned()
    }

    pub fn insert(&self, lang: &str, aliases: &[String], id: Option<String>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(Self::key(lang, aliases), id);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolves alias candidates against the store, through a cache
pub struct AliasResolver<'a> {
    store: &'a dyn Store,
    lang: &'a str,
    cache: &'a AliasCache,
}

impl<'a> AliasResolver<'a> {
    pub fn new(store: &'a dyn Store, lang: &'a str, cache: &'a AliasCache) -> Self {
        Self { store, lang, cache }
    }

    /// First candidate that names a node, or `None`
    pub async fn resolve(&self, aliases: &[String]) -> StoreResult<Option<String>> {
        if let Some(hit) = self.cache.get(self.lang, aliases) {
            return Ok(hit);
        }

        let mut args = Vec::with_capacity(aliases.len() + 1);
        args.push(Arg::from(self.lang));
        args.extend(aliases.iter().cloned().map(Arg::Text));

        let reply = self.store.command(StoreCommand::ResolveNodeId, args).await?;
        let id = match reply {
            Value::String(id) if !id.is_empty() => Some(id),
            Value::String(_) | Value::Null => None,
            other => {
                return Err(StoreError::unexpected(
                    StoreCommand::ResolveNodeId.name(),
                    format!("expected an id or null, got {}", other),
                ))
            }
        };

        self.cache.insert(self.lang, aliases, id.clone());
        Ok(id)
    }
}
