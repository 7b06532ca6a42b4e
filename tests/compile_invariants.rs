//! Compiler invariant tests
//!
//! - Compilation is deterministic under the content hash
//! - Same-id nested selections inline into one command
//! - Traversal directions follow the direction table
//! - Validation errors are path-qualified and stop compilation

mod common;

use std::sync::Arc;

use nestquery::bridge::RpnBridge;
use nestquery::compiler::{AliasCache, AliasResolver, CommandKind, CompiledQuery, QueryCompiler, Source};
use nestquery::executor::{direction_for, CommandExecutor, ExecContext, TraversalDirection};
use nestquery::observability::MetricsRegistry;
use nestquery::store::{Store, StoreCommand};
use serde_json::{json, Value};

use common::{schema, ScriptedStore};

// =============================================================================
// Helper Functions
// =============================================================================

async fn compile_with(store: &dyn Store, query: &Value) -> CompiledQuery {
    let cache = AliasCache::new();
    let resolver = AliasResolver::new(store, "en", &cache);
    QueryCompiler::new(schema())
        .compile(query, &resolver)
        .await
        .unwrap()
}

async fn compile(query: &Value) -> CompiledQuery {
    let store = ScriptedStore::rows(json!([]));
    compile_with(store.as_ref(), query).await
}

fn executor() -> CommandExecutor {
    let store = ScriptedStore::rows(json!([]));
    CommandExecutor::new(ExecContext::new(
        store,
        schema(),
        Arc::new(RpnBridge::new()),
        Arc::new(MetricsRegistry::new()),
        "en",
    ))
}

fn field_paths(compiled: &CompiledQuery) -> Vec<String> {
    compiled.commands[0]
        .fields
        .any
        .iter()
        .map(|f| f.wire_key())
        .collect()
}

// =============================================================================
// Determinism
// =============================================================================

/// The same query compiles to hash-equal command lists every time.
#[tokio::test]
async fn test_compile_is_deterministic() {
    let query = json!({
        "$id": "te1",
        "name": true,
        "players": {
            "name": true,
            "$list": {
                "$sort": { "$field": "age", "$order": "desc" },
                "$find": { "$filter": { "$field": "age", "$operator": ">", "$value": 18 } }
            }
        },
        "captain": { "$id": "pe1", "name": true }
    });

    let first = compile(&query).await;
    for _ in 0..20 {
        let again = compile(&query).await;
        assert_eq!(again.cmd_ids(), first.cmd_ids());
        assert_eq!(again, first);
    }
}

/// The content hash ignores where a command's result lands.
#[tokio::test]
async fn test_hash_excludes_target() {
    let a = compile(&json!({ "$id": "te1", "x": { "name": true, "$list": true } })).await;
    let b = compile(&json!({ "$id": "te1", "y": { "name": true, "$list": true } })).await;

    let nested_a = &a.commands[0].nested_commands[0];
    let nested_b = &b.commands[0].nested_commands[0];
    assert_ne!(nested_a.target, nested_b.target);
    assert_eq!(nested_a.cmd_id, nested_b.cmd_id);
    assert_eq!(nested_a.content_hash(), nested_a.cmd_id);
}

/// A different selection is a different command.
#[tokio::test]
async fn test_hash_tracks_selection() {
    let a = compile(&json!({ "$id": "te1", "name": true })).await;
    let b = compile(&json!({ "$id": "te1", "founded": true })).await;
    assert_ne!(a.commands[0].cmd_id, b.commands[0].cmd_id);
}

// =============================================================================
// Merge rule
// =============================================================================

/// Same-id nested objects inline as dotted field paths.
#[tokio::test]
async fn test_same_id_nesting_inlines() {
    let compiled = compile(&json!({ "$id": "te1", "a": { "b": true, "c": true } })).await;

    assert_eq!(compiled.commands.len(), 1);
    assert_eq!(field_paths(&compiled), vec!["a.b", "a.c"]);
    assert!(compiled.commands[0].nested_commands.is_empty());
}

/// A nested node on another id becomes an independent sibling.
#[tokio::test]
async fn test_other_id_is_promoted() {
    let compiled = compile(&json!({ "$id": "te1", "name": true, "captain": { "$id": "pe1", "name": true } })).await;

    assert_eq!(compiled.commands.len(), 2);
    let sibling = &compiled.commands[1];
    assert_eq!(sibling.source, Source::Id("pe1".into()));
    assert_eq!(sibling.target, "captain");
    assert!(compiled.commands[0].nested_commands.is_empty());
}

/// A nested traversal is a nested command, never inlined.
#[tokio::test]
async fn test_traversal_is_nested() {
    let compiled = compile(&json!({ "$id": "te1", "players": { "name": true, "$list": true } })).await;

    let root = &compiled.commands[0];
    assert_eq!(root.nested_commands.len(), 1);
    let nested = &root.nested_commands[0];
    assert_eq!(nested.kind, CommandKind::Traverse);
    assert_eq!(nested.target, "players");
    assert_eq!(nested.source, Source::Id("te1".into()));
}

/// An alias compiles against the id it resolves to.
#[tokio::test]
async fn test_alias_resolves_before_walk() {
    let store = ScriptedStore::new(|command, args| {
        assert_eq!(command, StoreCommand::ResolveNodeId);
        assert_eq!(args[1].as_text(), Some("home"));
        Ok(json!("te1"))
    });
    let compiled = compile_with(store.as_ref(), &json!({ "$alias": "home", "name": true })).await;

    assert_eq!(compiled.commands[0].source, Source::Id("te1".into()));
    assert_eq!(store.calls().len(), 1);
}

// =============================================================================
// Directions
// =============================================================================

#[test]
fn test_direction_table() {
    assert_eq!(direction_for("children", false).0, TraversalDirection::Children);
    assert_eq!(direction_for("children", true).0, TraversalDirection::BfsDescendants);
    assert_eq!(direction_for("parents", false).0, TraversalDirection::Parents);
    assert_eq!(direction_for("parents", true).0, TraversalDirection::BfsAncestors);
    assert_eq!(direction_for("descendants", false).0, TraversalDirection::BfsDescendants);
    assert_eq!(direction_for("ancestors", false).0, TraversalDirection::BfsAncestors);

    let (dir, opt) = direction_for("customEdge", false);
    assert_eq!(dir, TraversalDirection::EdgeField);
    assert_eq!(opt, "customEdge");
    assert_eq!(direction_for("customEdge", true).0, TraversalDirection::BfsEdgeField);
}

/// The compiled recursion flag reaches the wire struct.
#[tokio::test]
async fn test_recursive_children_on_the_wire() {
    let compiled = compile(&json!({
        "$id": "te1",
        "flat": { "name": true, "$list": { "$find": { "$traverse": "children" } } },
        "deep": { "name": true, "$list": { "$find": { "$traverse": "children", "$recursive": true } } },
        "edge": { "name": true, "$list": { "$find": { "$traverse": "customEdge" } } }
    }))
    .await;

    let executor = executor();
    let dirs: Vec<(String, TraversalDirection, String)> = compiled.commands[0]
        .nested_commands
        .iter()
        .map(|c| {
            let (args, _, _) = executor.wire(c).unwrap();
            (c.target.clone(), args.dir, args.dir_opt_str)
        })
        .collect();

    assert!(dirs.contains(&("flat".into(), TraversalDirection::Children, String::new())));
    assert!(dirs.contains(&("deep".into(), TraversalDirection::BfsDescendants, String::new())));
    assert!(dirs.contains(&("edge".into(), TraversalDirection::EdgeField, "customEdge".into())));
}

// =============================================================================
// Rejection
// =============================================================================

/// Misplaced directives fail the whole compile with a dotted path.
#[tokio::test]
async fn test_validation_error_is_path_qualified() {
    let store = ScriptedStore::rows(json!([]));
    let cache = AliasCache::new();
    let resolver = AliasResolver::new(store.as_ref(), "en", &cache);
    let err = QueryCompiler::new(schema())
        .compile(&json!({ "$id": "te1", "players": { "$list": { "$filter": {} } } }), &resolver)
        .await
        .unwrap_err();

    assert_eq!(err.code(), "NQ_QUERY_INVALID");
    assert!(err.to_string().starts_with("Query error: "));
    assert!(err.to_string().ends_with("at \"players.$list.$filter\""));
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_aggregate_rejected() {
    let store = ScriptedStore::rows(json!([]));
    let cache = AliasCache::new();
    let resolver = AliasResolver::new(store.as_ref(), "en", &cache);
    let err = QueryCompiler::new(schema())
        .compile(
            &json!({ "$id": "te1", "total": { "$aggregate": { "$function": "median" } } }),
            &resolver,
        )
        .await
        .unwrap_err();

    assert_eq!(err.code(), "NQ_COMPILE_UNKNOWN_AGGREGATE");
}
