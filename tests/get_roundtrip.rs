//! Read path tests
//!
//! Queries go through `Client::get` against a scripted store:
//! - rows decode against the schema of the node's own type
//! - nested commands merge back at their target path
//! - dependent phases run in order, independent ones all run

mod common;

use nestquery::client::Client;
use nestquery::config::ClientConfig;
use nestquery::executor::{FindArgs, ResultType, TraversalDirection};
use nestquery::store::{Arg, StoreCommand, StoreError, StoreResult};
use serde_json::{json, Value};

use common::{node_ids, schema, Call, ScriptedStore};

// =============================================================================
// Helper Functions
// =============================================================================

fn client(store: std::sync::Arc<ScriptedStore>) -> Client {
    Client::new(store, schema(), ClientConfig::default())
}

/// Keeps only the selected keys of each row, as the store does
fn selected(find: &FindArgs, rows: Value) -> Value {
    let lines: Vec<&str> = find.res_opt_str.split('\n').collect();
    let Value::Array(rows) = rows else {
        return rows;
    };
    let rows = rows
        .into_iter()
        .map(|row| {
            let id = row[0].clone();
            let pairs: Vec<Value> = row[1]
                .as_array()
                .cloned()
                .unwrap_or_default()
                .chunks(2)
                .filter(|pair| pair[0].as_str().map(|k| lines.contains(&k)).unwrap_or(false))
                .flat_map(|pair| pair.to_vec())
                .collect();
            json!([id, pairs])
        })
        .collect();
    Value::Array(rows)
}

/// A small team with two players
fn league(command: StoreCommand, args: &[Arg]) -> StoreResult<Value> {
    let call = Call {
        command,
        args: args.to_vec(),
    };
    let ids = node_ids(&call);
    match command {
        StoreCommand::HierarchyAggregate => Ok(json!(2)),
        StoreCommand::HierarchyFind => {
            let find = call.find_args().unwrap();
            let rows = match (find.dir, find.res_type) {
                (_, ResultType::Ids) => return Ok(json!(["pe1", "pe2"])),
                (TraversalDirection::Children, _) => json!([
                    ["pe1", ["name", "Ann", "age", 31]],
                    ["pe2", ["name", "Bob", "age", "28"]]
                ]),
                (TraversalDirection::Parents, _) => json!([["te1", ["name", "Reds"]]]),
                (TraversalDirection::Node, _) if ids == "te1" => {
                    json!([["te1", ["name", "Reds", "founded", 1901.0]]])
                }
                (TraversalDirection::Node, _) if ids == "pe1" => {
                    json!([["pe1", ["name", "Ann", "age", 31]]])
                }
                _ => json!([]),
            };
            Ok(selected(&find, rows))
        }
        StoreCommand::ResolveNodeId => Ok(Value::Null),
        _ => Ok(json!(1)),
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// A flat field array decodes into an object typed by the schema.
#[tokio::test]
async fn test_row_decodes_by_schema() {
    let store = ScriptedStore::rows(json!([["pe9", ["name", "Olli", "age", 4]]]));
    let value = client(store)
        .get(&json!({ "$id": "pe9", "name": true, "age": true }))
        .await
        .unwrap();
    assert_eq!(value, json!({ "name": "Olli", "age": 4 }));
}

/// Integral fields accept whole floats; defaults fill absent paths.
#[tokio::test]
async fn test_coercion_and_defaults() {
    let store = ScriptedStore::new(league);
    let value = client(store)
        .get(&json!({
            "$id": "te1",
            "name": true,
            "founded": true,
            "motto": { "$default": "none" }
        }))
        .await
        .unwrap();
    assert_eq!(value, json!({ "name": "Reds", "founded": 1901, "motto": "none" }));
}

/// `$field` renames a value without changing its type.
#[tokio::test]
async fn test_aliased_field() {
    let store = ScriptedStore::rows(json!([["te1", ["title@name", "Reds"]]]));
    let value = client(store.clone())
        .get(&json!({ "$id": "te1", "title": { "$field": "name" } }))
        .await
        .unwrap();
    assert_eq!(value, json!({ "title": "Reds" }));

    let find = store.calls_of(StoreCommand::HierarchyFind)[0].find_args().unwrap();
    assert_eq!(find.res_opt_str, "title@name");
}

/// An inline-dereferenced reference carries the referenced node's fields.
#[tokio::test]
async fn test_inline_reference() {
    let store = ScriptedStore::rows(json!([["te1", ["captain", ["pe1", ["name", "Ann"]]]]]));
    let value = client(store)
        .get(&json!({ "$id": "te1", "captain": { "name": true } }))
        .await
        .unwrap();
    assert_eq!(value, json!({ "captain": { "id": "pe1", "name": "Ann" } }));
}

// =============================================================================
// Assembly
// =============================================================================

/// Root, nested traversal, promoted sibling and aggregate land at their paths.
#[tokio::test]
async fn test_nested_shape_is_rebuilt() {
    let store = ScriptedStore::new(league);
    let value = client(store.clone())
        .get(&json!({
            "$id": "te1",
            "name": true,
            "players": { "name": true, "age": true, "$list": true },
            "captain": { "$id": "pe1", "name": true },
            "size": { "$aggregate": { "$function": "count" } }
        }))
        .await
        .unwrap();

    assert_eq!(
        value,
        json!({
            "name": "Reds",
            "players": [
                { "name": "Ann", "age": 31 },
                { "name": "Bob", "age": 28 }
            ],
            "captain": { "name": "Ann" },
            "size": 2
        })
    );
    assert_eq!(store.calls_of(StoreCommand::HierarchyFind).len(), 3);
    assert_eq!(store.calls_of(StoreCommand::HierarchyAggregate).len(), 1);
    assert!(store.calls_of(StoreCommand::SubscriptionsAdd).is_empty());
}

/// Filter then re-traverse: the second phase starts from the first phase's ids.
#[tokio::test]
async fn test_two_phase_nested_find() {
    let store = ScriptedStore::new(league);
    let value = client(store.clone())
        .get(&json!({
            "$id": "te1",
            "clubs": {
                "name": true,
                "$list": {
                    "$find": {
                        "$traverse": "children",
                        "$filter": { "$field": "age", "$operator": ">", "$value": 18 },
                        "$find": { "$traverse": "parents" }
                    }
                }
            }
        }))
        .await
        .unwrap();

    assert_eq!(value, json!({ "clubs": [{ "name": "Reds" }] }));

    let finds = store.calls_of(StoreCommand::HierarchyFind);
    let phases: Vec<(TraversalDirection, ResultType, String)> = finds
        .iter()
        .filter(|c| node_ids(c) != "te1" || c.find_args().unwrap().dir != TraversalDirection::Node)
        .map(|c| {
            let args = c.find_args().unwrap();
            (args.dir, args.res_type, node_ids(c))
        })
        .collect();
    assert_eq!(
        phases,
        vec![
            (TraversalDirection::Children, ResultType::Ids, "te1".to_string()),
            (TraversalDirection::Parents, ResultType::Fields, "pe1,pe2".to_string()),
        ]
    );
    // the filter travels with the first phase only
    assert_eq!(finds.iter().filter(|c| c.texts().contains(&">".to_string())).count(), 1);
}

/// An alias that names no node yields an empty result without reads.
#[tokio::test]
async fn test_unresolved_alias_is_empty() {
    let store = ScriptedStore::new(league);
    let value = client(store.clone())
        .get(&json!({ "$alias": ["nowhere", "gone"], "name": true }))
        .await
        .unwrap();

    assert_eq!(value, json!({}));
    assert_eq!(store.calls_of(StoreCommand::ResolveNodeId).len(), 1);
    assert!(store.calls_of(StoreCommand::HierarchyFind).is_empty());
}

/// A rejected store call aborts the whole read.
#[tokio::test]
async fn test_store_rejection_propagates() {
    let store = ScriptedStore::new(|command, args| match command {
        StoreCommand::HierarchyAggregate => Err(StoreError::Rejected {
            command: command.name().to_string(),
            message: "index offline".into(),
        }),
        _ => league(command, args),
    });
    let err = client(store)
        .get(&json!({
            "$id": "te1",
            "name": true,
            "size": { "$aggregate": { "$function": "count" } }
        }))
        .await
        .unwrap_err();

    assert_eq!(err.code(), "NQ_STORE_REJECTED");
    assert!(err.to_string().contains("index offline"));
}
