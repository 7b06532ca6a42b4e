//! Shared fixtures for integration tests
//!
//! `ScriptedStore` records every call and answers from a closure, so each
//! suite scripts exactly the replies it needs.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use nestquery::executor::FindArgs;
use nestquery::query::NowExpr;
use nestquery::schema::{Schema, SchemaLoader};
use nestquery::store::{Arg, Store, StoreCommand, StoreFuture, StoreResult};
use serde_json::{json, Value};

pub const SCHEMA: &str = r#"{
    "languages": ["en", "de"],
    "types": {
        "team": {
            "prefix": "te",
            "fields": {
                "name": { "type": "string" },
                "founded": { "type": "integer" },
                "captain": { "type": "reference" }
            }
        },
        "person": {
            "prefix": "pe",
            "fields": {
                "name": { "type": "string" },
                "age": { "type": "integer" },
                "expiresAt": { "type": "timestamp" }
            }
        }
    }
}"#;

pub fn schema() -> Arc<Schema> {
    Arc::new(SchemaLoader::load_str(SCHEMA).unwrap())
}

/// One recorded store call
#[derive(Debug, Clone)]
pub struct Call {
    pub command: StoreCommand,
    pub args: Vec<Arg>,
}

impl Call {
    pub fn texts(&self) -> Vec<String> {
        self.args
            .iter()
            .filter_map(|a| a.as_text().map(str::to_string))
            .collect()
    }

    /// The wire struct carried by a find, aggregate or marker call
    pub fn find_args(&self) -> Option<FindArgs> {
        let bytes = self.args.iter().find_map(Arg::as_bytes)?;
        FindArgs::decode(bytes).ok()
    }

    /// Wire struct, node ids and RPN tokens, the part a marker must mirror
    pub fn read_shape(&self) -> (Vec<u8>, Vec<String>) {
        let bytes = self
            .args
            .iter()
            .find_map(Arg::as_bytes)
            .map(<[u8]>::to_vec)
            .unwrap_or_default();
        // ids and RPN tokens follow the wire struct
        let after_wire = match self.command {
            StoreCommand::SubscriptionsAdd => 3,
            _ => 2,
        };
        let rest = self
            .args
            .iter()
            .skip(after_wire)
            .filter_map(|a| a.as_text().map(str::to_string))
            .collect();
        (bytes, rest)
    }
}

type Handler = dyn Fn(StoreCommand, &[Arg]) -> StoreResult<Value> + Send + Sync;

pub struct ScriptedStore {
    handler: Box<Handler>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedStore {
    pub fn new(
        handler: impl Fn(StoreCommand, &[Arg]) -> StoreResult<Value> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Answers every read with `rows` and every other call with `1`
    pub fn rows(rows: Value) -> Arc<Self> {
        Self::new(move |command, _| {
            Ok(match command {
                StoreCommand::HierarchyFind => rows.clone(),
                StoreCommand::ResolveNodeId => Value::Null,
                _ => json!(1),
            })
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, command: StoreCommand) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.command == command)
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl Store for ScriptedStore {
    fn command(&self, command: StoreCommand, args: Vec<Arg>) -> StoreFuture<'_> {
        let reply = (self.handler)(command, &args);
        self.calls.lock().unwrap().push(Call { command, args });
        Box::pin(async move { reply })
    }
}

/// Node id argument of a read call
pub fn node_ids(call: &Call) -> String {
    let index = match call.command {
        StoreCommand::SubscriptionsAdd => 3,
        _ => 2,
    };
    call.args
        .get(index)
        .and_then(Arg::as_text)
        .unwrap_or_default()
        .to_string()
}

/// RPN tokens of a find call
pub fn rpn_tokens(call: &Call) -> Vec<String> {
    call.args
        .iter()
        .skip(3)
        .filter_map(|a| a.as_text().map(str::to_string))
        .collect()
}

/// Evaluates filter tokens against one item; now values resolve at `now_ms`
pub fn rpn_matches(tokens: &[String], item: &Value, now_ms: i64) -> bool {
    let mut stack: Vec<bool> = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        match tokens[i].as_str() {
            op @ ("AND" | "OR") => {
                let rhs = stack.pop().unwrap_or(false);
                let lhs = stack.pop().unwrap_or(false);
                stack.push(if op == "AND" { lhs && rhs } else { lhs || rhs });
                i += 1;
            }
            field => {
                let actual = item.get(field);
                match tokens[i + 1].as_str() {
                    "exists" => {
                        stack.push(actual.is_some());
                        i += 2;
                    }
                    "notExists" => {
                        stack.push(actual.is_none());
                        i += 2;
                    }
                    op => {
                        stack.push(compare(actual, op, &tokens[i + 2], now_ms));
                        i += 3;
                    }
                }
            }
        }
    }
    stack.pop().unwrap_or(true)
}

fn compare(actual: Option<&Value>, op: &str, raw: &str, now_ms: i64) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    if let Some(a) = actual.as_i64() {
        let expected = NowExpr::parse(raw)
            .map(|n| n.resolve(now_ms))
            .or_else(|| raw.parse().ok());
        let Some(b) = expected else {
            return false;
        };
        return match op {
            "=" => a == b,
            "!=" => a != b,
            ">" => a > b,
            ">=" => a >= b,
            "<" => a < b,
            "<=" => a <= b,
            _ => false,
        };
    }
    match op {
        "=" => actual.as_str() == Some(raw),
        "!=" => actual.as_str() != Some(raw),
        _ => false,
    }
}
