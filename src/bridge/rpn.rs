//! Reference RPN bridge
//!
//! Leaves push `field operator value`; a fork of n children pushes n-1
//! `AND` / `OR` tokens after them. Text fields are addressed per language
//! (`title` becomes `title.en`).

use std::collections::BTreeMap;

use serde_json::Value;

use super::{BridgeError, BridgeResult, ExpressionBridge};
use crate::query::{FilterLeaf, FilterNode, Fork};
use crate::schema::{FieldType, Schema};

/// Stack-machine token compiler
#[derive(Debug, Default, Clone)]
pub struct RpnBridge;

impl RpnBridge {
    pub fn new() -> Self {
        Self
    }

    fn push_node(&self, node: &FilterNode, schema: &Schema, lang: &str, out: &mut Vec<String>) -> BridgeResult<()> {
        match node {
            FilterNode::Leaf(leaf) => self.push_leaf(leaf, schema, lang, out),
            FilterNode::Fork(fork) => self.push_fork(fork, schema, lang, out),
        }
    }

    fn push_fork(&self, fork: &Fork, schema: &Schema, lang: &str, out: &mut Vec<String>) -> BridgeResult<()> {
        for child in &fork.children {
            self.push_node(child, schema, lang, out)?;
        }
        let op = if fork.is_or { "OR" } else { "AND" };
        for _ in 1..fork.children.len() {
            out.push(op.to_string());
        }
        Ok(())
    }

    fn push_leaf(&self, leaf: &FilterLeaf, schema: &Schema, lang: &str, out: &mut Vec<String>) -> BridgeResult<()> {
        out.push(field_token(&leaf.field, schema, lang));
        out.push(leaf.operator.as_str().to_string());
        if !leaf.operator.is_unary() {
            out.push(value_token(&leaf.field, &leaf.value)?);
        }
        Ok(())
    }
}

fn is_text_field(path: &str, schema: &Schema) -> bool {
    std::iter::once(&schema.root_type)
        .chain(schema.types.values())
        .any(|t| matches!(t.field(path), Some(FieldType::Text)))
}

fn field_token(path: &str, schema: &Schema, lang: &str) -> String {
    if is_text_field(path, schema) {
        format!("{}.{}", path, lang)
    } else {
        path.to_string()
    }
}

fn value_token(field: &str, value: &Value) -> BridgeResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Null => Err(BridgeError::InvalidValue {
            field: field.to_string(),
            detail: "missing $value".to_string(),
        }),
        other => Ok(other.to_string()),
    }
}

impl ExpressionBridge for RpnBridge {
    fn compile_filter(&self, filter: &Fork, schema: &Schema, lang: &str) -> BridgeResult<Vec<String>> {
        let mut out = Vec::new();
        self.push_fork(filter, schema, lang, &mut out)?;
        Ok(out)
    }

    fn compile_field_selection(
        &self,
        by_type: &BTreeMap<String, String>,
        schema: &Schema,
        lang: &str,
    ) -> BridgeResult<String> {
        let mut clauses = Vec::with_capacity(by_type.len());
        for (type_name, paths) in by_type {
            let prefix = if type_name == "$any" {
                "*".to_string()
            } else {
                schema
                    .type_schema(type_name)
                    .map(|t| t.prefix.clone())
                    .ok_or_else(|| BridgeError::UnknownType(type_name.clone()))?
            };
            let fields: Vec<String> = paths
                .lines()
                .filter(|p| !p.is_empty())
                .map(|p| field_token(p, schema, lang))
                .collect();
            clauses.push(format!("{}:{}", prefix, fields.join(",")));
        }
        Ok(clauses.join(";"))
    }
}
