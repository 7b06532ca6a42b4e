//! Filter AST
//!
//! A filter is a boolean tree of `Fork` nodes (`AND` / `OR`) over
//! `FilterLeaf` comparisons. Leaves whose value is a now expression are
//! flagged `has_now` so they can be stripped into a static filter or
//! turned into refresh boundaries.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::{ValidationError, ValidationResult};
use super::now::NowExpr;

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOperator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "..")]
    Range,
    #[serde(rename = "has")]
    Has,
    #[serde(rename = "exists")]
    Exists,
    #[serde(rename = "notExists")]
    NotExists,
    #[serde(rename = "textSearch")]
    TextSearch,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 11] = [
        FilterOperator::Eq,
        FilterOperator::NotEq,
        FilterOperator::Gt,
        FilterOperator::Lt,
        FilterOperator::Gte,
        FilterOperator::Lte,
        FilterOperator::Range,
        FilterOperator::Has,
        FilterOperator::Exists,
        FilterOperator::NotExists,
        FilterOperator::TextSearch,
    ];

    pub fn parse(op: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|o| o.as_str() == op)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::NotEq => "!=",
            FilterOperator::Gt => ">",
            FilterOperator::Lt => "<",
            FilterOperator::Gte => ">=",
            FilterOperator::Lte => "<=",
            FilterOperator::Range => "..",
            FilterOperator::Has => "has",
            FilterOperator::Exists => "exists",
            FilterOperator::NotExists => "notExists",
            FilterOperator::TextSearch => "textSearch",
        }
    }

    /// Operators that take no `$value`
    pub fn is_unary(&self) -> bool {
        matches!(self, FilterOperator::Exists | FilterOperator::NotExists)
    }

    /// The operator selecting exactly the nodes this one rejects
    pub fn complement(&self) -> Option<Self> {
        match self {
            FilterOperator::Eq => Some(FilterOperator::NotEq),
            FilterOperator::NotEq => Some(FilterOperator::Eq),
            FilterOperator::Gt => Some(FilterOperator::Lte),
            FilterOperator::Lte => Some(FilterOperator::Gt),
            FilterOperator::Lt => Some(FilterOperator::Gte),
            FilterOperator::Gte => Some(FilterOperator::Lt),
            FilterOperator::Exists => Some(FilterOperator::NotExists),
            FilterOperator::NotExists => Some(FilterOperator::Exists),
            _ => None,
        }
    }
}

/// One comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterLeaf {
    pub field: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: Value,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub has_now: bool,
}

impl FilterLeaf {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        let has_now = NowExpr::is_now_value(&value);
        Self {
            field: field.into(),
            operator,
            value,
            has_now,
        }
    }
}

/// A filter tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterNode {
    Leaf(FilterLeaf),
    Fork(Fork),
}

impl FilterNode {
    fn has_now(&self) -> bool {
        match self {
            FilterNode::Leaf(leaf) => leaf.has_now,
            FilterNode::Fork(fork) => fork.has_now(),
        }
    }

    fn without_now(&self) -> Option<FilterNode> {
        match self {
            FilterNode::Leaf(leaf) if leaf.has_now => None,
            FilterNode::Leaf(leaf) => Some(FilterNode::Leaf(leaf.clone())),
            FilterNode::Fork(fork) => fork.without_now().map(FilterNode::Fork),
        }
    }
}

/// A time-relative bound on one field
#[derive(Debug, Clone, PartialEq)]
pub struct NowBoundary {
    pub field: String,
    /// One of `>`, `>=`, `<`, `<=`
    pub operator: FilterOperator,
    pub now: NowExpr,
}

/// Boolean combination of filter nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fork {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_or: bool,
    pub children: Vec<FilterNode>,
}

impl Fork {
    /// Conjunction of nodes
    pub fn all(children: Vec<FilterNode>) -> Self {
        Self {
            is_or: false,
            children,
        }
    }

    /// Disjunction of nodes
    pub fn any(children: Vec<FilterNode>) -> Self {
        Self {
            is_or: true,
            children,
        }
    }

    /// Parses a raw `$filter` value (object leaf or array of leaves)
    pub fn parse(raw: &Value, path: &str) -> ValidationResult<Self> {
        match Self::parse_node(raw, path)? {
            FilterNode::Fork(fork) => Ok(fork),
            leaf @ FilterNode::Leaf(_) => Ok(Fork::all(vec![leaf])),
        }
    }

    fn parse_node(raw: &Value, path: &str) -> ValidationResult<FilterNode> {
        match raw {
            Value::Array(items) => {
                let mut children = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    children.push(Self::parse_node(item, &format!("{}.{}", path, i))?);
                }
                Ok(FilterNode::Fork(Fork::all(children)))
            }
            Value::Object(obj) => {
                let field = obj
                    .get("$field")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ValidationError::new("$filter requires a $field", path))?;
                let op_raw = obj
                    .get("$operator")
                    .and_then(Value::as_str)
                    .ok_or_else(|| ValidationError::new("$filter requires an $operator", path))?;
                let operator = FilterOperator::parse(op_raw).ok_or_else(|| {
                    ValidationError::new(
                        format!("Unknown $operator '{}'", op_raw),
                        format!("{}.$operator", path),
                    )
                })?;
                let value = obj.get("$value").cloned().unwrap_or(Value::Null);

                let mut node = FilterNode::Leaf(FilterLeaf::new(field, operator, value));
                if let Some(and) = obj.get("$and") {
                    let rhs = Self::parse_node(and, &format!("{}.$and", path))?;
                    node = FilterNode::Fork(Fork::all(vec![node, rhs]));
                }
                if let Some(or) = obj.get("$or") {
                    let rhs = Self::parse_node(or, &format!("{}.$or", path))?;
                    node = FilterNode::Fork(Fork::any(vec![node, rhs]));
                }
                Ok(node)
            }
            _ => Err(ValidationError::new(
                "$filter must be an object or an array of objects",
                path,
            )),
        }
    }

    /// Whether any leaf is now-relative
    pub fn has_now(&self) -> bool {
        self.children.iter().any(FilterNode::has_now)
    }

    /// The same tree with every now-relative leaf taken as true
    ///
    /// Returns `None` when the tree reduces to true: an `AND` with nothing
    /// left, or an `OR` with any branch that reduced to true.
    pub fn without_now(&self) -> Option<Fork> {
        let mut children = Vec::with_capacity(self.children.len());
        for child in &self.children {
            match child.without_now() {
                Some(node) => children.push(node),
                None if self.is_or => return None,
                None => {}
            }
        }
        if children.is_empty() {
            None
        } else {
            Some(Fork {
                is_or: self.is_or,
                children,
            })
        }
    }

    /// All now-relative bounds in the tree
    ///
    /// A range with now-relative ends contributes one `>=` and one `<=` bound.
    pub fn now_boundaries(&self) -> Vec<NowBoundary> {
        let mut out = Vec::new();
        self.collect_boundaries(&mut out);
        out
    }

    fn collect_boundaries(&self, out: &mut Vec<NowBoundary>) {
        for child in &self.children {
            match child {
                FilterNode::Fork(fork) => fork.collect_boundaries(out),
                FilterNode::Leaf(leaf) if leaf.has_now => push_leaf_boundaries(leaf, out),
                FilterNode::Leaf(_) => {}
            }
        }
    }

    /// `self AND node`
    pub fn and_leaf(self, leaf: FilterLeaf) -> Fork {
        Fork::all(vec![FilterNode::Fork(self), FilterNode::Leaf(leaf)])
    }
}

fn push_leaf_boundaries(leaf: &FilterLeaf, out: &mut Vec<NowBoundary>) {
    let now_of = |v: &Value| v.as_str().and_then(NowExpr::parse);
    match leaf.operator {
        FilterOperator::Gt | FilterOperator::Gte | FilterOperator::Lt | FilterOperator::Lte => {
            if let Some(now) = now_of(&leaf.value) {
                out.push(NowBoundary {
                    field: leaf.field.clone(),
                    operator: leaf.operator,
                    now,
                });
            }
        }
        FilterOperator::Range => {
            if let Some([start, end]) = leaf.value.as_array().map(Vec::as_slice) {
                if let Some(now) = now_of(start) {
                    out.push(NowBoundary {
                        field: leaf.field.clone(),
                        operator: FilterOperator::Gte,
                        now,
                    });
                }
                if let Some(now) = now_of(end) {
                    out.push(NowBoundary {
                        field: leaf.field.clone(),
                        operator: FilterOperator::Lte,
                        now,
                    });
                }
            }
        }
        _ => {}
    }
}
