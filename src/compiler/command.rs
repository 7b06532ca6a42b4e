//! Compiled command model
//!
//! A `Command` is one unit of store work. Commands form a tree: the
//! top-level commands of a `CompiledQuery` carry `nested_commands` that
//! depend on them, and an `Ids` command carries the `nested_find` it seeds.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use super::errors::{CompileError, CompileResult};
use crate::query::Fork;

/// What a command produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    /// Fields of one node
    Node,
    /// Rows of the traversed set
    Traverse,
    /// One number over the traversed set
    Aggregate,
    /// Ids of the traversed set, feeding `nested_find`
    Ids,
}

/// Where a command starts
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Source {
    Id(String),
    /// Filled at run time when seeded by an `Ids` phase
    IdList(Vec<String>),
    /// Alias candidates that did not resolve to a node
    Alias(Vec<String>),
}

impl Source {
    pub fn node_ids(&self) -> Vec<String> {
        match self {
            Source::Id(id) => vec![id.clone()],
            Source::IdList(ids) => ids.clone(),
            Source::Alias(_) => Vec::new(),
        }
    }

    pub fn is_unresolved(&self) -> bool {
        matches!(self, Source::Alias(_))
    }
}

/// Which edges a traversal follows
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TraverseSource {
    /// A named edge field (`children`, `parents`, `descendants`, ... or a custom one)
    SourceField(String),
    /// Candidate edges per concrete type (`$any` for every type)
    TraverseExpr(BTreeMap<String, Vec<String>>),
    /// Explicit node ids
    IdList(Vec<String>),
}

/// `$inherit` options of a field
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct InheritOptions {
    /// Ancestor types to inherit from; empty means any
    pub types: Vec<String>,
    /// Deep-merge object values from every ancestor
    pub merge: bool,
}

/// One selection leaf
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Field {
    /// Output path relative to the command target
    pub path: String,
    /// Source paths when they differ from `path`; alternatives in order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub exclude: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherit: Option<InheritOptions>,
}

impl Field {
    pub fn select(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            sources: Vec::new(),
            exclude: false,
            inherit: None,
        }
    }

    pub fn exclude(path: impl Into<String>) -> Self {
        Self {
            exclude: true,
            ..Self::select(path)
        }
    }

    pub fn aliased(path: impl Into<String>, sources: Vec<String>) -> Self {
        let path = path.into();
        let sources = if sources.len() == 1 && sources[0] == path {
            Vec::new()
        } else {
            sources
        };
        Self {
            sources,
            ..Self::select(path)
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.path == "*" || self.path.ends_with(".*")
    }

    /// `path`, `!path`, `out@src` or `out@a|b`
    pub fn wire_key(&self) -> String {
        if self.exclude {
            format!("!{}", self.path)
        } else if self.sources.is_empty() {
            self.path.clone()
        } else {
            format!("{}@{}", self.path, self.sources.join("|"))
        }
    }
}

/// Field selection of a command
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct FieldSelection {
    /// Fields selected on every node
    pub any: Vec<Field>,
    /// Extra fields per concrete type (`$fieldsByType`)
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub by_type: BTreeMap<String, Vec<Field>>,
}

impl FieldSelection {
    pub fn is_empty(&self) -> bool {
        self.any.is_empty() && self.by_type.is_empty()
    }

    pub fn has_inherit(&self) -> bool {
        self.iter().any(|f| f.inherit.is_some())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.any.iter().chain(self.by_type.values().flatten())
    }

    /// Enforces the wildcard rule on one list: exclusions survive only next
    /// to a wildcard, and a path is never both selected and excluded.
    pub(crate) fn normalize(fields: &mut Vec<Field>) {
        let has_wildcard = fields.iter().any(|f| !f.exclude && f.is_wildcard());
        let excluded: Vec<String> = fields
            .iter()
            .filter(|f| f.exclude)
            .map(|f| f.path.clone())
            .collect();
        fields.retain(|f| {
            if f.exclude {
                has_wildcard
            } else {
                !excluded.contains(&f.path)
            }
        });
        let mut seen = Vec::with_capacity(fields.len());
        fields.retain(|f| {
            let key = f.wire_key();
            if seen.contains(&key) {
                false
            } else {
                seen.push(key);
                true
            }
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

/// `limit` of -1 means unlimited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Paging {
    pub limit: i64,
    pub offset: i64,
}

impl Paging {
    pub const UNLIMITED: Paging = Paging {
        limit: -1,
        offset: 0,
    };

    pub const SINGLE: Paging = Paging {
        limit: 1,
        offset: 0,
    };
}

impl Default for Paging {
    fn default() -> Self {
        Self::UNLIMITED
    }
}

/// Closed set of aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AggregateFunction {
    Count,
    CountUnique,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFunction {
    pub fn parse(name: &str) -> CompileResult<Self> {
        match name {
            "count" => Ok(AggregateFunction::Count),
            "countUnique" => Ok(AggregateFunction::CountUnique),
            "sum" => Ok(AggregateFunction::Sum),
            "avg" => Ok(AggregateFunction::Avg),
            "min" => Ok(AggregateFunction::Min),
            "max" => Ok(AggregateFunction::Max),
            other => Err(CompileError::unknown_aggregate(other)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::CountUnique => "countUnique",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Aggregate {
    pub function: AggregateFunction,
    /// Field arguments (`sum`, `avg`, `min`, `max`, `countUnique`)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

/// A value applied to `path` when the store returned nothing there
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefaultValue {
    /// Relative to the command target (or to each row of a traversal)
    pub path: String,
    pub value: Value,
}

/// One unit of store work
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub kind: CommandKind,
    pub source: Source,
    /// Set for every kind except `Node`
    pub traverse: Option<TraverseSource>,
    pub recursive: bool,
    pub fields: FieldSelection,
    pub filter: Option<Fork>,
    pub sort: Option<Sort>,
    pub paging: Paging,
    pub aggregate: Option<Aggregate>,
    /// A node-level `$find`: the result is the first row, not an array
    pub single: bool,
    pub defaults: Vec<DefaultValue>,

    /// Dotted result path; `""` is the result root
    pub target: String,
    pub cmd_id: u64,
    /// Set when a same-id nested node was kept as its own command
    pub nested_path: Option<String>,
    pub nested_commands: Vec<Command>,
    pub nested_find: Option<Box<Command>>,
}

#[derive(Serialize)]
struct Fingerprint<'a> {
    kind: CommandKind,
    source: &'a Source,
    traverse: &'a Option<TraverseSource>,
    recursive: bool,
    fields: &'a FieldSelection,
    filter: &'a Option<Fork>,
    sort: &'a Option<Sort>,
    paging: Paging,
    aggregate: &'a Option<Aggregate>,
    single: bool,
    defaults: &'a [DefaultValue],
}

impl Command {
    pub fn node(source: Source, target: impl Into<String>) -> Self {
        Self {
            kind: CommandKind::Node,
            source,
            traverse: None,
            recursive: false,
            fields: FieldSelection::default(),
            filter: None,
            sort: None,
            paging: Paging::SINGLE,
            aggregate: None,
            single: true,
            defaults: Vec::new(),
            target: target.into(),
            cmd_id: 0,
            nested_path: None,
            nested_commands: Vec::new(),
            nested_find: None,
        }
    }

    pub fn traversal(
        kind: CommandKind,
        source: Source,
        traverse: TraverseSource,
        target: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            traverse: Some(traverse),
            single: false,
            paging: Paging::UNLIMITED,
            ..Self::node(source, target)
        }
    }

    /// Content hash over everything except `target`, `cmd_id` and nested commands
    pub fn content_hash(&self) -> u64 {
        let fingerprint = Fingerprint {
            kind: self.kind,
            source: &self.source,
            traverse: &self.traverse,
            recursive: self.recursive,
            fields: &self.fields,
            filter: &self.filter,
            sort: &self.sort,
            paging: self.paging,
            aggregate: &self.aggregate,
            single: self.single,
            defaults: &self.defaults,
        };
        // Serializing these plain data types cannot fail
        let bytes = serde_json::to_vec(&fingerprint).unwrap_or_default();
        let digest = Sha256::digest(&bytes);
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(head)
    }

    /// Recomputes `cmd_id` here and in every dependent command
    pub fn seal(&mut self) {
        if let Some(inner) = self.nested_find.as_mut() {
            inner.seal();
        }
        for nested in &mut self.nested_commands {
            nested.seal();
        }
        for list in std::iter::once(&mut self.fields.any).chain(self.fields.by_type.values_mut()) {
            FieldSelection::normalize(list);
        }
        self.cmd_id = self.content_hash();
    }

    /// Whether the filter of this command, or of any phase it seeds, is now-relative
    pub fn has_now(&self) -> bool {
        self.filter.as_ref().map(Fork::has_now).unwrap_or(false)
            || self.nested_find.as_ref().map(|c| c.has_now()).unwrap_or(false)
    }

    /// This command and every command below it, depth first
    pub fn walk(&self) -> Vec<&Command> {
        let mut out = vec![self];
        if let Some(inner) = &self.nested_find {
            out.extend(inner.walk());
        }
        for nested in &self.nested_commands {
            out.extend(nested.walk());
        }
        out
    }
}

/// Output of one compile call
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    /// Root command first, then promoted siblings
    pub commands: Vec<Command>,
    /// `$language` of the query, if any
    pub language: Option<String>,
}

impl CompiledQuery {
    pub fn root(&self) -> CompileResult<&Command> {
        self.commands
            .first()
            .ok_or_else(|| CompileError::malformed_target("", "query compiled to no commands"))
    }

    /// Every command id in the query, depth first
    pub fn cmd_ids(&self) -> Vec<u64> {
        self.commands
            .iter()
            .flat_map(Command::walk)
            .map(|c| c.cmd_id)
            .collect()
    }
}
