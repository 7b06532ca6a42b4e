//! Query compiler
//!
//! Compilation runs in three steps:
//! 1. the validation pre-pass over the raw query,
//! 2. concurrent resolution of every `$alias` in the query,
//! 3. a depth-first walk producing the command tree.
//!
//! The walk applies the merge rule: a nested node on the same id as its
//! parent is inlined into the parent's field list; a nested traversal
//! becomes a nested command merged back by path; a nested node on another
//! id is promoted to an independent top-level command.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures_util::future::try_join_all;
use serde_json::{Map, Value};

use super::alias::AliasResolver;
use super::command::{
    Aggregate, AggregateFunction, Command, CommandKind, CompiledQuery, DefaultValue, Field,
    InheritOptions, Paging, Sort, SortDirection, Source, TraverseSource,
};
use super::errors::{CompileError, CompileResult};
use crate::query::{Directive, Fork, QueryKey, QueryValidator};
use crate::schema::{Schema, ROOT_ID};

const DEFAULT_TRAVERSAL: &str = "children";

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn strings(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn alias_key(aliases: &[String]) -> String {
    aliases.join("\u{1f}")
}

fn collect_aliases(value: &Value, out: &mut Vec<Vec<String>>) {
    match value {
        Value::Object(obj) => {
            for (key, child) in obj {
                match key.as_str() {
                    "$alias" => {
                        let aliases = strings(child);
                        if !aliases.is_empty() && !out.contains(&aliases) {
                            out.push(aliases);
                        }
                    }
                    "$filter" | "$default" => {}
                    _ => collect_aliases(child, out),
                }
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_aliases(item, out)),
        _ => {}
    }
}

fn traversal_of(obj: &Map<String, Value>) -> Option<(Directive, &Value)> {
    [Directive::List, Directive::Find, Directive::Aggregate]
        .into_iter()
        .find_map(|d| obj.get(d.as_str()).map(|body| (d, body)))
}

fn is_leaf_object(obj: &Map<String, Value>) -> bool {
    ["$field", "$default", "$inherit"]
        .iter()
        .any(|k| obj.contains_key(*k))
}

/// A same-id nested node is kept separate when its shape cannot be
/// expressed as prefixed fields of the parent.
fn no_merge(obj: &Map<String, Value>) -> bool {
    obj.contains_key("$all")
        || obj.contains_key("$fieldsByType")
        || obj
            .values()
            .any(|v| v.as_object().map(|o| o.contains_key("$inherit")).unwrap_or(false))
}

/// Compiles raw queries into command trees
pub struct QueryCompiler {
    schema: Arc<Schema>,
}

impl QueryCompiler {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Validates, resolves aliases and walks `query`
    pub async fn compile(
        &self,
        query: &Value,
        resolver: &AliasResolver<'_>,
    ) -> CompileResult<CompiledQuery> {
        QueryValidator::new(&self.schema).validate(query)?;
        let obj = query
            .as_object()
            .ok_or_else(|| CompileError::malformed_target("", "query must be an object"))?;

        let mut aliases = Vec::new();
        collect_aliases(query, &mut aliases);
        let ids = try_join_all(aliases.iter().map(|a| resolver.resolve(a))).await?;
        let resolved: HashMap<String, Option<String>> = aliases
            .iter()
            .map(|a| alias_key(a))
            .zip(ids)
            .collect();

        self.compile_resolved(obj, &resolved)
    }

    /// Walks a validated query whose aliases are already resolved
    pub fn compile_resolved(
        &self,
        obj: &Map<String, Value>,
        resolved: &HashMap<String, Option<String>>,
    ) -> CompileResult<CompiledQuery> {
        let mut walk = Walk {
            schema: &self.schema,
            resolved,
            siblings: Vec::new(),
        };

        let source = walk
            .source_of(obj)?
            .unwrap_or_else(|| Source::Id(ROOT_ID.to_string()));
        let root = walk.build(obj, source, "")?;

        let mut commands = Vec::with_capacity(walk.siblings.len() + 1);
        commands.push(root);
        commands.append(&mut walk.siblings);
        for command in &mut commands {
            command.seal();
        }

        Ok(CompiledQuery {
            commands,
            language: obj
                .get("$language")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

struct Walk<'a> {
    schema: &'a Schema,
    resolved: &'a HashMap<String, Option<String>>,
    siblings: Vec<Command>,
}

impl Walk<'_> {
    fn source_of(&self, obj: &Map<String, Value>) -> CompileResult<Option<Source>> {
        if let Some(id) = obj.get("$id").and_then(Value::as_str) {
            return Ok(Some(Source::Id(id.to_string())));
        }
        let Some(raw) = obj.get("$alias") else {
            return Ok(None);
        };
        let aliases = strings(raw);
        match self.resolved.get(&alias_key(&aliases)) {
            Some(Some(id)) => Ok(Some(Source::Id(id.clone()))),
            Some(None) => Ok(Some(Source::Alias(aliases))),
            None => Err(CompileError::malformed_target(
                aliases.join(","),
                "alias was not resolved before compilation",
            )),
        }
    }

    fn build(&mut self, obj: &Map<String, Value>, source: Source, target: &str) -> CompileResult<Command> {
        if let Some((directive, body)) = traversal_of(obj) {
            return self.traversal(obj, directive, body, source, target);
        }
        let mut command = Command::node(source.clone(), target);
        self.collect(obj, "", "", &mut command, &source, false)?;
        Ok(command)
    }

    /// Collects the fields of `obj` into `command`.
    ///
    /// `out` is the output prefix relative to the command target and `src`
    /// the source prefix on the node; they differ below an inlined node.
    fn collect(
        &mut self,
        obj: &Map<String, Value>,
        out: &str,
        src: &str,
        command: &mut Command,
        ambient: &Source,
        in_traverse: bool,
    ) -> CompileResult<()> {
        for (key, value) in obj {
            match QueryKey::classify(key) {
                QueryKey::Directive(Directive::All) => {
                    if value.as_bool() == Some(true) {
                        command.fields.any.push(Field::aliased(join(out, "*"), vec![join(src, "*")]));
                    }
                }
                QueryKey::Directive(Directive::FieldsByType) => {
                    let by_type = value.as_object().ok_or_else(|| {
                        CompileError::invalid(join(out, key), "$fieldsByType must be an object")
                    })?;
                    for (type_name, selection) in by_type {
                        if type_name != "$any" && self.schema.type_schema(type_name).is_none() {
                            return Err(CompileError::UnknownType(type_name.clone()));
                        }
                        let Some(selection) = selection.as_object() else {
                            continue;
                        };
                        let mut scratch = Command::node(ambient.clone(), command.target.clone());
                        self.collect(selection, out, src, &mut scratch, ambient, true)?;
                        command.defaults.append(&mut scratch.defaults);
                        command
                            .fields
                            .by_type
                            .entry(type_name.clone())
                            .or_default()
                            .append(&mut scratch.fields.any);
                    }
                }
                QueryKey::Directive(d @ (Directive::Field | Directive::Default | Directive::Inherit)) => {
                    return Err(CompileError::invalid(
                        join(&command.target, out),
                        format!("{} must be placed on a field", d),
                    ));
                }
                QueryKey::Directive(_) => {}
                QueryKey::Unknown(k) => {
                    return Err(CompileError::invalid(
                        join(&command.target, &join(out, k)),
                        format!("Unknown directive {}", k),
                    ));
                }
                QueryKey::Field(name) => {
                    let out_path = join(out, name);
                    let src_path = join(src, name);
                    match value {
                        Value::Bool(true) => {
                            command.fields.any.push(Field::aliased(out_path, vec![src_path]))
                        }
                        Value::Bool(false) => command.fields.any.push(Field::exclude(out_path)),
                        Value::Object(child) => {
                            self.child(child, &out_path, &src_path, command, ambient, in_traverse)?
                        }
                        _ => {
                            return Err(CompileError::invalid(
                                join(&command.target, &out_path),
                                "Field value must be a boolean or an object",
                            ))
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn child(
        &mut self,
        child: &Map<String, Value>,
        out_path: &str,
        src_path: &str,
        command: &mut Command,
        ambient: &Source,
        in_traverse: bool,
    ) -> CompileResult<()> {
        let abs_target = join(&command.target, out_path);
        let own = self.source_of(child)?;
        let traversal = traversal_of(child).is_some();

        if in_traverse && (traversal || own.is_some()) {
            return Err(CompileError::invalid(
                abs_target,
                "Nested traversals and $id/$alias cannot be used inside a list or a type selection",
            ));
        }

        match own {
            Some(source) if source != *ambient => {
                let sibling = self.build(child, source, &abs_target)?;
                self.siblings.push(sibling);
            }
            Some(source) if traversal || no_merge(child) => {
                let mut nested = self.build(child, source, &abs_target)?;
                nested.nested_path = Some(abs_target);
                command.nested_commands.push(nested);
            }
            Some(_) => self.collect(child, out_path, "", command, ambient, in_traverse)?,
            None if traversal => {
                let nested = self.build(child, ambient.clone(), &abs_target)?;
                command.nested_commands.push(nested);
            }
            None if is_leaf_object(child) => self.leaf(child, out_path, src_path, command, ambient, in_traverse)?,
            None => self.collect(child, out_path, src_path, command, ambient, in_traverse)?,
        }
        Ok(())
    }

    fn leaf(
        &mut self,
        leaf: &Map<String, Value>,
        out_path: &str,
        src_path: &str,
        command: &mut Command,
        ambient: &Source,
        in_traverse: bool,
    ) -> CompileResult<()> {
        if let Some(value) = leaf.get("$default") {
            command.defaults.push(DefaultValue {
                path: out_path.to_string(),
                value: value.clone(),
            });
        }

        let has_subfields = leaf.keys().any(|k| !k.starts_with('$'));
        if has_subfields {
            let rest: Map<String, Value> = leaf
                .iter()
                .filter(|(k, _)| !k.starts_with('$'))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            return self.collect(&rest, out_path, src_path, command, ambient, in_traverse);
        }

        let sources = match leaf.get("$field") {
            Some(raw) => strings(raw),
            None => vec![src_path.to_string()],
        };
        let mut field = Field::aliased(out_path, sources);
        field.inherit = match leaf.get("$inherit") {
            Some(Value::Bool(true)) => Some(InheritOptions::default()),
            Some(Value::Object(opts)) => Some(InheritOptions {
                types: opts.get("$type").map(strings).unwrap_or_default(),
                merge: opts.get("$merge").and_then(Value::as_bool).unwrap_or(false),
            }),
            _ => None,
        };
        if let Some(opts) = &field.inherit {
            if let Some(missing) = opts.types.iter().find(|t| self.schema.type_schema(t).is_none()) {
                return Err(CompileError::UnknownType(missing.clone()));
            }
        }
        command.fields.any.push(field);
        Ok(())
    }

    fn traversal(
        &mut self,
        obj: &Map<String, Value>,
        directive: Directive,
        body: &Value,
        source: Source,
        target: &str,
    ) -> CompileResult<Command> {
        let here = join(target, directive.as_str());
        let empty = Map::new();
        let body_obj = body.as_object().unwrap_or(&empty);

        let (kind, first_find, single) = match directive {
            Directive::List => (
                CommandKind::Traverse,
                body_obj.get("$find").and_then(Value::as_object),
                false,
            ),
            Directive::Find => (CommandKind::Traverse, Some(body_obj), true),
            Directive::Aggregate => (CommandKind::Aggregate, Some(body_obj), false),
            other => {
                return Err(CompileError::malformed_target(
                    here,
                    format!("{} does not start a traversal", other),
                ))
            }
        };

        let mut levels: Vec<&Map<String, Value>> = Vec::new();
        let mut next = first_find;
        while let Some(level) = next {
            levels.push(level);
            next = level.get("$find").and_then(Value::as_object);
        }

        let chained = levels.len() > 1;
        let terminal_level = levels.last().copied();
        let mut command = Command::traversal(
            kind,
            if chained {
                Source::IdList(Vec::new())
            } else {
                source.clone()
            },
            self.traverse_source(terminal_level, &here)?,
            target,
        );
        command.single = single;
        self.apply_level(&mut command, terminal_level, &here)?;

        command.paging = if single {
            Paging::SINGLE
        } else {
            Paging {
                limit: body_obj.get("$limit").and_then(Value::as_i64).unwrap_or(-1),
                offset: body_obj.get("$offset").and_then(Value::as_i64).unwrap_or(0),
            }
        };
        command.sort = body_obj.get("$sort").map(parse_sort).transpose()?;
        if kind == CommandKind::Aggregate {
            command.aggregate = Some(parse_function(body_obj.get("$function"))?);
        } else {
            self.collect(obj, "", "", &mut command, &source, true)?;
        }

        for (depth, level) in levels.iter().enumerate().rev().skip(1) {
            let level_source = if depth == 0 {
                source.clone()
            } else {
                Source::IdList(Vec::new())
            };
            let mut ids = Command::traversal(
                CommandKind::Ids,
                level_source,
                self.traverse_source(Some(*level), &here)?,
                target,
            );
            self.apply_level(&mut ids, Some(*level), &here)?;
            ids.nested_find = Some(Box::new(command));
            command = ids;
        }

        Ok(command)
    }

    fn apply_level(
        &self,
        command: &mut Command,
        level: Option<&Map<String, Value>>,
        path: &str,
    ) -> CompileResult<()> {
        let Some(level) = level else {
            return Ok(());
        };
        command.recursive = level
            .get("$recursive")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        command.filter = level
            .get("$filter")
            .map(|raw| Fork::parse(raw, &join(path, "$filter")))
            .transpose()?;
        Ok(())
    }

    fn traverse_source(
        &self,
        level: Option<&Map<String, Value>>,
        path: &str,
    ) -> CompileResult<TraverseSource> {
        let raw = level.and_then(|l| l.get("$traverse"));
        match raw {
            None => Ok(TraverseSource::SourceField(DEFAULT_TRAVERSAL.to_string())),
            Some(Value::String(field)) => Ok(TraverseSource::SourceField(field.clone())),
            Some(ids @ Value::Array(_)) => Ok(TraverseSource::IdList(strings(ids))),
            Some(Value::Object(by_type)) => {
                let mut expr = BTreeMap::new();
                for (type_name, edges) in by_type {
                    if type_name != "$any" && self.schema.type_schema(type_name).is_none() {
                        return Err(CompileError::UnknownType(type_name.clone()));
                    }
                    expr.insert(type_name.clone(), strings(edges));
                }
                Ok(TraverseSource::TraverseExpr(expr))
            }
            Some(_) => Err(CompileError::malformed_target(
                join(path, "$traverse"),
                "unsupported traversal",
            )),
        }
    }
}

fn parse_sort(raw: &Value) -> CompileResult<Sort> {
    let field = raw
        .get("$field")
        .and_then(Value::as_str)
        .ok_or_else(|| CompileError::invalid("$sort", "$sort requires a $field"))?;
    let direction = match raw.get("$order").and_then(Value::as_str) {
        Some("desc") => SortDirection::Desc,
        _ => SortDirection::Asc,
    };
    Ok(Sort {
        field: field.to_string(),
        direction,
    })
}

fn parse_function(raw: Option<&Value>) -> CompileResult<Aggregate> {
    match raw {
        None => Ok(Aggregate {
            function: AggregateFunction::Count,
            args: Vec::new(),
        }),
        Some(Value::String(name)) => Ok(Aggregate {
            function: AggregateFunction::parse(name)?,
            args: Vec::new(),
        }),
        Some(Value::Object(spec)) => {
            let name = spec
                .get("$name")
                .and_then(Value::as_str)
                .ok_or_else(|| CompileError::invalid("$function", "$function requires a $name"))?;
            Ok(Aggregate {
                function: AggregateFunction::parse(name)?,
                args: spec.get("$args").map(strings).unwrap_or_default(),
            })
        }
        Some(_) => Err(CompileError::invalid(
            "$function",
            "$function must be a string or an object",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ValidationError;
    use crate::schema::{FieldType, TypeSchema};
    use serde_json::json;

    fn compiler() -> QueryCompiler {
        let mut types = BTreeMap::new();
        types.insert(
            "match".to_string(),
            TypeSchema::new(
                "ma",
                BTreeMap::from([
                    ("title".to_string(), FieldType::Text),
                    ("start".to_string(), FieldType::Timestamp),
                    ("score".to_string(), FieldType::Int),
                ]),
            ),
        );
        types.insert(
            "league".to_string(),
            TypeSchema::new("le", BTreeMap::from([("name".to_string(), FieldType::String)])),
        );
        QueryCompiler::new(Arc::new(Schema::new(vec!["en".into()], types)))
    }

    fn compile(query: Value) -> CompileResult<CompiledQuery> {
        compile_with(query, HashMap::new())
    }

    fn compile_with(query: Value, resolved: HashMap<String, Option<String>>) -> CompileResult<CompiledQuery> {
        let compiler = compiler();
        QueryValidator::new(compiler.schema()).validate(&query)?;
        compiler.compile_resolved(query.as_object().unwrap(), &resolved)
    }

    fn keys(command: &Command) -> Vec<String> {
        command.fields.any.iter().map(Field::wire_key).collect()
    }

    #[test]
    fn test_same_id_objects_are_inlined() {
        let compiled = compile(json!({"$id": "ma1", "a": {"b": true, "c": true}})).unwrap();
        assert_eq!(compiled.commands.len(), 1);
        let root = &compiled.commands[0];
        assert_eq!(keys(root), vec!["a.b", "a.c"]);
        assert!(root.nested_commands.is_empty());
        assert_eq!(root.kind, CommandKind::Node);
    }

    #[test]
    fn test_explicit_same_id_is_aliased() {
        let compiled = compile(json!({"$id": "ma1", "a": {"$id": "ma1", "b": true}})).unwrap();
        let root = &compiled.commands[0];
        assert_eq!(keys(root), vec!["a.b@b"]);
        assert!(root.nested_commands.is_empty());
    }

    #[test]
    fn test_same_id_with_all_stays_separate() {
        let compiled = compile(json!({"$id": "ma1", "a": {"$id": "ma1", "$all": true}})).unwrap();
        let root = &compiled.commands[0];
        assert_eq!(root.nested_commands.len(), 1);
        let nested = &root.nested_commands[0];
        assert_eq!(nested.target, "a");
        assert_eq!(nested.nested_path.as_deref(), Some("a"));
        assert_eq!(keys(nested), vec!["*"]);
    }

    #[test]
    fn test_other_id_is_promoted() {
        let compiled = compile(json!({
            "$id": "ma1",
            "title": true,
            "league": {"$id": "le1", "name": true}
        }))
        .unwrap();
        assert_eq!(compiled.commands.len(), 2);
        assert!(compiled.commands[0].nested_commands.is_empty());
        let sibling = &compiled.commands[1];
        assert_eq!(sibling.source, Source::Id("le1".into()));
        assert_eq!(sibling.target, "league");
        assert_eq!(keys(sibling), vec!["name"]);
    }

    #[test]
    fn test_list_defaults_and_nesting() {
        let compiled = compile(json!({
            "$id": "root",
            "items": {
                "id": true,
                "$list": {"$find": {"$traverse": "descendants"}}
            }
        }))
        .unwrap();
        let root = &compiled.commands[0];
        assert_eq!(root.nested_commands.len(), 1);
        let list = &root.nested_commands[0];
        assert_eq!(list.kind, CommandKind::Traverse);
        assert_eq!(list.target, "items");
        assert_eq!(list.paging, Paging::UNLIMITED);
        assert!(!list.single);
        assert_eq!(list.traverse, Some(TraverseSource::SourceField("descendants".into())));
        assert_eq!(keys(list), vec!["id"]);
    }

    #[test]
    fn test_single_find_limit_one() {
        let compiled = compile(json!({
            "$id": "root",
            "next": {
                "id": true,
                "$find": {
                    "$traverse": "children",
                    "$filter": {"$field": "start", "$operator": ">", "$value": "now"}
                }
            }
        }))
        .unwrap();
        let find = &compiled.commands[0].nested_commands[0];
        assert!(find.single);
        assert_eq!(find.paging, Paging::SINGLE);
        assert!(find.has_now());
    }

    #[test]
    fn test_nested_find_is_two_phase() {
        let compiled = compile(json!({
            "$id": "root",
            "matches": {
                "id": true,
                "$list": {
                    "$limit": 5,
                    "$sort": {"$field": "start", "$order": "desc"},
                    "$find": {
                        "$traverse": "children",
                        "$filter": {"$field": "type", "$operator": "=", "$value": "league"},
                        "$find": {"$traverse": "descendants"}
                    }
                }
            }
        }))
        .unwrap();
        let ids = &compiled.commands[0].nested_commands[0];
        assert_eq!(ids.kind, CommandKind::Ids);
        assert_eq!(ids.paging, Paging::UNLIMITED);
        assert!(ids.sort.is_none());
        let inner = ids.nested_find.as_ref().unwrap();
        assert_eq!(inner.kind, CommandKind::Traverse);
        assert_eq!(inner.source, Source::IdList(Vec::new()));
        assert_eq!(inner.paging.limit, 5);
        assert_eq!(inner.sort.as_ref().unwrap().direction, SortDirection::Desc);
    }

    #[test]
    fn test_aggregate() {
        let compiled = compile(json!({
            "$id": "root",
            "total": {"$aggregate": {"$function": {"$name": "sum", "$args": ["score"]}, "$traverse": "children"}}
        }))
        .unwrap();
        let agg = &compiled.commands[0].nested_commands[0];
        assert_eq!(agg.kind, CommandKind::Aggregate);
        let aggregate = agg.aggregate.as_ref().unwrap();
        assert_eq!(aggregate.function, AggregateFunction::Sum);
        assert_eq!(aggregate.args, vec!["score"]);
    }

    #[test]
    fn test_unknown_aggregate_is_compile_error() {
        let err = compile(json!({
            "total": {"$aggregate": {"$function": "median"}}
        }))
        .unwrap_err();
        assert_eq!(err.code(), "NQ_COMPILE_UNKNOWN_AGGREGATE");
    }

    #[test]
    fn test_all_with_exclusions() {
        let compiled = compile(json!({"$id": "ma1", "$all": true, "score": false})).unwrap();
        assert_eq!(keys(&compiled.commands[0]), vec!["*", "!score"]);
    }

    #[test]
    fn test_field_default_inherit() {
        let compiled = compile(json!({
            "$id": "ma1",
            "label": {"$field": ["title", "name"]},
            "score": {"$default": 0},
            "name": {"$inherit": {"$type": "league", "$merge": true}}
        }))
        .unwrap();
        let root = &compiled.commands[0];
        assert_eq!(keys(root), vec!["label@title|name", "name", "score"]);
        let inherited = root.fields.any.iter().find(|f| f.path == "name").unwrap();
        let opts = inherited.inherit.as_ref().unwrap();
        assert_eq!(opts.types, vec!["league"]);
        assert!(opts.merge);
        assert_eq!(root.defaults[0].path, "score");
        assert_eq!(root.defaults[0].value, json!(0));
    }

    #[test]
    fn test_fields_by_type() {
        let compiled = compile(json!({
            "$id": "ma1",
            "id": true,
            "$fieldsByType": {"match": {"title": true}, "league": {"name": true}}
        }))
        .unwrap();
        let root = &compiled.commands[0];
        assert_eq!(keys(root), vec!["id"]);
        assert_eq!(root.fields.by_type["match"], vec![Field::select("title")]);
        assert_eq!(root.fields.by_type["league"], vec![Field::select("name")]);
    }

    #[test]
    fn test_unresolved_alias_is_kept() {
        let mut resolved = HashMap::new();
        resolved.insert("nowhere".to_string(), None);
        let compiled = compile_with(json!({"$alias": "nowhere", "title": true}), resolved).unwrap();
        assert_eq!(compiled.commands[0].source, Source::Alias(vec!["nowhere".into()]));
    }

    #[test]
    fn test_traversal_inside_list_rejected() {
        let err = compile(json!({
            "items": {"$list": true, "sub": {"$list": true}}
        }))
        .unwrap_err();
        assert_eq!(err.code(), "NQ_QUERY_INVALID");
        assert_eq!(
            err,
            CompileError::Validation(ValidationError::new(
                "$list cannot be used inside a list item or a type selection",
                "items.sub.$list",
            ))
        );
    }

    #[test]
    fn test_compile_is_deterministic() {
        let query = json!({
            "$id": "root",
            "items": {"id": true, "$list": {"$find": {"$traverse": "children"}}}
        });
        let a = compile(query.clone()).unwrap();
        let b = compile(query).unwrap();
        assert_eq!(a.cmd_ids(), b.cmd_ids());
    }

    #[test]
    fn test_traverse_expression() {
        let compiled = compile(json!({
            "items": {"id": true, "$list": {"$find": {"$traverse": {"$any": "children", "league": ["parents", "children"]}}}}
        }))
        .unwrap();
        match &compiled.commands[0].nested_commands[0].traverse {
            Some(TraverseSource::TraverseExpr(expr)) => {
                assert_eq!(expr["$any"], vec!["children"]);
                assert_eq!(expr["league"], vec!["parents", "children"]);
            }
            other => panic!("expected expression, got {:?}", other),
        }
    }
}
