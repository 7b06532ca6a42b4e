//! Command executor
//!
//! Execution flow per command:
//! 1. Map the command to `FindArgs` and an RPN filter program
//! 2. When the context carries a subscription id, register a marker with
//!    the same wire struct
//! 3. Issue `hierarchy.find` / `hierarchy.aggregate`
//! 4. For an `Ids` phase, seed `nested_find` with the returned ids and repeat
//!
//! Independent commands run concurrently; the phases of one nested find
//! run strictly in order.

use std::collections::BTreeMap;

use futures_util::future::try_join_all;
use serde_json::Value;

use super::context::{ExecContext, Marker};
use super::errors::{ExecutorError, ExecutorResult};
use super::wire::{
    AggregateFn, FindArgs, MergeStrategy, ResultType, SortOrder, TraversalDirection,
};
use crate::compiler::{
    AggregateFunction, Command, CommandKind, Field, SortDirection, Source, TraverseSource,
};
use crate::observability::{log_event_with_fields, Event, Logger};
use crate::store::{Arg, StoreCommand};

/// Raw reply of one executed command
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    /// Id of the command as compiled (the first phase of a nested find)
    pub cmd_id: u64,
    pub target: String,
    /// The command whose rows `reply` holds, with run-time ids filled in
    pub command: Command,
    pub reply: Value,
}

/// Maps an edge field and recursion flag to a direction
pub fn direction_for(source_field: &str, recursive: bool) -> (TraversalDirection, String) {
    match (source_field, recursive) {
        ("children", false) => (TraversalDirection::Children, String::new()),
        ("children", true) | ("descendants", _) => {
            (TraversalDirection::BfsDescendants, String::new())
        }
        ("parents", false) => (TraversalDirection::Parents, String::new()),
        ("parents", true) | ("ancestors", _) => (TraversalDirection::BfsAncestors, String::new()),
        (edge, false) => (TraversalDirection::EdgeField, edge.to_string()),
        (edge, true) => (TraversalDirection::BfsEdgeField, edge.to_string()),
    }
}

fn aggregate_code(function: AggregateFunction) -> AggregateFn {
    match function {
        AggregateFunction::Count => AggregateFn::Count,
        AggregateFunction::CountUnique => AggregateFn::CountUnique,
        AggregateFunction::Sum => AggregateFn::Sum,
        AggregateFunction::Avg => AggregateFn::Avg,
        AggregateFunction::Min => AggregateFn::Min,
        AggregateFunction::Max => AggregateFn::Max,
    }
}

/// Executes compiled commands against the store
pub struct CommandExecutor {
    ctx: ExecContext,
}

impl CommandExecutor {
    pub fn new(ctx: ExecContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &ExecContext {
        &self.ctx
    }

    fn field_line(&self, field: &Field) -> String {
        match &field.inherit {
            None => field.wire_key(),
            Some(opts) => {
                let prefixes: Vec<&str> = opts
                    .types
                    .iter()
                    .filter_map(|t| self.ctx.schema.type_schema(t))
                    .map(|t| t.prefix.as_str())
                    .collect();
                format!("^{}:{}", prefixes.join(","), field.wire_key())
            }
        }
    }

    fn field_lines(&self, fields: &[Field]) -> String {
        fields
            .iter()
            .map(|f| self.field_line(f))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Wire struct, node ids and RPN program for one command phase
    pub fn wire(&self, command: &Command) -> ExecutorResult<(FindArgs, Vec<String>, Vec<String>)> {
        let schema = self.ctx.schema.as_ref();
        let lang = self.ctx.lang.as_str();
        let mut args = FindArgs {
            limit: command.paging.limit,
            offset: command.paging.offset,
            ..FindArgs::default()
        };
        let mut node_ids = command.source.node_ids();

        match &command.traverse {
            None => args.dir = TraversalDirection::Node,
            Some(TraverseSource::SourceField(field)) => {
                let (dir, opt) = direction_for(field, command.recursive);
                args.dir = dir;
                args.dir_opt_str = opt;
            }
            Some(TraverseSource::TraverseExpr(by_type)) => {
                args.dir = if command.recursive {
                    TraversalDirection::BfsExpression
                } else {
                    TraversalDirection::Expression
                };
                let edges: BTreeMap<String, String> = by_type
                    .iter()
                    .map(|(t, e)| (t.clone(), e.join("\n")))
                    .collect();
                args.dir_opt_str = self.ctx.bridge.compile_field_selection(&edges, schema, lang)?;
            }
            Some(TraverseSource::IdList(ids)) => {
                args.dir = TraversalDirection::Node;
                node_ids = ids.clone();
            }
        }

        if let Some(sort) = &command.sort {
            args.order = match sort.direction {
                SortDirection::Asc => SortOrder::Asc,
                SortDirection::Desc => SortOrder::Desc,
            };
            args.order_by_field = sort.field.clone();
        }

        let fields = &command.fields;
        if command.kind == CommandKind::Ids {
            args.res_type = ResultType::Ids;
        } else if let Some(aggregate) = &command.aggregate {
            args.agg_fn = aggregate_code(aggregate.function);
            args.res_opt_str = aggregate.args.join("\n");
        } else if !fields.by_type.is_empty() {
            args.res_type = ResultType::FieldsRpn;
            let mut selection = BTreeMap::new();
            if !fields.any.is_empty() {
                selection.insert("$any".to_string(), self.field_lines(&fields.any));
            }
            for (type_name, typed) in &fields.by_type {
                let lines = self.field_lines(typed);
                selection
                    .entry(type_name.clone())
                    .and_modify(|existing: &mut String| {
                        existing.push('\n');
                        existing.push_str(&lines);
                    })
                    .or_insert(lines);
            }
            args.res_opt_str = self.ctx.bridge.compile_field_selection(&selection, schema, lang)?;
        } else if fields.has_inherit() {
            args.res_type = ResultType::InheritRpn;
            args.res_opt_str = self.field_lines(&fields.any);
        } else {
            args.res_opt_str = self.field_lines(&fields.any);
        }

        if fields.has_inherit() {
            let deep = fields
                .iter()
                .any(|f| f.inherit.as_ref().map(|o| o.merge).unwrap_or(false));
            args.merge_strategy = if deep {
                MergeStrategy::Deep
            } else {
                MergeStrategy::Named
            };
        }

        let rpn = match &command.filter {
            Some(filter) => self.ctx.bridge.compile_filter(filter, schema, lang)?,
            None => Vec::new(),
        };

        Ok((args, node_ids, rpn))
    }

    /// Runs every command and its nested commands; independent ones concurrently
    pub async fn execute_all(&self, commands: &[Command]) -> ExecutorResult<Vec<CommandOutput>> {
        let mut queue: Vec<&Command> = Vec::new();
        for command in commands {
            collect_executable(command, &mut queue);
        }
        try_join_all(queue.into_iter().map(|c| self.execute(c))).await
    }

    /// Runs one command, including every phase of its nested find
    pub async fn execute(&self, command: &Command) -> ExecutorResult<CommandOutput> {
        let cmd_id = command.cmd_id;
        let target = command.target.clone();
        let mut current = command.clone();

        loop {
            if current.source.is_unresolved() {
                Logger::trace("ALIAS_UNRESOLVED", &[("target", target.as_str())]);
                return Ok(CommandOutput {
                    cmd_id,
                    target,
                    reply: empty_reply(&current),
                    command: current,
                });
            }

            let reply = self.call(&current).await?;

            if current.kind != CommandKind::Ids {
                return Ok(CommandOutput {
                    cmd_id,
                    target,
                    command: current,
                    reply,
                });
            }

            let ids = reply_ids(&reply)?;
            let Some(next) = current.nested_find.take() else {
                return Ok(CommandOutput {
                    cmd_id,
                    target,
                    command: current,
                    reply,
                });
            };
            let mut next = *next;
            if ids.is_empty() {
                return Ok(CommandOutput {
                    cmd_id,
                    target,
                    reply: empty_reply(&next),
                    command: next,
                });
            }
            next.source = Source::IdList(ids);
            current = next;
        }
    }

    async fn call(&self, command: &Command) -> ExecutorResult<Value> {
        let (find_args, node_ids, rpn) = self.wire(command)?;
        let wire = find_args.encode();
        let ids_arg = node_ids.join(",");
        let store_command = if command.kind == CommandKind::Aggregate {
            StoreCommand::HierarchyAggregate
        } else {
            StoreCommand::HierarchyFind
        };

        if let Some(sub_id) = &self.ctx.sub_id {
            self.register_marker(sub_id, command, &wire, &ids_arg, &rpn).await?;
        }

        let mut args = Vec::with_capacity(3 + rpn.len());
        args.push(Arg::Text(self.ctx.lang.clone()));
        args.push(Arg::Bytes(wire));
        args.push(Arg::Text(ids_arg));
        args.extend(rpn.into_iter().map(Arg::Text));

        self.ctx.metrics.increment_store_calls();
        let reply = match self.ctx.store.command(store_command, args).await {
            Ok(reply) => reply,
            Err(e) => {
                let reason = e.to_string();
                log_event_with_fields(
                    Event::StoreCallFailed,
                    &[("command", store_command.name()), ("reason", reason.as_str())],
                );
                return Err(e.into());
            }
        };
        self.ctx.metrics.increment_commands_executed();

        let cmd_id = command.cmd_id.to_string();
        Logger::trace(
            Event::CommandExecuted.as_str(),
            &[("cmd_id", cmd_id.as_str()), ("target", command.target.as_str())],
        );
        Ok(reply)
    }

    async fn register_marker(
        &self,
        sub_id: &str,
        command: &Command,
        wire: &[u8],
        ids_arg: &str,
        rpn: &[String],
    ) -> ExecutorResult<()> {
        let cmd_id = command.cmd_id.to_string();
        let mut args = Vec::with_capacity(4 + rpn.len());
        args.push(Arg::from(sub_id));
        args.push(Arg::Text(cmd_id.clone()));
        args.push(Arg::Bytes(wire.to_vec()));
        args.push(Arg::from(ids_arg));
        args.extend(rpn.iter().cloned().map(Arg::Text));

        self.ctx.metrics.increment_store_calls();
        self.ctx
            .store
            .command(StoreCommand::SubscriptionsAdd, args)
            .await?;

        self.ctx.record_marker(Marker {
            cmd_id: command.cmd_id,
            sub_id: sub_id.to_string(),
            has_now: command.filter.as_ref().map(|f| f.has_now()).unwrap_or(false),
        });
        self.ctx.metrics.add_markers_registered(1);
        Logger::trace(
            Event::MarkerRegistered.as_str(),
            &[("cmd_id", cmd_id.as_str()), ("sub_id", sub_id)],
        );
        Ok(())
    }

    /// Registers a marker for a read that was answered inline by another command
    pub async fn register_shadow(&self, command: &Command) -> ExecutorResult<()> {
        let Some(sub_id) = self.ctx.sub_id.clone() else {
            return Ok(());
        };
        let (find_args, node_ids, rpn) = self.wire(command)?;
        self.register_marker(&sub_id, command, &find_args.encode(), &node_ids.join(","), &rpn)
            .await
    }

    /// Removes one marker; failures are logged and swallowed
    pub async fn remove_marker(&self, marker: &Marker) -> bool {
        let cmd_id = marker.cmd_id.to_string();
        let args = vec![Arg::from(marker.sub_id.as_str()), Arg::Text(cmd_id.clone())];
        self.ctx.metrics.increment_store_calls();
        match self
            .ctx
            .store
            .command(StoreCommand::SubscriptionsDelMarker, args)
            .await
        {
            Ok(_) => {
                self.ctx.metrics.add_markers_removed(1);
                Logger::trace(
                    Event::MarkerRemoved.as_str(),
                    &[("cmd_id", cmd_id.as_str()), ("sub_id", marker.sub_id.as_str())],
                );
                true
            }
            Err(e) => {
                let reason = e.to_string();
                log_event_with_fields(
                    Event::MarkerCleanupFailed,
                    &[
                        ("cmd_id", cmd_id.as_str()),
                        ("sub_id", marker.sub_id.as_str()),
                        ("reason", reason.as_str()),
                    ],
                );
                false
            }
        }
    }
}

fn collect_executable<'a>(command: &'a Command, out: &mut Vec<&'a Command>) {
    out.push(command);
    for nested in &command.nested_commands {
        collect_executable(nested, out);
    }
}

fn empty_reply(command: &Command) -> Value {
    match command.kind {
        CommandKind::Aggregate => Value::from(0),
        _ => Value::Array(Vec::new()),
    }
}

fn reply_ids(reply: &Value) -> ExecutorResult<Vec<String>> {
    let rows = reply.as_array().ok_or_else(|| {
        ExecutorError::malformed_reply(StoreCommand::HierarchyFind.name(), "expected an id array")
    })?;
    rows.iter()
        .map(|row| match row {
            Value::String(id) => Ok(id.clone()),
            Value::Array(cols) => cols
                .first()
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    ExecutorError::malformed_reply(
                        StoreCommand::HierarchyFind.name(),
                        "row without a node id",
                    )
                }),
            other => Err(ExecutorError::malformed_reply(
                StoreCommand::HierarchyFind.name(),
                format!("unexpected id row {}", other),
            )),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::RpnBridge;
    use crate::compiler::{Field, Paging, TraverseSource};
    use crate::observability::MetricsRegistry;
    use crate::query::Fork;
    use crate::schema::Schema;
    use crate::store::{Store, StoreFuture, StoreResult};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<(StoreCommand, Vec<Arg>)>>,
    }

    impl Recording {
        fn calls(&self) -> Vec<(StoreCommand, Vec<Arg>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Store for Recording {
        fn command(&self, command: StoreCommand, args: Vec<Arg>) -> StoreFuture<'_> {
            let phase_one = command == StoreCommand::HierarchyFind
                && args
                    .get(1)
                    .and_then(Arg::as_bytes)
                    .map(|b| FindArgs::decode(b).unwrap().res_type == ResultType::Ids)
                    .unwrap_or(false);
            self.calls.lock().unwrap().push((command, args));
            Box::pin(async move {
                let reply: StoreResult<Value> = match command {
                    StoreCommand::HierarchyFind if phase_one => Ok(json!(["ma1", "ma2"])),
                    StoreCommand::HierarchyFind => Ok(json!([["ma1", ["title", "x"]]])),
                    StoreCommand::HierarchyAggregate => Ok(json!(7)),
                    _ => Ok(Value::Null),
                };
                reply
            })
        }
    }

    fn executor(store: Arc<Recording>) -> CommandExecutor {
        let ctx = ExecContext::new(
            store,
            Arc::new(Schema::default()),
            Arc::new(RpnBridge::new()),
            Arc::new(MetricsRegistry::new()),
            "en",
        );
        CommandExecutor::new(ctx)
    }

    fn traverse(field: &str, recursive: bool) -> Command {
        let mut command = Command::traversal(
            CommandKind::Traverse,
            Source::Id("root".into()),
            TraverseSource::SourceField(field.into()),
            "items",
        );
        command.recursive = recursive;
        command.fields.any.push(Field::select("title"));
        command.seal();
        command
    }

    #[test]
    fn test_direction_table() {
        let exec = executor(Arc::new(Recording::default()));
        let (args, ..) = exec.wire(&traverse("children", false)).unwrap();
        assert_eq!(args.dir, TraversalDirection::Children);
        let (args, ..) = exec.wire(&traverse("children", true)).unwrap();
        assert_eq!(args.dir, TraversalDirection::BfsDescendants);
        let (args, ..) = exec.wire(&traverse("parents", true)).unwrap();
        assert_eq!(args.dir, TraversalDirection::BfsAncestors);
        let (args, ..) = exec.wire(&traverse("customEdge", false)).unwrap();
        assert_eq!(args.dir, TraversalDirection::EdgeField);
        assert_eq!(args.dir_opt_str, "customEdge");
        let (args, ..) = exec.wire(&traverse("customEdge", true)).unwrap();
        assert_eq!(args.dir, TraversalDirection::BfsEdgeField);
    }

    #[test]
    fn test_expression_and_id_list() {
        let exec = executor(Arc::new(Recording::default()));
        let mut command = traverse("children", true);
        command.traverse = Some(TraverseSource::TraverseExpr(BTreeMap::from([(
            "$any".to_string(),
            vec!["children".to_string(), "refs".to_string()],
        )])));
        let (args, ..) = exec.wire(&command).unwrap();
        assert_eq!(args.dir, TraversalDirection::BfsExpression);
        assert_eq!(args.dir_opt_str, "*:children,refs");

        command.traverse = Some(TraverseSource::IdList(vec!["ma1".into(), "ma2".into()]));
        let (args, ids, _) = exec.wire(&command).unwrap();
        assert_eq!(args.dir, TraversalDirection::Node);
        assert_eq!(ids, vec!["ma1", "ma2"]);
    }

    #[tokio::test]
    async fn test_store_args_and_markers() {
        let store = Arc::new(Recording::default());
        let mut command = traverse("children", false);
        command.filter = Some(
            Fork::parse(&json!({"$field": "type", "$operator": "=", "$value": "match"}), "$filter")
                .unwrap(),
        );
        command.seal();

        let exec = CommandExecutor::new(executor(store.clone()).context().with_sub_id("sub-1"));
        let output = exec.execute(&command).await.unwrap();
        assert_eq!(output.reply, json!([["ma1", ["title", "x"]]]));

        let calls = store.calls();
        assert_eq!(calls.len(), 2);
        let (add, add_args) = &calls[0];
        let (find, find_args) = &calls[1];
        assert_eq!(*add, StoreCommand::SubscriptionsAdd);
        assert_eq!(*find, StoreCommand::HierarchyFind);
        assert_eq!(add_args[0].as_text(), Some("sub-1"));
        assert_eq!(add_args[1].as_text(), Some(command.cmd_id.to_string().as_str()));
        // marker mirrors the read exactly
        assert_eq!(&add_args[2..], &find_args[1..]);
        assert_eq!(find_args[0].as_text(), Some("en"));
        assert_eq!(find_args[2].as_text(), Some("root"));
        let rpn: Vec<&str> = find_args[3..].iter().filter_map(Arg::as_text).collect();
        assert_eq!(rpn, vec!["type", "=", "match"]);

        let markers = exec.context().markers();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].cmd_id, command.cmd_id);
    }

    #[tokio::test]
    async fn test_nested_find_two_phases() {
        let store = Arc::new(Recording::default());
        let mut inner = traverse("descendants", false);
        inner.source = Source::IdList(Vec::new());
        inner.paging = Paging { limit: 3, offset: 0 };
        let mut outer = Command::traversal(
            CommandKind::Ids,
            Source::Id("root".into()),
            TraverseSource::SourceField("children".into()),
            "items",
        );
        outer.nested_find = Some(Box::new(inner));
        outer.seal();

        let output = executor(store.clone()).execute(&outer).await.unwrap();
        assert_eq!(output.cmd_id, outer.cmd_id);
        assert_eq!(output.command.source, Source::IdList(vec!["ma1".into(), "ma2".into()]));

        let calls = store.calls();
        assert_eq!(calls.len(), 2);
        let first = FindArgs::decode(calls[0].1[1].as_bytes().unwrap()).unwrap();
        assert_eq!(first.res_type, ResultType::Ids);
        assert_eq!(first.limit, -1);
        let second = FindArgs::decode(calls[1].1[1].as_bytes().unwrap()).unwrap();
        assert_eq!(second.limit, 3);
        assert_eq!(calls[1].1[2].as_text(), Some("ma1,ma2"));
    }

    #[tokio::test]
    async fn test_unresolved_alias_skips_store() {
        let store = Arc::new(Recording::default());
        let mut command = Command::node(Source::Alias(vec!["nowhere".into()]), "");
        command.seal();
        let output = executor(store.clone()).execute(&command).await.unwrap();
        assert_eq!(output.reply, json!([]));
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_aggregate_uses_aggregate_command() {
        let store = Arc::new(Recording::default());
        let mut command = Command::traversal(
            CommandKind::Aggregate,
            Source::Id("root".into()),
            TraverseSource::SourceField("children".into()),
            "total",
        );
        command.aggregate = Some(crate::compiler::Aggregate {
            function: AggregateFunction::CountUnique,
            args: vec!["score".into()],
        });
        command.seal();
        let output = executor(store.clone()).execute(&command).await.unwrap();
        assert_eq!(output.reply, json!(7));
        let calls = store.calls();
        assert_eq!(calls[0].0, StoreCommand::HierarchyAggregate);
        let args = FindArgs::decode(calls[0].1[1].as_bytes().unwrap()).unwrap();
        assert_eq!(args.agg_fn, AggregateFn::CountUnique);
        assert_eq!(args.res_opt_str, "score");
    }
}
