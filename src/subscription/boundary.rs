//! Next refresh instant for now-relative filters
//!
//! For every now-relative bound the set that is about to change is probed:
//! members for `>`/`>=` (the first one to drop out), the complement for
//! `<`/`<=` (the first one to come in). The probe sorts ascending on the
//! bounded field with `limit 1`; the edge value maps back through the
//! relative expression to the instant the filter flips.
//!
//! | bound | probe | refresh at |
//! |---|---|---|
//! | `f > now+o` | `f > now+o` | `e - o` |
//! | `f >= now+o` | `f >= now+o` | `e - o + 1` |
//! | `f < now+o` | `f >= now+o` | `e - o + 1` |
//! | `f <= now+o` | `f > now+o` | `e - o` |

use chrono::DateTime;
use futures_util::future::try_join_all;
use serde_json::{json, Value};

use super::errors::SubscriptionResult;
use crate::compiler::{Command, CommandKind, Field, FieldSelection, Paging, Sort, SortDirection, Source};
use crate::executor::CommandExecutor;
use crate::query::{FilterLeaf, FilterNode, FilterOperator, Fork, NowBoundary};

/// Commands whose filter can change with time alone
pub(crate) fn time_sensitive<'a>(commands: impl IntoIterator<Item = &'a Command>) -> Vec<Command> {
    let mut out: Vec<Command> = Vec::new();
    for command in commands {
        let probeable = command.kind != CommandKind::Node
            && command.filter.as_ref().map(Fork::has_now).unwrap_or(false)
            && !matches!(&command.source, Source::IdList(ids) if ids.is_empty());
        if probeable && !out.iter().any(|c| c.cmd_id == command.cmd_id && c.source == command.source) {
            out.push(command.clone());
        }
    }
    out
}

/// Probe command for one bound of `command`, evaluated at `now_ms`
pub fn probe_command(command: &Command, boundary: &NowBoundary, now_ms: i64) -> Command {
    let operator = match boundary.operator {
        FilterOperator::Lt | FilterOperator::Lte => boundary
            .operator
            .complement()
            .unwrap_or(boundary.operator),
        other => other,
    };
    let leaf = FilterLeaf::new(
        boundary.field.clone(),
        operator,
        json!(boundary.now.resolve(now_ms)),
    );

    let mut probe = command.clone();
    probe.kind = CommandKind::Traverse;
    probe.single = false;
    probe.aggregate = None;
    probe.nested_find = None;
    probe.nested_commands.clear();
    probe.defaults.clear();
    probe.fields = FieldSelection {
        any: vec![Field::select(boundary.field.clone())],
        ..FieldSelection::default()
    };
    probe.sort = Some(Sort {
        field: boundary.field.clone(),
        direction: SortDirection::Asc,
    });
    probe.paging = Paging {
        limit: 1,
        offset: 0,
    };
    probe.filter = Some(match command.filter.as_ref().and_then(Fork::without_now) {
        Some(rest) => rest.and_leaf(leaf),
        None => Fork::all(vec![FilterNode::Leaf(leaf)]),
    });
    probe.seal();
    probe
}

/// Instant at which `boundary` flips for edge value `edge_ms`
pub fn refresh_at(boundary: &NowBoundary, edge_ms: i64) -> i64 {
    let flip = boundary.now.inverse(edge_ms);
    match boundary.operator {
        FilterOperator::Gte | FilterOperator::Lt => flip.saturating_add(1),
        _ => flip,
    }
}

/// Value of `field` in the first row of a probe reply
pub(crate) fn edge_value(reply: &Value, field: &str) -> Option<i64> {
    let row = reply.as_array()?.first()?.as_array()?;
    let fields = row.get(1)?.as_array()?;
    let value = fields.chunks(2).find_map(|pair| {
        let key = pair[0].as_str()?;
        let out = key.split_once('@').map(|(out, _)| out).unwrap_or(key);
        if out == field {
            pair.get(1)
        } else {
            None
        }
    })?;
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| t.timestamp_millis())
            .ok()
            .or_else(|| s.parse().ok()),
        _ => None,
    }
}

/// Smallest refresh instant over every now-relative bound of `commands`
pub async fn next_refresh(
    executor: &CommandExecutor,
    commands: &[Command],
    now_ms: i64,
) -> SubscriptionResult<Option<i64>> {
    let mut probes: Vec<(NowBoundary, Command)> = Vec::new();
    for command in commands {
        let Some(filter) = &command.filter else {
            continue;
        };
        for boundary in filter.now_boundaries() {
            let probe = probe_command(command, &boundary, now_ms);
            probes.push((boundary, probe));
        }
    }
    if probes.is_empty() {
        return Ok(None);
    }

    let outputs = try_join_all(probes.iter().map(|(_, probe)| executor.execute(probe))).await?;
    let next = probes
        .iter()
        .zip(outputs)
        .filter_map(|((boundary, _), output)| {
            edge_value(&output.reply, &boundary.field).map(|edge| refresh_at(boundary, edge))
        })
        .min();
    Ok(next)
}
