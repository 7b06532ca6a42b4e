//! Result decoder
//!
//! Rows arrive as `[nodeId, [key, value, key, value, ...]]`. The node type
//! comes from the id prefix; each key selects its value decoder through the
//! schema of that type.
//!
//! Key forms returned by the store:
//! - `path`: plain selection
//! - `out@actual`: aliased selection, `actual` is the source path found
//! - `^key`: inherited value, carried as `[sourceNodeId, value]`

use std::sync::Arc;

use serde_json::{Map, Value};

use super::errors::{DecodeError, DecodeResult};
use super::merge::{get_at, merge_at};
use super::values::{decode_value, insert_dotted, json_type_name};
use crate::compiler::{Command, CommandKind, DefaultValue, Field, Source};
use crate::executor::CommandOutput;
use crate::schema::{FieldType, Schema};

/// Output of decoding one or more command replies
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Decoded {
    pub value: Value,
    /// Node commands for references fetched inline; each must be watched
    /// on its own in subscription mode
    pub shadows: Vec<Command>,
}

pub struct ResultDecoder {
    schema: Arc<Schema>,
}

struct RowKey<'a> {
    out: &'a str,
    actual: &'a str,
    inherited: bool,
}

impl<'a> RowKey<'a> {
    fn parse(key: &'a str) -> Self {
        let (inherited, key) = match key.strip_prefix('^') {
            Some(rest) => (true, rest),
            None => (false, key),
        };
        let (out, actual) = key.split_once('@').unwrap_or((key, key));
        RowKey {
            out,
            actual,
            inherited,
        }
    }

    fn is_alias(&self) -> bool {
        self.out != self.actual
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

impl ResultDecoder {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self { schema }
    }

    /// Decodes every output and merges each at its target
    ///
    /// Outputs are merged in order, so a root row lands before the nested
    /// traversals that extend it. A root whose source did not resolve
    /// assembles to `{}`.
    pub fn assemble(&self, outputs: &[CommandOutput]) -> DecodeResult<Decoded> {
        let mut result = Decoded {
            value: Value::Object(Map::new()),
            shadows: Vec::new(),
        };
        for output in outputs {
            let decoded = self.decode_output(output)?;
            result.shadows.extend(decoded.shadows);
            if output.target.is_empty() && decoded.value.is_null() {
                continue;
            }
            merge_at(&mut result.value, &output.target, decoded.value);
        }
        Ok(result)
    }

    /// Decodes one command reply into the value at its target
    pub fn decode_output(&self, output: &CommandOutput) -> DecodeResult<Decoded> {
        let command = &output.command;
        let reply = &output.reply;
        let mut shadows = Vec::new();

        let value = match command.kind {
            CommandKind::Aggregate => aggregate_value(reply)?,
            CommandKind::Ids => reply.clone(),
            CommandKind::Node | CommandKind::Traverse => {
                let rows: &[Value] = match reply {
                    Value::Array(rows) => rows.as_slice(),
                    Value::Null => &[],
                    other => {
                        return Err(DecodeError::malformed(format!(
                            "expected an array of rows, got {}",
                            json_type_name(other)
                        )))
                    }
                };
                let mut decoded = Vec::with_capacity(rows.len());
                for row in rows {
                    decoded.push(self.decode_row(row, command, &mut shadows)?);
                }
                if command.single {
                    decoded.into_iter().next().unwrap_or(Value::Null)
                } else {
                    Value::Array(decoded)
                }
            }
        };

        Ok(Decoded { value, shadows })
    }

    fn decode_row(&self, row: &Value, command: &Command, shadows: &mut Vec<Command>) -> DecodeResult<Value> {
        let (id, fields) = split_row(row)?;
        let mut out = self.decode_fields(id, fields, &command.target, shadows)?;
        apply_defaults(&mut out, &command.defaults);
        Ok(out)
    }

    /// Decodes the flat field array of node `id`
    pub fn decode_fields(
        &self,
        id: &str,
        fields: &[Value],
        target: &str,
        shadows: &mut Vec<Command>,
    ) -> DecodeResult<Value> {
        let type_name = self
            .schema
            .type_of_id(id)
            .ok_or_else(|| DecodeError::UnknownPrefix(id.to_string()))?;
        let type_schema = self
            .schema
            .type_schema(type_name)
            .ok_or_else(|| DecodeError::UnknownPrefix(id.to_string()))?;

        if fields.len() % 2 != 0 {
            return Err(DecodeError::malformed(format!(
                "odd field array of length {} for node '{}'",
                fields.len(),
                id
            )));
        }

        let mut out = Map::new();
        let mut aliased: Vec<(String, Value)> = Vec::new();
        for pair in fields.chunks(2) {
            let key = pair[0]
                .as_str()
                .ok_or_else(|| DecodeError::malformed(format!("non-string key in node '{}'", id)))?;
            let key = RowKey::parse(key);

            let (field_type, raw) = if key.inherited {
                self.inherited(key.actual, &pair[1])?
            } else {
                (type_schema.field(key.actual), &pair[1])
            };

            let value = match (field_type, raw) {
                (Some(FieldType::Reference), Value::Array(items)) if items.len() > 1 => {
                    self.dereferenced(items, &join(target, key.out), shadows)?
                }
                _ => decode_value(field_type, raw, key.actual)?,
            };

            if key.is_alias() {
                aliased.push((key.out.to_string(), value));
            } else {
                insert_dotted(&mut out, key.out, value);
            }
        }

        for (path, value) in aliased {
            insert_dotted(&mut out, &path, value);
        }
        Ok(Value::Object(out))
    }

    /// Re-resolves an inherited value against the node it was inherited from
    fn inherited<'v>(&self, path: &str, raw: &'v Value) -> DecodeResult<(Option<&FieldType>, &'v Value)> {
        let pair = raw.as_array().filter(|p| p.len() == 2).ok_or_else(|| {
            DecodeError::malformed(format!("inherited '{}' must be a [source, value] pair", path))
        })?;
        let tag = pair[0]
            .as_str()
            .ok_or_else(|| DecodeError::malformed(format!("inherited '{}' has no source tag", path)))?;
        let source_type = match self.schema.type_schema(tag) {
            Some(t) => t,
            None => self
                .schema
                .type_of_id(tag)
                .and_then(|name| self.schema.type_schema(name))
                .ok_or_else(|| DecodeError::UnknownPrefix(tag.to_string()))?,
        };
        Ok((source_type.field(path), &pair[1]))
    }

    /// `[refId, [k, v, ...]]`: an edge whose target fields were read inline
    fn dereferenced(&self, items: &[Value], target: &str, shadows: &mut Vec<Command>) -> DecodeResult<Value> {
        let ref_id = items[0]
            .as_str()
            .ok_or_else(|| DecodeError::malformed(format!("reference at '{}' has no id", target)))?;
        let fields = items[1].as_array().map(Vec::as_slice).unwrap_or(&[]);
        let mut value = self.decode_fields(ref_id, fields, target, shadows)?;
        if let Value::Object(map) = &mut value {
            map.entry("id".to_string())
                .or_insert_with(|| Value::String(ref_id.to_string()));
        }

        let mut shadow = Command::node(Source::Id(ref_id.to_string()), target);
        shadow.fields.any = fields
            .chunks(2)
            .filter_map(|pair| pair[0].as_str())
            .map(|key| {
                let key = RowKey::parse(key);
                Field::select(key.actual)
            })
            .collect();
        shadow.seal();
        shadows.push(shadow);
        Ok(value)
    }
}

fn split_row(row: &Value) -> DecodeResult<(&str, &[Value])> {
    let cols = row
        .as_array()
        .ok_or_else(|| DecodeError::malformed(format!("row must be an array, got {}", json_type_name(row))))?;
    let id = cols
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| DecodeError::malformed("row without a node id"))?;
    let fields: &[Value] = match cols.get(1) {
        Some(Value::Array(fields)) => fields.as_slice(),
        None | Some(Value::Null) => &[],
        Some(other) => {
            return Err(DecodeError::malformed(format!(
                "fields of '{}' must be an array, got {}",
                id,
                json_type_name(other)
            )))
        }
    };
    Ok((id, fields))
}

fn aggregate_value(reply: &Value) -> DecodeResult<Value> {
    match reply {
        Value::Number(_) => Ok(reply.clone()),
        Value::Null => Ok(Value::from(0)),
        Value::Array(items) => match items.first() {
            Some(n @ Value::Number(_)) => Ok(n.clone()),
            None => Ok(Value::from(0)),
            Some(other) => Err(DecodeError::malformed(format!(
                "aggregate result must be a number, got {}",
                json_type_name(other)
            ))),
        },
        other => Err(DecodeError::malformed(format!(
            "aggregate result must be a number, got {}",
            json_type_name(other)
        ))),
    }
}

fn apply_defaults(row: &mut Value, defaults: &[DefaultValue]) {
    for default in defaults {
        let present = get_at(row, &default.path).map(|v| !v.is_null()).unwrap_or(false);
        if !present {
            merge_at(row, &default.path, default.value.clone());
        }
    }
}
