//! Wire value → public value, per declared field type
//!
//! Closed dispatch over `FieldType`. Fields the schema does not declare pass
//! through unchanged. Inline-dereferenced references are handled by the row
//! decoder before a value reaches this table.

use serde_json::{Map, Number, Value};

use super::errors::{DecodeError, DecodeResult};
use crate::schema::FieldType;

/// Decodes one wire value against its declared type
pub fn decode_value(field_type: Option<&FieldType>, raw: &Value, path: &str) -> DecodeResult<Value> {
    let Some(field_type) = field_type else {
        return Ok(raw.clone());
    };
    if raw.is_null() {
        return Ok(Value::Null);
    }

    match field_type {
        FieldType::String
        | FieldType::Id
        | FieldType::Digest
        | FieldType::Url
        | FieldType::Email
        | FieldType::Phone
        | FieldType::Type => match raw {
            Value::String(_) => Ok(raw.clone()),
            _ => Err(type_error(path, field_type, raw)),
        },
        FieldType::Boolean => match raw {
            Value::Bool(_) => Ok(raw.clone()),
            // Stored as 0/1
            Value::Number(n) => Ok(Value::Bool(n.as_f64().map(|f| f != 0.0).unwrap_or(false))),
            _ => Err(type_error(path, field_type, raw)),
        },
        FieldType::Number | FieldType::Float => number(raw, path, field_type, false),
        FieldType::Int | FieldType::Integer | FieldType::Timestamp => {
            number(raw, path, field_type, true)
        }
        FieldType::Text => match raw {
            Value::String(_) => Ok(raw.clone()),
            Value::Object(langs) => {
                let mut out = Map::new();
                for (lang, text) in langs {
                    if !text.is_null() {
                        out.insert(lang.clone(), text.clone());
                    }
                }
                Ok(Value::Object(out))
            }
            _ => Err(type_error(path, field_type, raw)),
        },
        FieldType::Json => match raw {
            Value::String(s) => Ok(serde_json::from_str(s).unwrap_or_else(|_| raw.clone())),
            _ => Ok(raw.clone()),
        },
        FieldType::Object { properties } => {
            let obj = raw.as_object().ok_or_else(|| type_error(path, field_type, raw))?;
            let mut out = Map::new();
            for (key, value) in obj {
                let child_path = make_path(path, key);
                let decoded = decode_value(properties.get(key), value, &child_path)?;
                insert_dotted(&mut out, key, decoded);
            }
            Ok(Value::Object(out))
        }
        FieldType::Record { values } => {
            let obj = raw.as_object().ok_or_else(|| type_error(path, field_type, raw))?;
            let mut out = Map::new();
            for (key, value) in obj {
                let decoded = decode_value(Some(values), value, &make_path(path, key))?;
                insert_dotted(&mut out, key, decoded);
            }
            Ok(Value::Object(out))
        }
        FieldType::Array { items } | FieldType::Set { items } => {
            let arr = raw.as_array().ok_or_else(|| type_error(path, field_type, raw))?;
            arr.iter()
                .enumerate()
                .map(|(i, item)| decode_value(Some(items), item, &format!("{}[{}]", path, i)))
                .collect::<DecodeResult<Vec<_>>>()
                .map(Value::Array)
        }
        FieldType::Reference => match raw {
            Value::String(_) => Ok(raw.clone()),
            Value::Array(items) => match items.first() {
                Some(id @ Value::String(_)) => Ok(id.clone()),
                _ => Err(type_error(path, field_type, raw)),
            },
            _ => Err(type_error(path, field_type, raw)),
        },
        FieldType::References => match raw {
            Value::Array(items) if items.iter().all(Value::is_string) => Ok(raw.clone()),
            _ => Err(type_error(path, field_type, raw)),
        },
    }
}

fn number(raw: &Value, path: &str, field_type: &FieldType, integral: bool) -> DecodeResult<Value> {
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        // Numbers stored in string form
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    let f = parsed.ok_or_else(|| type_error(path, field_type, raw))?;
    if let Value::Number(n) = raw {
        if n.is_i64() || n.is_u64() || !integral {
            return Ok(raw.clone());
        }
    }
    if integral && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        return Ok(Value::from(f as i64));
    }
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or_else(|| type_error(path, field_type, raw))
}

/// Inserts `value` at a dotted key, recomposing nested objects
pub fn insert_dotted(out: &mut Map<String, Value>, key: &str, value: Value) {
    match key.split_once('.') {
        None => {
            out.insert(key.to_string(), value);
        }
        Some((head, rest)) => {
            let slot = out
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            if let Value::Object(child) = slot {
                insert_dotted(child, rest, value);
            }
        }
    }
}

/// Returns the JSON type name for error messages.
pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn make_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{}.{}", prefix, field)
    }
}

fn type_error(path: &str, expected: &FieldType, actual: &Value) -> DecodeError {
    DecodeError::TypeMismatch {
        path: path.to_string(),
        expected: expected.type_name().to_string(),
        found: json_type_name(actual).to_string(),
    }
}
