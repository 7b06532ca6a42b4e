//! Directive placement validation
//!
//! A synchronous pre-pass over the raw query. It checks, per directive,
//! the allowed parent, the allowed properties and the value type. The
//! first violation is returned with the dotted path of the offending key;
//! compilation never starts on an invalid query.

use serde_json::{Map, Value};

use super::directive::{Directive, QueryKey};
use super::errors::{ValidationError, ValidationResult};
use super::filter::Fork;
use crate::schema::Schema;

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}

fn is_string_or_strings(value: &Value) -> bool {
    match value {
        Value::String(_) => true,
        Value::Array(items) => !items.is_empty() && items.iter().all(Value::is_string),
        _ => false,
    }
}

fn misplaced(directive: Directive, scope: &str, path: &str) -> ValidationError {
    let parents: Vec<&str> = directive
        .allowed_parents()
        .iter()
        .map(Directive::as_str)
        .collect();
    if parents.is_empty() {
        ValidationError::new(format!("{} is not allowed in {}", directive, scope), path)
    } else {
        ValidationError::new(
            format!("{} is only allowed inside {}", directive, parents.join(", ")),
            path,
        )
    }
}

/// Validates raw queries against directive placement rules
pub struct QueryValidator<'a> {
    schema: &'a Schema,
}

impl<'a> QueryValidator<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    /// Validates a whole query
    pub fn validate(&self, query: &Value) -> ValidationResult<()> {
        let obj = query
            .as_object()
            .ok_or_else(|| ValidationError::new("Query must be an object", ""))?;
        self.node(obj, "", false)
    }

    /// `in_selection` is set below a list item or a type selection, where
    /// fields are read per row and cannot start commands of their own.
    fn node(&self, obj: &Map<String, Value>, path: &str, in_selection: bool) -> ValidationResult<()> {
        if in_selection {
            let nested = obj.keys().find_map(|key| match QueryKey::classify(key) {
                QueryKey::Directive(d)
                    if d.is_traversal() || matches!(d, Directive::Id | Directive::Alias) =>
                {
                    Some((d, key))
                }
                _ => None,
            });
            if let Some((d, key)) = nested {
                return Err(ValidationError::new(
                    format!("{} cannot be used inside a list item or a type selection", d),
                    join(path, key),
                ));
            }
        }
        let child_in_selection = in_selection
            || obj.keys().any(|key| {
                matches!(QueryKey::classify(key), QueryKey::Directive(d) if d.is_traversal())
            });

        if obj.contains_key("$list") {
            for conflicting in ["$find", "$aggregate"] {
                if obj.contains_key(conflicting) {
                    return Err(ValidationError::new(
                        format!("{} cannot be combined with $list", conflicting),
                        join(path, conflicting),
                    ));
                }
            }
        }
        if obj.contains_key("$find") && obj.contains_key("$aggregate") {
            return Err(ValidationError::new(
                "$aggregate cannot be combined with $find",
                join(path, "$aggregate"),
            ));
        }

        for (key, value) in obj {
            let here = join(path, key);
            match QueryKey::classify(key) {
                QueryKey::Unknown(k) => {
                    return Err(ValidationError::new(format!("Unknown directive {}", k), here))
                }
                QueryKey::Field(_) => match value {
                    Value::Bool(_) => {}
                    Value::Object(child) => self.node(child, &here, child_in_selection)?,
                    _ => {
                        return Err(ValidationError::new(
                            "Field value must be a boolean or an object",
                            here,
                        ))
                    }
                },
                QueryKey::Directive(d) if !d.allowed_on_node() => {
                    return Err(misplaced(d, "a node", &here));
                }
                QueryKey::Directive(d) => self.node_directive(d, value, &here)?,
            }
        }
        Ok(())
    }

    fn node_directive(&self, d: Directive, value: &Value, path: &str) -> ValidationResult<()> {
        match d {
            Directive::Id => match value.as_str() {
                Some(id) if !id.is_empty() => Ok(()),
                _ => Err(ValidationError::new("$id must be a non-empty string", path)),
            },
            Directive::Alias => {
                if is_string_or_strings(value) {
                    Ok(())
                } else {
                    Err(ValidationError::new(
                        "$alias must be a string or an array of strings",
                        path,
                    ))
                }
            }
            Directive::Language => match value.as_str() {
                Some(lang) if self.schema.has_language(lang) => Ok(()),
                Some(lang) => Err(ValidationError::new(
                    format!("Unknown language '{}'", lang),
                    path,
                )),
                None => Err(ValidationError::new("$language must be a string", path)),
            },
            Directive::List => match value {
                Value::Bool(true) => Ok(()),
                Value::Object(body) => self.list_body(body, path),
                _ => Err(ValidationError::new("$list must be true or an object", path)),
            },
            Directive::Find => match value {
                Value::Object(body) => self.find_body(body, path, Directive::Find),
                _ => Err(ValidationError::new("$find must be an object", path)),
            },
            Directive::Aggregate => match value {
                Value::Object(body) => self.find_body(body, path, Directive::Aggregate),
                _ => Err(ValidationError::new("$aggregate must be an object", path)),
            },
            Directive::Field => {
                if is_string_or_strings(value) {
                    Ok(())
                } else {
                    Err(ValidationError::new(
                        "$field must be a string or an array of strings",
                        path,
                    ))
                }
            }
            Directive::Default => Ok(()),
            Directive::Inherit => match value {
                Value::Bool(_) => Ok(()),
                Value::Object(body) => self.inherit_body(body, path),
                _ => Err(ValidationError::new(
                    "$inherit must be a boolean or an object",
                    path,
                )),
            },
            Directive::All => match value {
                Value::Bool(_) => Ok(()),
                _ => Err(ValidationError::new("$all must be a boolean", path)),
            },
            Directive::FieldsByType => {
                let body = value
                    .as_object()
                    .ok_or_else(|| ValidationError::new("$fieldsByType must be an object", path))?;
                for (type_name, selection) in body {
                    let here = join(path, type_name);
                    if type_name != "$any" && self.schema.type_schema(type_name).is_none() {
                        return Err(ValidationError::new(
                            format!("Unknown type '{}'", type_name),
                            here,
                        ));
                    }
                    let selection = selection.as_object().ok_or_else(|| {
                        ValidationError::new("Type selection must be an object", here.clone())
                    })?;
                    self.node(selection, &here, true)?;
                }
                Ok(())
            }
            other => Err(misplaced(other, "a node", path)),
        }
    }

    fn list_body(&self, body: &Map<String, Value>, path: &str) -> ValidationResult<()> {
        for (key, value) in body {
            let here = join(path, key);
            match QueryKey::classify(key) {
                QueryKey::Directive(Directive::Find) => match value {
                    Value::Object(find) => self.find_body(find, &here, Directive::Find)?,
                    _ => return Err(ValidationError::new("$find must be an object", here)),
                },
                QueryKey::Directive(Directive::Sort) => self.sort_body(value, &here)?,
                QueryKey::Directive(Directive::Limit) => check_limit(value, &here)?,
                QueryKey::Directive(Directive::Offset) => check_offset(value, &here)?,
                other => return Err(unexpected(other, "$list", here)),
            }
        }
        Ok(())
    }

    fn find_body(
        &self,
        body: &Map<String, Value>,
        path: &str,
        scope: Directive,
    ) -> ValidationResult<()> {
        for (key, value) in body {
            let here = join(path, key);
            match QueryKey::classify(key) {
                QueryKey::Directive(Directive::Traverse) => check_traverse(value, &here)?,
                QueryKey::Directive(Directive::Filter) => {
                    Fork::parse(value, &here)?;
                }
                QueryKey::Directive(Directive::Recursive) => {
                    if !value.is_boolean() {
                        return Err(ValidationError::new("$recursive must be a boolean", here));
                    }
                }
                QueryKey::Directive(Directive::Find) => match value {
                    Value::Object(find) => self.find_body(find, &here, Directive::Find)?,
                    _ => return Err(ValidationError::new("$find must be an object", here)),
                },
                QueryKey::Directive(Directive::Function) if scope == Directive::Aggregate => {
                    check_function(value, &here)?
                }
                QueryKey::Directive(Directive::Sort) if scope == Directive::Aggregate => {
                    self.sort_body(value, &here)?
                }
                QueryKey::Directive(Directive::Limit) if scope == Directive::Aggregate => {
                    check_limit(value, &here)?
                }
                QueryKey::Directive(Directive::Offset) if scope == Directive::Aggregate => {
                    check_offset(value, &here)?
                }
                other => return Err(unexpected(other, scope.as_str(), here)),
            }
        }
        Ok(())
    }

    fn sort_body(&self, value: &Value, path: &str) -> ValidationResult<()> {
        let body = value
            .as_object()
            .ok_or_else(|| ValidationError::new("$sort must be an object", path))?;
        if !body.get("$field").map(Value::is_string).unwrap_or(false) {
            return Err(ValidationError::new("$sort requires a string $field", path));
        }
        for (key, value) in body {
            let here = join(path, key);
            match QueryKey::classify(key) {
                QueryKey::Directive(Directive::Field) => {}
                QueryKey::Directive(Directive::Order) => match value.as_str() {
                    Some("asc") | Some("desc") => {}
                    _ => {
                        return Err(ValidationError::new(
                            "$order must be one of asc, desc",
                            here,
                        ))
                    }
                },
                other => return Err(unexpected(other, "$sort", here)),
            }
        }
        Ok(())
    }

    fn inherit_body(&self, body: &Map<String, Value>, path: &str) -> ValidationResult<()> {
        for (key, value) in body {
            let here = join(path, key);
            match QueryKey::classify(key) {
                QueryKey::Directive(Directive::Type) => {
                    if !is_string_or_strings(value) {
                        return Err(ValidationError::new(
                            "$type must be a string or an array of strings",
                            here,
                        ));
                    }
                    let names: Vec<&str> = match value {
                        Value::String(s) => vec![s.as_str()],
                        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
                        _ => Vec::new(),
                    };
                    if let Some(missing) =
                        names.iter().find(|n| self.schema.type_schema(n).is_none())
                    {
                        return Err(ValidationError::new(
                            format!("Unknown type '{}'", missing),
                            here,
                        ));
                    }
                }
                QueryKey::Directive(Directive::Merge) => {
                    if !value.is_boolean() {
                        return Err(ValidationError::new("$merge must be a boolean", here));
                    }
                }
                other => return Err(unexpected(other, "$inherit", here)),
            }
        }
        Ok(())
    }
}

fn unexpected(key: QueryKey<'_>, scope: &str, path: String) -> ValidationError {
    match key {
        QueryKey::Unknown(k) => ValidationError::new(format!("Unknown directive {}", k), path),
        QueryKey::Field(k) => {
            ValidationError::new(format!("Unexpected property '{}' in {}", k, scope), path)
        }
        QueryKey::Directive(d) => misplaced(d, scope, &path),
    }
}

fn check_limit(value: &Value, path: &str) -> ValidationResult<()> {
    match value.as_i64() {
        Some(n) if n >= -1 => Ok(()),
        _ => Err(ValidationError::new("$limit must be an integer >= -1", path)),
    }
}

fn check_offset(value: &Value, path: &str) -> ValidationResult<()> {
    match value.as_i64() {
        Some(n) if n >= 0 => Ok(()),
        _ => Err(ValidationError::new("$offset must be an integer >= 0", path)),
    }
}

fn check_traverse(value: &Value, path: &str) -> ValidationResult<()> {
    match value {
        Value::String(_) => Ok(()),
        Value::Array(_) if is_string_or_strings(value) => Ok(()),
        Value::Object(by_type) if !by_type.is_empty() => {
            for (type_name, edges) in by_type {
                if !is_string_or_strings(edges) {
                    return Err(ValidationError::new(
                        "Traversal edges must be a string or an array of strings",
                        join(path, type_name),
                    ));
                }
            }
            Ok(())
        }
        _ => Err(ValidationError::new(
            "$traverse must be a field name, an id list or a traversal expression",
            path,
        )),
    }
}

fn check_function(value: &Value, path: &str) -> ValidationResult<()> {
    match value {
        Value::String(_) => Ok(()),
        Value::Object(body) => {
            if !body.get("$name").map(Value::is_string).unwrap_or(false) {
                return Err(ValidationError::new("$function requires a string $name", path));
            }
            for (key, arg) in body {
                let here = join(path, key);
                match QueryKey::classify(key) {
                    QueryKey::Directive(Directive::Name) => {}
                    QueryKey::Directive(Directive::Args) => {
                        if !is_string_or_strings(arg) {
                            return Err(ValidationError::new(
                                "$args must be a string or an array of strings",
                                here,
                            ));
                        }
                    }
                    other => return Err(unexpected(other, "$function", here)),
                }
            }
            Ok(())
        }
        _ => Err(ValidationError::new(
            "$function must be a string or an object",
            path,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, TypeSchema};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn schema() -> Schema {
        let mut types = BTreeMap::new();
        types.insert(
            "match".to_string(),
            TypeSchema::new(
                "ma",
                BTreeMap::from([("title".to_string(), FieldType::Text)]),
            ),
        );
        Schema::new(vec!["en".into()], types)
    }

    fn check(query: Value) -> ValidationResult<()> {
        let schema = schema();
        QueryValidator::new(&schema).validate(&query)
    }

    #[test]
    fn test_valid_query() {
        check(json!({
            "$id": "root",
            "$language": "en",
            "title": true,
            "items": {
                "id": true,
                "$list": {
                    "$sort": {"$field": "createdAt", "$order": "desc"},
                    "$limit": 10,
                    "$find": {
                        "$traverse": "descendants",
                        "$filter": {"$field": "type", "$operator": "=", "$value": "match"}
                    }
                }
            },
            "total": {"$aggregate": {"$function": "count", "$traverse": "children"}}
        }))
        .unwrap();
    }

    #[test]
    fn test_unknown_directive() {
        let err = check(json!({"items": {"$lsit": true}})).unwrap_err();
        assert_eq!(err.to_string(), "Query error: Unknown directive $lsit at \"items.$lsit\"");
    }

    #[test]
    fn test_misplaced_directive() {
        let err = check(json!({"items": {"$filter": {}}})).unwrap_err();
        assert_eq!(err.path(), "items.$filter");
        assert!(err.reason().contains("only allowed inside $find, $aggregate"));
    }

    #[test]
    fn test_bad_enum_value() {
        let err = check(json!({
            "items": {"$list": {"$sort": {"$field": "x", "$order": "up"}}}
        }))
        .unwrap_err();
        assert_eq!(err.path(), "items.$list.$sort.$order");
    }

    #[test]
    fn test_list_and_aggregate_conflict() {
        let err = check(json!({
            "items": {"$list": true, "$aggregate": {"$function": "count"}}
        }))
        .unwrap_err();
        assert_eq!(err.path(), "items.$aggregate");
    }

    #[test]
    fn test_unknown_language() {
        let err = check(json!({"$language": "fr"})).unwrap_err();
        assert_eq!(err.path(), "$language");
    }

    #[test]
    fn test_function_only_in_aggregate() {
        let err = check(json!({
            "items": {"$list": {"$find": {"$function": "count"}}}
        }))
        .unwrap_err();
        assert_eq!(err.path(), "items.$list.$find.$function");
    }

    #[test]
    fn test_traversal_inside_list_item() {
        let err = check(json!({
            "items": {"$list": true, "sub": {"$list": true}}
        }))
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Query error: $list cannot be used inside a list item or a type selection at \"items.sub.$list\""
        );

        let err = check(json!({
            "items": {"$list": true, "deep": {"owner": {"$id": "le1", "name": true}}}
        }))
        .unwrap_err();
        assert_eq!(err.path(), "items.deep.owner.$id");
    }

    #[test]
    fn test_traversal_inside_type_selection() {
        let err = check(json!({
            "$fieldsByType": {"match": {"rounds": {"$find": {"$traverse": "children"}}}}
        }))
        .unwrap_err();
        assert_eq!(err.path(), "$fieldsByType.match.rounds.$find");

        check(json!({
            "$id": "root",
            "items": {"$list": true, "title": {"$field": "name", "$default": "?"}}
        }))
        .unwrap();
    }

    #[test]
    fn test_inherit_type_checked() {
        check(json!({"title": {"$inherit": {"$type": "match"}}})).unwrap();
        let err = check(json!({"title": {"$inherit": {"$type": "league"}}})).unwrap_err();
        assert_eq!(err.path(), "title.$inherit.$type");
    }
}
