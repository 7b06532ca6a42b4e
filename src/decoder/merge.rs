//! Path-addressed merge into the result tree

use serde_json::{Map, Value};

/// Merges `value` into `root` at the dotted `path`.
///
/// Missing intermediate objects are created. Two objects deep-merge; any
/// other pair is replaced by `value`. An empty path merges into `root` itself.
pub fn merge_at(root: &mut Value, path: &str, value: Value) {
    let mut current = root;
    if !path.is_empty() {
        for segment in path.split('.') {
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }
            let Value::Object(map) = current else {
                return;
            };
            current = map.entry(segment.to_string()).or_insert(Value::Null);
        }
    }
    deep_merge(current, value);
}

/// Deep-merges `value` into `target`
pub fn deep_merge(target: &mut Value, value: Value) {
    match (target, value) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (key, incoming_value) in incoming {
                match existing.get_mut(&key) {
                    Some(slot) => deep_merge(slot, incoming_value),
                    None => {
                        existing.insert(key, incoming_value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Reads the value at a dotted path
pub fn get_at<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }
    path.split('.').try_fold(root, |current, segment| current.get(segment))
}
