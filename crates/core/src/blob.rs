//! Dot-path access into record payloads and normalized JSON comparison.
//!
//! Payload schemas are owned by the upstream; the core only reads a handful of
//! well-known paths and never deserializes the whole document into typed
//! structs.

use serde_json::Value;

/// Look up a dot-separated path inside a JSON value.
///
/// Only object keys are traversed; array indexing is not supported because no
/// inspected path needs it.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for key in path.split('.') {
        current = current.as_object()?.get(key)?;
    }
    Some(current)
}

/// Look up a path and return it as a non-empty string slice.
pub fn get_string<'a>(value: &'a Value, path: &str) -> Option<&'a str> {
    match get_path(value, path) {
        Some(Value::String(s)) if !s.is_empty() => Some(s),
        _ => None,
    }
}

/// Write or clear a dot-separated path inside a JSON object, creating
/// intermediate objects as needed. Clearing a path whose parents are missing
/// is a no-op.
pub fn set_path(value: &mut Value, path: &str, new: Option<Value>) {
    let mut keys = path.split('.').peekable();
    let mut current = value;
    while let Some(key) = keys.next() {
        let last = keys.peek().is_none();
        let Some(obj) = current.as_object_mut() else {
            return;
        };
        if last {
            match new {
                Some(v) => {
                    obj.insert(key.to_string(), v);
                }
                None => {
                    obj.remove(key);
                }
            }
            return;
        }
        if new.is_some() {
            current = obj
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Default::default()));
        } else {
            match obj.get_mut(key) {
                Some(v) => current = v,
                None => return,
            }
        }
    }
}

/// Compare two optional JSON values structurally.
///
/// `serde_json` maps already normalize the persisted semantics we need: key
/// order is irrelevant and duplicate keys collapse to the last value during
/// parsing, matching how the datastore's jsonb columns behave. A missing value
/// only equals another missing value.
pub fn normalized_eq(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
