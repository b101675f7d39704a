use crate::catalog::types::{Object, Value};
use crate::error::KvdocError;
use crate::statement::Data;

/// Applies the statement payload to the evolving post-state.
pub fn apply_data(current: &mut Value, data: &Data) -> Result<(), KvdocError> {
    if !matches!(current, Value::Object(_)) {
        return Err(KvdocError::Merge(format!(
            "stored record is a {}, not an object",
            current.kind()
        )));
    }
    match data {
        Data::Empty => Ok(()),
        Data::Set(assignments) => {
            for (path, value) in assignments {
                set_path(current, path, value.clone())?;
            }
            Ok(())
        }
        Data::Content(content) => {
            let Value::Object(fields) = content else {
                return Err(KvdocError::Merge(format!(
                    "CONTENT expects an object, got {}",
                    content.kind()
                )));
            };
            *current = Value::Object(fields.clone());
            Ok(())
        }
        Data::Merge(patch) => {
            let Value::Object(fields) = patch else {
                return Err(KvdocError::Merge(format!(
                    "MERGE expects an object, got {}",
                    patch.kind()
                )));
            };
            if let Value::Object(target) = current {
                deep_merge(target, fields);
            }
            Ok(())
        }
    }
}

/// Assigns `value` at a dotted path, creating missing intermediate objects.
pub fn set_path(target: &mut Value, path: &str, value: Value) -> Result<(), KvdocError> {
    let parts: Vec<&str> = path.split('.').collect();
    if parts.iter().any(|part| part.is_empty()) {
        return Err(KvdocError::Merge(format!("invalid field path '{path}'")));
    }
    match target {
        Value::Object(fields) => assign(fields, &parts, path, value),
        other => Err(KvdocError::Merge(format!(
            "cannot set '{path}' on a {}",
            other.kind()
        ))),
    }
}

fn assign(target: &mut Object, parts: &[&str], path: &str, value: Value) -> Result<(), KvdocError> {
    match parts {
        [] => Err(KvdocError::Merge(format!("invalid field path '{path}'"))),
        [last] => {
            target.insert((*last).to_string(), value);
            Ok(())
        }
        [head, rest @ ..] => {
            let slot = target
                .entry((*head).to_string())
                .or_insert_with(Value::object);
            if slot.is_null() {
                *slot = Value::object();
            }
            match slot {
                Value::Object(nested) => assign(nested, rest, path, value),
                other => Err(KvdocError::Merge(format!(
                    "cannot set '{path}': '{head}' is a {}",
                    other.kind()
                ))),
            }
        }
    }
}

/// Null in the patch removes the field; nested objects merge recursively.
fn deep_merge(target: &mut Object, patch: &Object) {
    for (key, incoming) in patch {
        match incoming {
            Value::Null => {
                target.remove(key);
            }
            Value::Object(nested) => match target.get_mut(key) {
                Some(Value::Object(existing)) => deep_merge(existing, nested),
                _ => {
                    let mut fresh = Object::new();
                    deep_merge(&mut fresh, nested);
                    target.insert(key.clone(), Value::Object(fresh));
                }
            },
            other => {
                target.insert(key.clone(), other.clone());
            }
        }
    }
}
