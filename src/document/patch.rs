use crate::catalog::types::{Object, Value};
use crate::error::KvdocError;
use serde::{Deserialize, Serialize};

/// One field-level change. Paths are JSON pointers (`/address/city`); the
/// empty path addresses the whole document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatchOp {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
}

impl PatchOp {
    pub fn path(&self) -> &str {
        match self {
            PatchOp::Add { path, .. } | PatchOp::Remove { path } | PatchOp::Replace { path, .. } => {
                path
            }
        }
    }

    pub fn to_value(&self) -> Value {
        let mut entry = Object::new();
        let (op, value) = match self {
            PatchOp::Add { value, .. } => ("add", Some(value)),
            PatchOp::Remove { .. } => ("remove", None),
            PatchOp::Replace { value, .. } => ("replace", Some(value)),
        };
        entry.insert("op".into(), Value::from(op));
        entry.insert("path".into(), Value::from(self.path()));
        if let Some(value) = value {
            entry.insert("value".into(), value.clone());
        }
        Value::Object(entry)
    }
}

/// Structured difference between a record's pre- and post-state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub ops: Vec<PatchOp>,
}

impl Patch {
    /// Operations turning `before` into `after`. Objects are compared field by
    /// field; any other change replaces the value at its path.
    pub fn diff(before: &Value, after: &Value) -> Self {
        let mut ops = Vec::new();
        diff_into(&mut ops, String::new(), before, after);
        Self { ops }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn apply(&self, target: &mut Value) -> Result<(), KvdocError> {
        for op in &self.ops {
            match op {
                PatchOp::Add { path, value } | PatchOp::Replace { path, value } => {
                    match split_parent(path)? {
                        None => *target = value.clone(),
                        Some((parent, field)) => {
                            parent_object(target, &parent, path)?.insert(field, value.clone());
                        }
                    }
                }
                PatchOp::Remove { path } => {
                    let Some((parent, field)) = split_parent(path)? else {
                        *target = Value::Null;
                        continue;
                    };
                    if parent_object(target, &parent, path)?.remove(&field).is_none() {
                        return Err(KvdocError::Decode(format!(
                            "patch removes missing field '{path}'"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Array of `{op, path, value?}` objects, as yielded for `Echo::Diff`.
    pub fn to_value(&self) -> Value {
        Value::Array(self.ops.iter().map(PatchOp::to_value).collect())
    }
}

fn diff_into(ops: &mut Vec<PatchOp>, path: String, before: &Value, after: &Value) {
    match (before, after) {
        (Value::Object(old), Value::Object(new)) => {
            for (key, old_value) in old {
                let child = format!("{path}/{}", escape(key));
                match new.get(key) {
                    Some(new_value) => diff_into(ops, child, old_value, new_value),
                    None => ops.push(PatchOp::Remove { path: child }),
                }
            }
            for (key, new_value) in new {
                if !old.contains_key(key) {
                    ops.push(PatchOp::Add {
                        path: format!("{path}/{}", escape(key)),
                        value: new_value.clone(),
                    });
                }
            }
        }
        _ if before == after => {}
        _ => ops.push(PatchOp::Replace {
            path,
            value: after.clone(),
        }),
    }
}

fn escape(segment: &str) -> String {
    segment.replace('~', "~0").replace('/', "~1")
}

fn unescape(segment: &str) -> String {
    segment.replace("~1", "/").replace("~0", "~")
}

/// Splits a pointer into its parent segments and final field.
fn split_parent(path: &str) -> Result<Option<(Vec<String>, String)>, KvdocError> {
    if path.is_empty() {
        return Ok(None);
    }
    let Some(rest) = path.strip_prefix('/') else {
        return Err(KvdocError::Decode(format!("patch path '{path}' must start with '/'")));
    };
    let mut segments: Vec<String> = rest.split('/').map(unescape).collect();
    match segments.pop() {
        Some(field) => Ok(Some((segments, field))),
        None => Ok(None),
    }
}

fn parent_object<'a>(
    target: &'a mut Value,
    parents: &[String],
    path: &str,
) -> Result<&'a mut Object, KvdocError> {
    let mut current = target;
    for segment in parents {
        current = match current {
            Value::Object(fields) => fields.get_mut(segment).ok_or_else(|| {
                KvdocError::Decode(format!("patch path '{path}' has no parent '{segment}'"))
            })?,
            _ => {
                return Err(KvdocError::Decode(format!(
                    "patch path '{path}' crosses a non-object"
                )));
            }
        };
    }
    match current {
        Value::Object(fields) => Ok(fields),
        _ => Err(KvdocError::Decode(format!(
            "patch path '{path}' crosses a non-object"
        ))),
    }
}
