//! JSON Patch (RFC 6902) over `serde_json::Value`
//!
//! Patches are the interchange format for schema diffs and version
//! deltas. Paths are JSON Pointers (RFC 6901).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single patch operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Operation {
    Add { path: String, value: Value },
    Remove { path: String },
    Replace { path: String, value: Value },
    Move { from: String, path: String },
    Copy { from: String, path: String },
    Test { path: String, value: Value },
}

impl Operation {
    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self::Add { path: path.into(), value }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        Self::Remove { path: path.into() }
    }

    pub fn replace(path: impl Into<String>, value: Value) -> Self {
        Self::Replace { path: path.into(), value }
    }

    /// Target pointer of the operation
    pub fn path(&self) -> &str {
        match self {
            Self::Add { path, .. }
            | Self::Remove { path }
            | Self::Replace { path, .. }
            | Self::Move { path, .. }
            | Self::Copy { path, .. }
            | Self::Test { path, .. } => path,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Remove { .. } => "remove",
            Self::Replace { .. } => "replace",
            Self::Move { .. } => "move",
            Self::Copy { .. } => "copy",
            Self::Test { .. } => "test",
        }
    }
}

/// Errors raised while loading or applying a patch
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatchError {
    #[error("Invalid patch operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid JSON pointer: {0}")]
    InvalidPointer(String),

    #[error("Path not found: {0}")]
    PathNotFound(String),

    #[error("Invalid array index in path: {0}")]
    InvalidIndex(String),

    #[error("Test operation failed at {0}")]
    TestFailed(String),
}

/// Parse and validate a patch document (a JSON array of operations)
pub fn parse_patch(json: &str) -> Result<Vec<Operation>, PatchError> {
    let value: Value =
        serde_json::from_str(json).map_err(|e| PatchError::InvalidOperation(e.to_string()))?;
    operations_from_value(value)
}

/// Validate an already-decoded patch document
pub fn operations_from_value(value: Value) -> Result<Vec<Operation>, PatchError> {
    let operations: Vec<Operation> =
        serde_json::from_value(value).map_err(|e| PatchError::InvalidOperation(e.to_string()))?;
    for operation in &operations {
        split_pointer(operation.path())?;
    }
    Ok(operations)
}

/// Escape one reference token (`~` → `~0`, `/` → `~1`)
pub fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn unescape_token(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Split a pointer into unescaped reference tokens. `""` is the root.
pub fn split_pointer(pointer: &str) -> Result<Vec<String>, PatchError> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    let Some(rest) = pointer.strip_prefix('/') else {
        return Err(PatchError::InvalidPointer(pointer.to_string()));
    };
    Ok(rest.split('/').map(unescape_token).collect())
}

/// Apply `operations` to a copy of `document`.
///
/// Application is atomic: the first failing operation aborts the patch
/// and `document` is never modified.
pub fn apply_patch(document: &Value, operations: &[Operation]) -> Result<Value, PatchError> {
    let mut working = document.clone();
    for operation in operations {
        apply_operation(&mut working, operation)?;
    }
    Ok(working)
}

fn apply_operation(document: &mut Value, operation: &Operation) -> Result<(), PatchError> {
    match operation {
        Operation::Add { path, value } => add(document, path, value.clone()),
        Operation::Remove { path } => remove(document, path).map(|_| ()),
        Operation::Replace { path, value } => {
            let target = lookup_mut(document, &split_pointer(path)?, path)?;
            *target = value.clone();
            Ok(())
        }
        Operation::Move { from, path } => {
            if path.starts_with(&format!("{}/", from)) {
                return Err(PatchError::InvalidOperation(format!(
                    "cannot move {} into its own child {}",
                    from, path
                )));
            }
            let value = remove(document, from)?;
            add(document, path, value)
        }
        Operation::Copy { from, path } => {
            let value = lookup(document, &split_pointer(from)?, from)?.clone();
            add(document, path, value)
        }
        Operation::Test { path, value } => {
            if lookup(document, &split_pointer(path)?, path)? == value {
                Ok(())
            } else {
                Err(PatchError::TestFailed(path.clone()))
            }
        }
    }
}

fn lookup<'a>(document: &'a Value, tokens: &[String], path: &str) -> Result<&'a Value, PatchError> {
    let mut current = document;
    for token in tokens {
        current = match current {
            Value::Object(map) => map.get(token),
            Value::Array(items) => items.get(array_index(token, path)?),
            _ => None,
        }
        .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;
    }
    Ok(current)
}

fn lookup_mut<'a>(
    document: &'a mut Value,
    tokens: &[String],
    path: &str,
) -> Result<&'a mut Value, PatchError> {
    let mut current = document;
    for token in tokens {
        current = match current {
            Value::Object(map) => map.get_mut(token),
            Value::Array(items) => {
                let index = array_index(token, path)?;
                items.get_mut(index)
            }
            _ => None,
        }
        .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;
    }
    Ok(current)
}

fn array_index(token: &str, path: &str) -> Result<usize, PatchError> {
    if token.len() > 1 && token.starts_with('0') {
        return Err(PatchError::InvalidIndex(path.to_string()));
    }
    token
        .parse()
        .map_err(|_| PatchError::InvalidIndex(path.to_string()))
}

fn add(document: &mut Value, path: &str, value: Value) -> Result<(), PatchError> {
    let tokens = split_pointer(path)?;
    let Some((last, parent_tokens)) = tokens.split_last() else {
        *document = value;
        return Ok(());
    };

    match lookup_mut(document, parent_tokens, path)? {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        Value::Array(items) => {
            if last == "-" {
                items.push(value);
                return Ok(());
            }
            let index = array_index(last, path)?;
            if index > items.len() {
                return Err(PatchError::InvalidIndex(path.to_string()));
            }
            items.insert(index, value);
            Ok(())
        }
        _ => Err(PatchError::PathNotFound(path.to_string())),
    }
}

fn remove(document: &mut Value, path: &str) -> Result<Value, PatchError> {
    let tokens = split_pointer(path)?;
    let Some((last, parent_tokens)) = tokens.split_last() else {
        return Err(PatchError::InvalidOperation("cannot remove the document root".into()));
    };

    match lookup_mut(document, parent_tokens, path)? {
        Value::Object(map) => map
            .shift_remove(last)
            .ok_or_else(|| PatchError::PathNotFound(path.to_string())),
        Value::Array(items) => {
            let index = array_index(last, path)?;
            if index >= items.len() {
                return Err(PatchError::InvalidIndex(path.to_string()));
            }
            Ok(items.remove(index))
        }
        _ => Err(PatchError::PathNotFound(path.to_string())),
    }
}

/// Generate the operations that turn `before` into `after`.
///
/// Objects are compared key by key. Arrays that differ in any way are
/// replaced whole, so a reordered list shows up as one `replace`.
pub fn compare(before: &Value, after: &Value) -> Vec<Operation> {
    let mut operations = Vec::new();
    compare_at("", before, after, &mut operations);
    operations
}

fn compare_at(path: &str, before: &Value, after: &Value, operations: &mut Vec<Operation>) {
    if before == after {
        return;
    }
    match (before, after) {
        (Value::Object(old), Value::Object(new)) => {
            for (key, old_value) in old {
                let child = format!("{}/{}", path, escape_token(key));
                match new.get(key) {
                    Some(new_value) => compare_at(&child, old_value, new_value, operations),
                    None => operations.push(Operation::remove(child)),
                }
            }
            for (key, new_value) in new {
                if !old.contains_key(key) {
                    let child = format!("{}/{}", path, escape_token(key));
                    operations.push(Operation::add(child, new_value.clone()));
                }
            }
        }
        _ => operations.push(Operation::replace(path, after.clone())),
    }
}
