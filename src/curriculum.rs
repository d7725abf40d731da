use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl PathSegment {
    fn as_key(&self) -> String {
        match self {
            PathSegment::Key(key) => key.clone(),
            PathSegment::Index(index) => index.to_string(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("no field `{key}` under `{at}`")]
    MissingKey { key: String, at: String },
    #[error("index {index} is out of range under `{at}` (length {len})")]
    IndexOutOfRange { index: usize, len: usize, at: String },
    #[error("`{at}` is a {kind} and cannot be descended into")]
    NotAContainer { kind: &'static str, at: String },
    #[error("`{at}` is a list and needs a numeric index, got `{key}`")]
    ExpectedIndex { key: String, at: String },
}

/// Parses dotted paths such as `units.0.lessons.2.title`; numeric segments
/// become indexes.
pub fn parse_path(raw: &str) -> Vec<PathSegment> {
    raw.split('.')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.parse::<usize>() {
            Ok(index) => PathSegment::Index(index),
            Err(_) => PathSegment::Key(segment.to_string()),
        })
        .collect()
}

fn render(path: &[PathSegment]) -> String {
    if path.is_empty() {
        return "$".to_string();
    }
    path.iter().map(PathSegment::as_key).collect::<Vec<_>>().join(".")
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

#[derive(Clone, Copy)]
enum Edit<'v> {
    Set(&'v Value),
    Remove,
}

/// Returns a copy of `doc` with `value` placed at `path`. An index equal to a
/// list's length appends. `doc` itself is never modified.
pub fn set_at(doc: &Value, path: &[PathSegment], value: Value) -> Result<Value, PathError> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }
    apply(doc, path, 0, Edit::Set(&value))
}

/// Returns a copy of `doc` without the field or list item at `path`.
pub fn remove_at(doc: &Value, path: &[PathSegment]) -> Result<Value, PathError> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }
    apply(doc, path, 0, Edit::Remove)
}

fn apply(node: &Value, path: &[PathSegment], depth: usize, edit: Edit<'_>) -> Result<Value, PathError> {
    let segment = &path[depth];
    let last = depth + 1 == path.len();
    let at = || render(&path[..depth]);

    match node {
        Value::Object(fields) => {
            let key = segment.as_key();
            let mut updated = fields.clone();
            if last {
                match edit {
                    Edit::Set(value) => {
                        updated.insert(key, value.clone());
                    }
                    Edit::Remove => {
                        if updated.remove(&key).is_none() {
                            return Err(PathError::MissingKey { key, at: at() });
                        }
                    }
                }
            } else {
                let child = fields.get(&key).ok_or_else(|| PathError::MissingKey {
                    key: key.clone(),
                    at: at(),
                })?;
                updated.insert(key, apply(child, path, depth + 1, edit)?);
            }
            Ok(Value::Object(updated))
        }
        Value::Array(items) => {
            let PathSegment::Index(index) = *segment else {
                return Err(PathError::ExpectedIndex {
                    key: segment.as_key(),
                    at: at(),
                });
            };
            let out_of_range = || PathError::IndexOutOfRange {
                index,
                len: items.len(),
                at: at(),
            };
            let mut updated = items.clone();
            match (last, edit) {
                (true, Edit::Set(value)) if index == items.len() => updated.push(value.clone()),
                (true, Edit::Set(value)) => {
                    *updated.get_mut(index).ok_or_else(out_of_range)? = value.clone();
                }
                (true, Edit::Remove) => {
                    if index >= items.len() {
                        return Err(out_of_range());
                    }
                    updated.remove(index);
                }
                (false, _) => {
                    let child = items.get(index).ok_or_else(out_of_range)?;
                    updated[index] = apply(child, path, depth + 1, edit)?;
                }
            }
            Ok(Value::Array(updated))
        }
        other => Err(PathError::NotAContainer {
            kind: kind_of(other),
            at: at(),
        }),
    }
}
