use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::DEFAULT_RECOGNIZED_KEYS;

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("no JSON object or array found in the response")]
    NoStructureFound,
    #[error("could not parse the recovered structure: {0}")]
    UnparsableStructure(#[source] serde_json::Error),
    #[error("recovered structure has none of the expected list keys {expected:?}")]
    UnrecognizedShape { expected: Vec<String> },
}

/// A JSON object holding at least one recognized list.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveredRecord {
    fields: Map<String, Value>,
    list_key: String,
}

impl RecoveredRecord {
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn list_key(&self) -> &str {
        &self.list_key
    }

    pub fn list(&self) -> &[Value] {
        self.fields
            .get(&self.list_key)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.fields)
    }
}

pub fn recover_default(text: &str) -> Result<RecoveredRecord, RecoveryError> {
    recover(text, DEFAULT_RECOGNIZED_KEYS)
}

/// Locates, repairs and parses the JSON payload embedded in free-form model output.
///
/// Repairs are heuristics: fences and surrounding prose are dropped, whitespace
/// outside string literals is collapsed, trailing commas are removed and
/// unclosed brackets are closed. Input that is already valid JSON passes
/// through unchanged.
pub fn recover<K: AsRef<str>>(text: &str, keys: &[K]) -> Result<RecoveredRecord, RecoveryError> {
    let unfenced = strip_fences(text);
    let span = locate_span(&unfenced).ok_or(RecoveryError::NoStructureFound)?;
    let normalized = normalize(span);
    let balanced = close_open_structures(&normalized);
    if balanced != normalized {
        log::debug!("closed unterminated structures in model output");
    }

    let value = match serde_json::from_str::<Value>(&balanced) {
        Ok(value) => value,
        Err(err) => match parse_inner_span(&normalized) {
            Some(value) => {
                log::debug!("full parse failed ({err}); recovered from inner span");
                value
            }
            None => return Err(RecoveryError::UnparsableStructure(err)),
        },
    };

    validate_shape(value, keys)
}

fn fence_pattern() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"(?i)```[ \t]*[a-z0-9_+\-]*").expect("fence pattern is valid"))
}

fn strip_fences(text: &str) -> String {
    fence_pattern().replace_all(text, "").into_owned()
}

fn locate_span(text: &str) -> Option<&str> {
    let start = match (text.find('{'), text.find('[')) {
        (Some(brace), Some(bracket)) => brace.min(bracket),
        (Some(idx), None) | (None, Some(idx)) => idx,
        (None, None) => return None,
    };
    let rest = &text[start..];
    let end = match (rest.rfind('}'), rest.rfind(']')) {
        (Some(brace), Some(bracket)) => Some(brace.max(bracket)),
        (brace, bracket) => brace.or(bracket),
    };
    Some(match end {
        Some(end) => &rest[..=end],
        None => rest,
    })
}

fn is_invisible(ch: char) -> bool {
    matches!(ch, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}')
}

fn drop_trailing_comma(out: &mut String) {
    let kept = out.trim_end_matches(' ').len();
    if out[..kept].ends_with(',') {
        out.truncate(kept - 1);
    }
}

fn normalize(span: &str) -> String {
    let mut out = String::with_capacity(span.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut chars = span.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_string {
            if (ch as u32) < 0x20 {
                // a backslash before a raw line break escapes nothing
                if escaped {
                    out.pop();
                    escaped = false;
                }
                while matches!(chars.peek(), Some(next) if next.is_whitespace()) {
                    chars.next();
                }
                if !out.ends_with(' ') {
                    out.push(' ');
                }
                continue;
            }
            if escaped {
                escaped = false;
                out.push(ch);
                continue;
            }
            match ch {
                '\\' => {
                    escaped = true;
                    out.push(ch);
                }
                '"' => {
                    in_string = false;
                    out.push(ch);
                }
                _ => out.push(ch),
            }
            continue;
        }

        if is_invisible(ch) {
            continue;
        }
        if ch.is_whitespace() {
            if !out.is_empty() && !out.ends_with(' ') {
                out.push(' ');
            }
            continue;
        }
        if ch == '}' || ch == ']' {
            drop_trailing_comma(&mut out);
        }
        if ch == '"' {
            in_string = true;
        }
        out.push(ch);
    }

    let trimmed = out.trim_end().len();
    out.truncate(trimmed);
    out
}

// closes innermost first
fn close_open_structures(text: &str) -> String {
    let mut pending: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => pending.push('}'),
            '[' => pending.push(']'),
            '}' | ']' => {
                if pending.last() == Some(&ch) {
                    pending.pop();
                }
            }
            _ => {}
        }
    }

    let mut out = text.to_string();
    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    while let Some(closer) = pending.pop() {
        drop_trailing_comma(&mut out);
        out.push(closer);
    }
    out
}

fn parse_inner_span(text: &str) -> Option<Value> {
    [('{', '}'), ('[', ']')].into_iter().find_map(|(open, close)| {
        let start = text.find(open)?;
        let end = text.rfind(close)?;
        if start >= end {
            return None;
        }
        serde_json::from_str(&text[start..=end]).ok()
    })
}

fn validate_shape<K: AsRef<str>>(value: Value, keys: &[K]) -> Result<RecoveredRecord, RecoveryError> {
    let unrecognized = || RecoveryError::UnrecognizedShape {
        expected: keys.iter().map(|k| k.as_ref().to_string()).collect(),
    };

    let Value::Object(fields) = value else {
        return Err(unrecognized());
    };
    let list_key = keys
        .iter()
        .map(|key| key.as_ref())
        .find(|key: &&str| fields.get(*key).is_some_and(Value::is_array))
        .map(str::to_string)
        .ok_or_else(unrecognized)?;

    Ok(RecoveredRecord { fields, list_key })
}
