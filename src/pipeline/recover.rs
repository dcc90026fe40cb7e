//! Recovery of a JSON object from free-form model output.
//!
//! Small models rarely answer with bare JSON. Typical shapes seen in practice:
//!
//! - a fenced ` ```json ... ``` ` block surrounded by commentary
//! - prose followed by an object, sometimes followed by more prose
//! - JavaScript-flavoured objects: single quotes, trailing commas, bare keys
//!
//! [`recover`] handles all three with a fixed sequence: locate a candidate,
//! parse it, and on failure apply the repair rules once and parse again.
//! Nothing here returns an error: a response either yields an object or it
//! doesn't, and the caller records the page as unrecoverable.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

/// Recover a JSON object from raw completion text.
///
/// Returns `None` when no candidate can be located, when it fails to parse
/// after one repair pass, or when the parsed value is not an object.
pub fn recover(raw: &str) -> Option<Map<String, Value>> {
    let candidate = match fenced_object(raw) {
        Some(c) => c,
        None => balanced_object(raw)?,
    };

    match parse_object(candidate) {
        Some(obj) => Some(obj),
        None => {
            let repaired = repair(candidate);
            debug!("Initial JSON parse failed, retrying after repair");
            parse_object(&repaired)
        }
    }
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Some(map),
        Ok(other) => {
            debug!("Recovered JSON is not an object ({})", type_name(&other));
            None
        }
        Err(e) => {
            debug!("JSON parse error: {}", e);
            None
        }
    }
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Step 1: fenced block ─────────────────────────────────────────────────────

static RE_FENCED_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(\{.*?\})\s*```").unwrap());

/// Contents of the first fenced block that holds an object.
fn fenced_object(raw: &str) -> Option<&str> {
    RE_FENCED_OBJECT
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

// ── Step 2: brace scan ───────────────────────────────────────────────────────

/// The span from the first `{` to the brace that brings nesting back to zero.
///
/// Braces inside string literals are ignored; `\"` does not close a string.
fn balanced_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in raw[start..].char_indices() {
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
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Some(&raw[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}

// ── Step 3: repair ───────────────────────────────────────────────────────────

static RE_TRAILING_COMMA_OBJ: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*\}").unwrap());
static RE_TRAILING_COMMA_ARR: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*\]").unwrap());
static RE_BARE_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([\{,])\s*([A-Za-z_][A-Za-z0-9_]*)\s*:").unwrap());
static RE_NULL_STRING: Lazy<Regex> = Lazy::new(|| Regex::new(r#":\s*"null""#).unwrap());

/// Apply the repair rules in order:
/// 1. single quotes → double quotes
/// 2. drop trailing commas before `}` and `]`
/// 3. quote bare identifier keys
/// 4. `"null"` string values → `null`
pub(crate) fn repair(candidate: &str) -> String {
    let s = candidate.replace('\'', "\"");
    let s = RE_TRAILING_COMMA_OBJ.replace_all(&s, "}");
    let s = RE_TRAILING_COMMA_ARR.replace_all(&s, "]");
    let s = RE_BARE_KEY.replace_all(&s, "$1\"$2\":");
    RE_NULL_STRING.replace_all(&s, ": null").into_owned()
}
