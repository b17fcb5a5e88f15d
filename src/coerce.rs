//! Defensive extraction of scalars and objects from registry payloads.
//!
//! The upstream registries represent the same logical field inconsistently
//! across record versions: a plain string in one response, a singleton list
//! of `{field: value, nrWpisuWprow: n}` in another, or a nested object.
//! Every extraction site goes through these helpers so that unexpected
//! shapes degrade to "absent" instead of failing the whole normalization.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use serde_json::{Map, Value};

/// Candidate key names searched when a text value must be pulled out of an
/// object. Includes the field aliases observed in KRS/CEIDG responses.
const TEXT_KEYS: &[&str] = &[
    "value",
    "text",
    "nazwa",
    "name",
    "opis",
    "nazwaSkrocona",
    "formaPrawna",
    "status",
    "kodDzial",
    "kod",
    "imiona",
    "nazwisko",
];

static EMPTY_OBJECT: Lazy<Map<String, Value>> = Lazy::new(Map::new);

/// Shared empty object for callers that need a `&Map` placeholder.
pub fn empty_object() -> &'static Map<String, Value> {
    &EMPTY_OBJECT
}

/// Extract the best available string from a value of unknown shape.
///
/// Rules, in order: null/empty is absent; strings are trimmed (empty after
/// trim is absent); numbers and booleans are stringified; lists recurse on
/// their first element, with objects searched by candidate key and then by
/// first non-empty string value; bare objects get the candidate-key search
/// only.
pub fn coerce_str(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => {
            let first = items.first()?;
            match first {
                Value::Object(map) => {
                    text_by_candidate_key(map).or_else(|| first_string_value(map))
                }
                other => coerce_str(other),
            }
        }
        Value::Object(map) => text_by_candidate_key(map),
    }
}

/// Extract an object from a value that may be an object or a list whose
/// first element is an object.
pub fn coerce_object(value: &Value) -> Option<&Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map),
        Value::Array(items) => items.first().and_then(Value::as_object),
        _ => None,
    }
}

/// View a value as a list of entries: lists yield their elements, a bare
/// object is treated as a singleton, anything else is empty. Registry
/// sections that are "usually a list" collapse to a single object when they
/// hold one entry.
pub fn coerce_entries(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![value],
        _ => Vec::new(),
    }
}

/// Coerced string lookup on an object member.
pub fn str_at(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key).and_then(coerce_str)
}

/// Member object lookup; a missing or malformed member yields an empty map
/// so callers can keep chaining without branching.
pub fn section<'a>(map: &'a Map<String, Value>, key: &str) -> &'a Map<String, Value> {
    map.get(key).and_then(coerce_object).unwrap_or(&EMPTY_OBJECT)
}

/// Like [`section`], but a missing member falls back to the map itself.
/// KRS wraps its payload in `odpis`/`dane` envelopes that older responses
/// omit entirely.
pub fn section_or_self<'a>(map: &'a Map<String, Value>, key: &str) -> &'a Map<String, Value> {
    match map.get(key) {
        Some(member) => coerce_object(member).unwrap_or(&EMPTY_OBJECT),
        None => map,
    }
}

/// Parse a date from the leading `YYYY-MM-DD` slice of a registry value.
/// Both registries append time or annotation suffixes inconsistently.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let head = raw.get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

/// Python-style truthiness for flag fields (`przewazajace` arrives as a
/// bool, a number, or the string "true" depending on the API version).
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Null => false,
    }
}

fn text_by_candidate_key(map: &Map<String, Value>) -> Option<String> {
    for key in TEXT_KEYS {
        if let Some(found) = map.get(*key) {
            if is_truthy(found) {
                if let Some(text) = coerce_str(found) {
                    return Some(text);
                }
            }
        }
    }
    None
}

fn first_string_value(map: &Map<String, Value>) -> Option<String> {
    map.values().find_map(|v| {
        v.as_str()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    })
}
