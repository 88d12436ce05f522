//! Parsing for free-form key/value inputs: headers, object metadata, tags.
//!
//! A malformed optional field must never abort the whole transfer, so this
//! module raises no errors: anything unparseable degrades to "field absent"
//! with a logged warning.

use std::collections::BTreeMap;

use tracing::warn;

/// Parse a free-form string into a mapping.  Accepts either a JSON object
/// (values coerced to strings) or a `key=value;key=value` list.  Returns
/// `None` for empty, whitespace-only, or entirely unparseable input.
pub fn parse(input: Option<&str>, field: &str) -> Option<BTreeMap<String, String>> {
    let raw = input?.trim();
    if raw.is_empty() {
        return None;
    }

    if raw.starts_with('{') {
        match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(raw) {
            Ok(object) => {
                let map: BTreeMap<_, _> = object
                    .into_iter()
                    .map(|(key, value)| {
                        let value = match value {
                            serde_json::Value::String(s) => s,
                            other => other.to_string(),
                        };
                        (key, value)
                    })
                    .collect();
                return if map.is_empty() { None } else { Some(map) };
            }
            Err(err) => {
                warn!(field, %err, "not valid JSON; falling back to the k=v;k=v form");
            }
        }
    }

    let mut map = BTreeMap::new();
    for segment in raw.split(';') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let Some((key, value)) = segment.split_once('=') else {
            warn!(field, segment, "segment has no `=`; skipped");
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            warn!(field, segment, "segment has an empty key; skipped");
            continue;
        }
        map.insert(key.to_string(), value.trim().to_string());
    }

    if map.is_empty() {
        None
    } else {
        Some(map)
    }
}
