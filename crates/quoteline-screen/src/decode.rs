//! Upstream body decoding and field projection.

use std::sync::Arc;

use quoteline_core::FetchError;
use serde_json::Value;

use crate::config::FieldMapping;
use crate::record::{FieldValue, NormalizedRecord};

/// Pull the raw positional quote array out of a 200 body.
///
/// Expected shape: `{"data": {"<id>": {"qt": {"<id>": [ ... ]}}}}`.
pub fn extract_quote(body: &str, identifier: &str) -> Result<Vec<Value>, FetchError> {
    let mut doc: Value =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(format!("invalid JSON: {e}")))?;
    let slot = doc
        .get_mut("data")
        .and_then(|d| d.get_mut(identifier))
        .and_then(|d| d.get_mut("qt"))
        .and_then(|q| q.get_mut(identifier))
        .ok_or_else(|| FetchError::Malformed(format!("no data.{identifier}.qt.{identifier}")))?;
    match slot.take() {
        Value::Array(items) => Ok(items),
        other => Err(FetchError::Malformed(format!(
            "quote for {identifier} is not an array: {other}"
        ))),
    }
}

/// Project a raw quote array into mapping order.
///
/// The identifier column takes the requested identifier; every other column
/// is coerced through [`coerce`].
pub fn project(
    raw: &[Value],
    mapping: &FieldMapping,
    columns: &Arc<[String]>,
    identifier: &str,
) -> Result<NormalizedRecord, FetchError> {
    let id_pos = mapping.id_position();
    let mut values = Vec::with_capacity(mapping.len());
    for (pos, spec) in mapping.fields().iter().enumerate() {
        if pos == id_pos {
            values.push(FieldValue::Text(identifier.to_string()));
            continue;
        }
        let raw_value = raw.get(spec.index).ok_or_else(|| {
            FetchError::Malformed(format!(
                "field '{}' wants index {} but quote has {} entries",
                spec.name,
                spec.index,
                raw.len()
            ))
        })?;
        values.push(coerce(raw_value));
    }
    Ok(NormalizedRecord::new(columns.clone(), id_pos, values))
}

/// JSON numbers and numeric-looking strings become numbers; the rest is text.
pub fn coerce(value: &Value) -> FieldValue {
    match value {
        Value::Number(n) => n
            .as_f64()
            .map(FieldValue::Number)
            .unwrap_or_else(|| FieldValue::Text(n.to_string())),
        Value::String(s) => match parse_numeric(s) {
            Some(n) => FieldValue::Number(n),
            None => FieldValue::Text(s.clone()),
        },
        Value::Null => FieldValue::Text(String::new()),
        other => FieldValue::Text(other.to_string()),
    }
}

/// Parse a plain decimal literal: optional sign, digits, at most one `.`,
/// at least one digit. No exponents, no whitespace, no `inf`/`nan`.
pub fn parse_numeric(text: &str) -> Option<f64> {
    let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
    let mut seen_digit = false;
    let mut seen_dot = false;
    for c in digits.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return None,
        }
    }
    if !seen_digit {
        return None;
    }
    text.parse().ok()
}
