//! Value coercions from document fields to column values.
//!
//! Every function returns `None` for input it cannot use; callers decide
//! whether that means a default, NULL or dropping the record.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::core::ColumnValue;

/// Namespace for row ids derived from `collection/document id`.
pub const ROW_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2d7e_8a4b_5c39_9e02_b7d4_1a6f_3c85);

/// Deterministic row id for a document, stable across runs.
pub fn row_id(collection: &str, source_id: &str) -> Uuid {
    Uuid::new_v5(&ROW_ID_NAMESPACE, format!("{}/{}", collection, source_id).as_bytes())
}

/// Number from a JSON number or a numeric string.
pub fn numeric(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Integer from a JSON number or numeric string; fractions are truncated.
pub fn integer(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(truncate)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(truncate))
        }
        _ => None,
    }
}

fn truncate(f: f64) -> Option<i64> {
    (f.is_finite() && f.abs() < i64::MAX as f64).then(|| f.trunc() as i64)
}

/// Only an explicit JSON boolean counts.
pub fn boolean(value: Option<&Value>) -> Option<bool> {
    value?.as_bool()
}

/// Text from a string, number or boolean.
pub fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Instant from a store-native timestamp object, an RFC 3339 or `YYYY-MM-DD`
/// string, or epoch milliseconds.
///
/// Store-native objects come as `{"_seconds", "_nanoseconds"}` (admin SDK
/// JSON) or `{"seconds", "nanos"}` / `{"seconds", "nanoseconds"}`.
pub fn timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::Object(map) => {
            let seconds = map
                .get("_seconds")
                .or_else(|| map.get("seconds"))
                .and_then(|v| integer(Some(v)))?;
            let nanos = map
                .get("_nanoseconds")
                .or_else(|| map.get("nanoseconds"))
                .or_else(|| map.get("nanos"))
                .and_then(|v| integer(Some(v)))
                .unwrap_or(0);
            let nanos = u32::try_from(nanos).ok().filter(|n| *n < 1_000_000_000)?;
            Utc.timestamp_opt(seconds, nanos).single()
        }
        Value::String(s) => {
            let s = s.trim();
            if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                return Some(ts.with_timezone(&Utc));
            }
            let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?;
            Some(date.and_hms_opt(0, 0, 0)?.and_utc())
        }
        Value::Number(n) => Utc.timestamp_millis_opt(n.as_i64()?).single(),
        _ => None,
    }
}

/// Seconds since the epoch from an integer or anything [`timestamp`] accepts.
pub fn unix_seconds(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(_) => integer(value),
        Value::String(s) if s.trim().parse::<f64>().is_ok() => integer(value),
        _ => timestamp(value).map(|ts| ts.timestamp()),
    }
}

/// Text array elements. Nested arrays are flattened, scalars stringified and
/// nulls skipped, since a PostgreSQL `TEXT[]` cannot hold any of them as is.
pub fn text_array(value: Option<&Value>) -> Option<Vec<Value>> {
    let Value::Array(items) = value? else {
        return None;
    };
    let mut out = Vec::with_capacity(items.len());
    flatten_into(items, &mut out);
    Some(out)
}

fn flatten_into(items: &[Value], out: &mut Vec<Value>) {
    for item in items {
        match item {
            Value::Null => {}
            Value::Array(inner) => flatten_into(inner, out),
            Value::String(_) => out.push(item.clone()),
            other => out.push(Value::String(other.to_string())),
        }
    }
}

/// Column value for a field copied without a typed rule.
pub fn verbatim(value: &Value) -> ColumnValue {
    match value {
        Value::Null => ColumnValue::Null,
        Value::Bool(b) => ColumnValue::Bool(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => ColumnValue::Integer(i),
            None => n
                .as_f64()
                .map(ColumnValue::Numeric)
                .unwrap_or(ColumnValue::Null),
        },
        Value::String(s) => ColumnValue::Text(s.clone()),
        Value::Array(items) => ColumnValue::Array(items.clone()),
        Value::Object(_) => ColumnValue::Json(value.clone()),
    }
}

/// `camelCase`, `kebab-case` or `PascalCase` key to `snake_case`.
pub fn snake_case(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    let mut out = String::with_capacity(key.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c == '-' || c == ' ' || c == '.' {
            push_separator(&mut out);
        } else if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let starts_word = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };
            if starts_word {
                push_separator(&mut out);
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out.trim_matches('_').to_string()
}

fn push_separator(out: &mut String) {
    if !out.is_empty() && !out.ends_with('_') {
        out.push('_');
    }
}
