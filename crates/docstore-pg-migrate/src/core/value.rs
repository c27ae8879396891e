//! Record and value types flowing through extract, transform and load.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// One document as read from the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// The document's native identifier.
    pub source_id: String,

    /// Document fields, untouched.
    pub fields: Map<String, Value>,
}

impl RawRecord {
    pub fn new(source_id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            source_id: source_id.into(),
            fields,
        }
    }

    /// Field value, treating JSON null as absent.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name).filter(|v| !v.is_null())
    }
}

/// A single destination column value.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Bool(bool),
    Integer(i64),
    Numeric(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    /// Maps to a PostgreSQL array column.
    Array(Vec<Value>),
    /// Maps to a JSONB column.
    Json(Value),
}

impl ColumnValue {
    /// JSON encoding used for bulk insertion.
    ///
    /// Timestamps become RFC 3339 strings and UUIDs their hyphenated form,
    /// both of which PostgreSQL parses on input. Non-finite floats have no
    /// JSON form and become null.
    pub fn to_json(&self) -> Value {
        match self {
            ColumnValue::Null => Value::Null,
            ColumnValue::Bool(b) => Value::Bool(*b),
            ColumnValue::Integer(i) => Value::from(*i),
            ColumnValue::Numeric(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ColumnValue::Text(s) => Value::String(s.clone()),
            ColumnValue::Uuid(u) => Value::String(u.to_string()),
            ColumnValue::Timestamp(ts) => {
                Value::String(ts.to_rfc3339_opts(SecondsFormat::Micros, true))
            }
            ColumnValue::Array(items) => Value::Array(items.clone()),
            ColumnValue::Json(v) => v.clone(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }
}

/// A row ready for insertion. Column order is stable (sorted by name).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransformedRecord {
    /// Identifier of the document this row came from.
    pub source_id: String,

    pub columns: BTreeMap<String, ColumnValue>,
}

impl TransformedRecord {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            columns: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, column: impl Into<String>, value: ColumnValue) {
        self.columns.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&ColumnValue> {
        self.columns.get(column)
    }

    /// JSON object keyed by column name.
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .columns
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        Value::Object(map)
    }
}
