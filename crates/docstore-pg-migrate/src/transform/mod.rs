//! Transformer: documents to destination rows.
//!
//! Collections with a built-in [`TransformRule`] get typed columns; anything
//! else falls back to copying every field under a snake_case key. A record
//! is dropped only when a field it cannot do without is missing or invalid,
//! and every drop is reported with its reason.

pub mod coerce;
pub mod rules;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::core::{ColumnValue, RawRecord, TransformedRecord};
use crate::error::MigrateError;
use crate::schema::Catalog;

pub use rules::{Coercion, FieldRule, TransformRule, BUILTIN_RULES};

/// A record the transformer could not turn into a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedRecord {
    pub source_id: String,
    pub reason: String,
}

impl DroppedRecord {
    pub fn into_error(self, collection: &str) -> MigrateError {
        MigrateError::TransformDrop {
            collection: collection.to_string(),
            source_id: self.source_id,
            reason: self.reason,
        }
    }
}

/// Rows ready for loading plus the records that were dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformOutput {
    pub records: Vec<TransformedRecord>,
    pub dropped: Vec<DroppedRecord>,
}

/// Applies per-collection rules.
///
/// The execution time is fixed at construction and used wherever a
/// timestamp is missing, so the same input always yields the same output.
#[derive(Debug, Clone)]
pub struct Transformer {
    rules: BTreeMap<&'static str, &'static TransformRule>,
    catalog: Catalog,
    boolean_defaults: BTreeMap<String, bool>,
    executed_at: DateTime<Utc>,
}

impl Transformer {
    /// Built-in rules, stamping `executed_at` for missing timestamps.
    pub fn new(catalog: Catalog, executed_at: DateTime<Utc>) -> Self {
        Self {
            rules: BUILTIN_RULES.iter().map(|r| (r.collection, *r)).collect(),
            catalog,
            boolean_defaults: BTreeMap::new(),
            executed_at,
        }
    }

    /// Boolean defaults keyed by `table.column`, taking precedence over the
    /// schema's declared defaults.
    pub fn with_boolean_defaults(mut self, defaults: BTreeMap<String, bool>) -> Self {
        self.boolean_defaults = defaults;
        self
    }

    pub fn executed_at(&self) -> DateTime<Utc> {
        self.executed_at
    }

    pub fn rule_for(&self, collection: &str) -> Option<&'static TransformRule> {
        self.rules.get(collection).copied()
    }

    /// Transform every record of `collection`.
    pub fn transform(&self, collection: &str, records: &[RawRecord]) -> TransformOutput {
        let mut output = TransformOutput::default();
        let rule = self.rule_for(collection);
        if rule.is_none() {
            debug!("No rule for {}, copying fields verbatim", collection);
        }

        for record in records {
            let result = match rule {
                Some(rule) => self.apply_rule(rule, record),
                None => Ok(self.apply_generic(record)),
            };
            match result {
                Ok(row) => output.records.push(row),
                Err(reason) => {
                    let dropped = DroppedRecord {
                        source_id: record.source_id.clone(),
                        reason,
                    };
                    warn!("{}", dropped.clone().into_error(collection));
                    output.dropped.push(dropped);
                }
            }
        }
        output
    }

    fn apply_rule(
        &self,
        rule: &TransformRule,
        record: &RawRecord,
    ) -> std::result::Result<TransformedRecord, String> {
        let mut row = TransformedRecord::new(&record.source_id);
        row.set(
            "id",
            ColumnValue::Uuid(coerce::row_id(rule.collection, &record.source_id)),
        );
        for f in rule.fields {
            let value = self.apply_field(rule.table, f, record)?;
            row.set(f.column, value);
        }
        Ok(row)
    }

    fn apply_field(
        &self,
        table: &str,
        f: &FieldRule,
        record: &RawRecord,
    ) -> std::result::Result<ColumnValue, String> {
        let raw = f.sources.iter().find_map(|s| record.field(s));
        let value = match f.coercion {
            Coercion::SourceId => ColumnValue::Text(record.source_id.clone()),
            Coercion::Text(default) => {
                ColumnValue::Text(coerce::text(raw).unwrap_or_else(|| default.to_string()))
            }
            Coercion::OptionalText => coerce::text(raw).map_or(ColumnValue::Null, ColumnValue::Text),
            Coercion::RequiredText => match coerce::text(raw) {
                Some(s) if !s.trim().is_empty() => ColumnValue::Text(s),
                _ => return Err(format!("missing required field {}", f.sources.join("/"))),
            },
            Coercion::Choice { values, default } => match raw {
                None => ColumnValue::Text(default.to_string()),
                Some(v) => {
                    let given = coerce::text(Some(v)).unwrap_or_else(|| v.to_string());
                    match values.iter().find(|c| c.eq_ignore_ascii_case(given.trim())) {
                        Some(canonical) => ColumnValue::Text(canonical.to_string()),
                        None => {
                            return Err(format!(
                                "{} '{}' is not one of {}",
                                f.column,
                                given,
                                values.join(", ")
                            ))
                        }
                    }
                }
            },
            Coercion::Numeric(default) => {
                ColumnValue::Numeric(coerce::numeric(raw).unwrap_or(default))
            }
            Coercion::OptionalNumeric => {
                coerce::numeric(raw).map_or(ColumnValue::Null, ColumnValue::Numeric)
            }
            Coercion::Integer(default) => {
                ColumnValue::Integer(coerce::integer(raw).unwrap_or(default))
            }
            Coercion::OptionalInteger => {
                coerce::integer(raw).map_or(ColumnValue::Null, ColumnValue::Integer)
            }
            Coercion::UnixSeconds => ColumnValue::Integer(
                coerce::unix_seconds(raw).unwrap_or_else(|| self.executed_at.timestamp()),
            ),
            Coercion::Bool => ColumnValue::Bool(
                coerce::boolean(raw).unwrap_or_else(|| self.boolean_default(table, f.column)),
            ),
            Coercion::Timestamp => {
                ColumnValue::Timestamp(coerce::timestamp(raw).unwrap_or(self.executed_at))
            }
            Coercion::OptionalTimestamp => {
                coerce::timestamp(raw).map_or(ColumnValue::Null, ColumnValue::Timestamp)
            }
            Coercion::TextArray => ColumnValue::Array(coerce::text_array(raw).unwrap_or_default()),
            Coercion::JsonObject => match raw {
                Some(v @ Value::Object(_)) => ColumnValue::Json(v.clone()),
                _ => ColumnValue::Json(Value::Object(Map::new())),
            },
            Coercion::Json => match raw {
                Some(v @ (Value::Object(_) | Value::Array(_))) => ColumnValue::Json(v.clone()),
                _ => ColumnValue::Json(Value::Object(Map::new())),
            },
            Coercion::Reference(collection) => match coerce::text(raw) {
                Some(id) if !id.trim().is_empty() => {
                    ColumnValue::Uuid(coerce::row_id(collection, id.trim()))
                }
                _ => ColumnValue::Null,
            },
        };
        Ok(value)
    }

    /// Config override, then the schema default, then `false`.
    fn boolean_default(&self, table: &str, column: &str) -> bool {
        self.boolean_defaults
            .get(&format!("{}.{}", table, column))
            .copied()
            .or_else(|| self.catalog.bool_default(table, column))
            .unwrap_or(false)
    }

    /// Copy every field under a snake_case key and add the document id and
    /// bookkeeping timestamps.
    fn apply_generic(&self, record: &RawRecord) -> TransformedRecord {
        let mut row = TransformedRecord::new(&record.source_id);
        for (key, value) in &record.fields {
            row.set(coerce::snake_case(key), coerce::verbatim(value));
        }
        row.set("firebase_id", ColumnValue::Text(record.source_id.clone()));
        for (column, source) in [("created_at", "createdAt"), ("updated_at", "updatedAt")] {
            let ts = coerce::timestamp(record.field(source)).unwrap_or(self.executed_at);
            row.set(column, ColumnValue::Timestamp(ts));
        }
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn executed_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
    }

    fn transformer() -> Transformer {
        Transformer::new(Catalog::builtin(), executed_at())
    }

    fn record(id: &str, fields: Value) -> RawRecord {
        match fields {
            Value::Object(map) => RawRecord::new(id, map),
            _ => panic!("fields must be an object"),
        }
    }

    #[test]
    fn test_users_missing_email_defaults_to_empty_string() {
        let records = vec![
            record("u1", json!({"email": "a@x.com", "displayName": "Ada"})),
            record("u2", json!({"name": "Grace"})),
            record("u3", json!({"email": "c@x.com", "isActive": false, "emailVerified": true})),
        ];
        let output = transformer().transform("users", &records);

        assert!(output.dropped.is_empty());
        assert_eq!(output.records.len(), 3);
        let u2 = &output.records[1];
        assert_eq!(u2.get("email"), Some(&ColumnValue::Text(String::new())));
        assert_eq!(u2.get("display_name"), Some(&ColumnValue::Text("Grace".into())));
        assert_eq!(u2.get("firebase_uid"), Some(&ColumnValue::Text("u2".into())));
        assert_eq!(u2.get("is_active"), Some(&ColumnValue::Bool(true)));
        assert_eq!(u2.get("is_verified"), Some(&ColumnValue::Bool(false)));
        assert_eq!(
            u2.get("profile_type"),
            Some(&ColumnValue::Text("individual".into()))
        );
        assert_eq!(u2.get("created_at"), Some(&ColumnValue::Timestamp(executed_at())));

        let u3 = &output.records[2];
        assert_eq!(u3.get("is_active"), Some(&ColumnValue::Bool(false)));
        assert_eq!(u3.get("is_verified"), Some(&ColumnValue::Bool(true)));
    }

    #[test]
    fn test_investments_numeric_and_collection_coercions() {
        let records = vec![record(
            "inv1",
            json!({
                "title": "Solar farm",
                "amountToSell": "250000.50",
                "priceToken": 50,
                "annualReturn": "n/a",
                "estimatedDeliveryTime": "18",
                "images": [["a.png"], "b.png"],
                "documents": [{"name": "prospectus.pdf"}],
                "createdAt": {"_seconds": 1_700_000_000, "_nanoseconds": 0}
            }),
        )];
        let output = transformer().transform("investments", &records);
        let row = &output.records[0];

        assert_eq!(row.get("amount_to_sell"), Some(&ColumnValue::Numeric(250000.5)));
        assert_eq!(row.get("price_token"), Some(&ColumnValue::Numeric(50.0)));
        assert_eq!(row.get("annual_return"), Some(&ColumnValue::Numeric(0.0)));
        assert_eq!(row.get("amount_sold"), Some(&ColumnValue::Numeric(0.0)));
        assert_eq!(
            row.get("percentage_private_sale"),
            Some(&ColumnValue::Numeric(100.0))
        );
        assert_eq!(row.get("estimated_delivery_time"), Some(&ColumnValue::Integer(18)));
        assert_eq!(
            row.get("images"),
            Some(&ColumnValue::Array(vec![json!("a.png"), json!("b.png")]))
        );
        assert_eq!(
            row.get("documents"),
            Some(&ColumnValue::Json(json!([{"name": "prospectus.pdf"}])))
        );
        assert_eq!(row.get("is_hidden"), Some(&ColumnValue::Bool(false)));
        assert_eq!(row.get("project_status"), Some(&ColumnValue::Text("active".into())));
        assert_eq!(
            row.get("created_at"),
            Some(&ColumnValue::Timestamp(
                Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap()
            ))
        );
        assert_eq!(row.get("updated_at"), Some(&ColumnValue::Timestamp(executed_at())));
    }

    #[test]
    fn test_references_line_up_with_row_ids() {
        let t = transformer();
        let users = t.transform("users", &[record("uid-1", json!({"email": "a@x"}))]);
        let investments = t.transform("investments", &[record("inv-1", json!({}))]);
        let positions = t.transform(
            "user-investments",
            &[
                record("p1", json!({"userId": "uid-1", "investmentId": "inv-1"})),
                record("p2", json!({})),
            ],
        );

        let p1 = &positions.records[0];
        assert_eq!(p1.get("user_id"), users.records[0].get("id"));
        assert_eq!(p1.get("investment_id"), investments.records[0].get("id"));
        assert_eq!(positions.records[1].get("user_id"), Some(&ColumnValue::Null));
    }

    #[test]
    fn test_missing_required_field_drops_record() {
        let records = vec![
            record("t1", json!({"transferId": "TR-1", "amount": "10"})),
            record("t2", json!({"amount": 5})),
            record("t3", json!({"transferId": "TR-3", "status": "refunded"})),
            record("t4", json!({"transferId": 99, "status": "COMPLETED"})),
        ];
        let output = transformer().transform("transactions-mangopay", &records);

        assert_eq!(output.records.len(), 2);
        assert_eq!(output.dropped.len(), 2);
        assert_eq!(output.dropped[0].source_id, "t2");
        assert!(output.dropped[0].reason.contains("transferId"));
        assert_eq!(output.dropped[1].source_id, "t3");
        assert!(output.dropped[1].reason.contains("refunded"));

        let t4 = &output.records[1];
        assert_eq!(t4.get("transfer_id"), Some(&ColumnValue::Text("99".into())));
        assert_eq!(t4.get("status"), Some(&ColumnValue::Text("completed".into())));
    }

    #[test]
    fn test_boolean_defaults_come_from_schema_then_config() {
        let records = vec![record("p1", json!({"userId": "u1", "alertOtp": false}))];

        let output = transformer().transform("user-panel", &records);
        let row = &output.records[0];
        assert_eq!(row.get("alert_new_document"), Some(&ColumnValue::Bool(true)));
        assert_eq!(row.get("alert_otp"), Some(&ColumnValue::Bool(false)));

        let mut overrides = BTreeMap::new();
        overrides.insert("user_preferences.alert_new_document".to_string(), false);
        let output = transformer()
            .with_boolean_defaults(overrides)
            .transform("user-panel", &records);
        assert_eq!(
            output.records[0].get("alert_new_document"),
            Some(&ColumnValue::Bool(false))
        );
    }

    #[test]
    fn test_generic_fallback_copies_fields() {
        let records = vec![record(
            "s1",
            json!({"sessionToken": "abc", "hitCount": 3, "meta": {"ip": "1.2.3.4"}, "updatedAt": "2024-01-02T03:04:05Z"}),
        )];
        let output = transformer().transform("sessions", &records);
        let row = &output.records[0];

        assert_eq!(row.get("session_token"), Some(&ColumnValue::Text("abc".into())));
        assert_eq!(row.get("hit_count"), Some(&ColumnValue::Integer(3)));
        assert_eq!(row.get("meta"), Some(&ColumnValue::Json(json!({"ip": "1.2.3.4"}))));
        assert_eq!(row.get("firebase_id"), Some(&ColumnValue::Text("s1".into())));
        assert_eq!(row.get("created_at"), Some(&ColumnValue::Timestamp(executed_at())));
        assert_eq!(
            row.get("updated_at"),
            Some(&ColumnValue::Timestamp(
                Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
            ))
        );
        assert!(row.get("id").is_none());
    }

    #[test]
    fn test_transform_is_deterministic() {
        let records = vec![
            record("d1", json!({"investmentId": "inv-1", "totalAmount": "1000"})),
            record("d2", json!({"isRent": true})),
        ];
        let t = transformer();
        let first = t.transform("dividends", &records);
        let second = t.transform("dividends", &records);
        assert_eq!(first, second);
    }
}
