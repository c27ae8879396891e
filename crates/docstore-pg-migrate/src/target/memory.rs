//! In-memory relational target.
//!
//! Understands the statements rendered by [`crate::schema::ddl`] well enough
//! to enforce what matters for a migration rehearsal. Referenced relations
//! must exist and inserted columns must be declared. NOT NULL columns and
//! unique keys reject the whole batch. Foreign key values are not checked
//! against the referenced rows.
//!
//! Used by `--dry-run` and by tests, which can also script failures for
//! specific calls.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::core::{ColumnValue, RelationalTarget, StoreResult, TableObjects, TransformedRecord};
use crate::error::StoreError;
use crate::schema::RowPolicy;

#[derive(Debug, Default)]
struct MemoryTable {
    columns: BTreeSet<String>,
    /// NOT NULL and primary key columns.
    not_null: BTreeSet<String>,
    /// Columns with a DEFAULT expression.
    defaults: BTreeSet<String>,
    /// Column sets that must be unique across rows; each has at least one column.
    unique_keys: Vec<Vec<String>>,
    objects: TableObjects,
    rows: Vec<TransformedRecord>,
}

impl MemoryTable {
    /// PostgreSQL fills a column from its default only when the insert does
    /// not list it. A listed column is NULL for every row that lacks it.
    fn check_not_null(&self, table: &str, rows: &[TransformedRecord]) -> StoreResult<()> {
        let listed: BTreeSet<&str> = rows
            .iter()
            .flat_map(|r| r.columns.keys().map(String::as_str))
            .collect();

        for column in &self.not_null {
            let violated = if listed.contains(column.as_str()) {
                rows.iter()
                    .any(|r| r.get(column).map_or(true, ColumnValue::is_null))
            } else {
                !rows.is_empty() && !self.defaults.contains(column)
            };
            if violated {
                return Err(StoreError::permanent(format!(
                    "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                    column, table
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct State {
    tables: BTreeMap<String, MemoryTable>,
    statements: Vec<String>,
    policies: Vec<(String, String)>,
    bulk_insert_calls: usize,
    insert_failures: BTreeMap<usize, StoreError>,
    ddl_failures: BTreeMap<String, StoreError>,
    statement_failures: Vec<(String, StoreError)>,
    unreachable: Option<StoreError>,
}

/// [`RelationalTarget`] backed by process memory.
#[derive(Debug)]
pub struct MemoryTarget {
    schema: String,
    state: Mutex<State>,
}

impl Default for MemoryTarget {
    fn default() -> Self {
        Self::new("public")
    }
}

impl MemoryTarget {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            state: Mutex::new(State::default()),
        }
    }

    /// Declare a table directly, bypassing DDL.
    pub fn with_table(mut self, name: &str, columns: &[&str], unique_keys: &[&[&str]]) -> Self {
        let table = MemoryTable {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique_keys: unique_keys
                .iter()
                .map(|k| k.iter().map(|c| c.to_string()).collect())
                .collect(),
            ..MemoryTable::default()
        };
        self.state.get_mut().tables.insert(name.to_string(), table);
        self
    }

    /// Fail the `call`-th bulk insert (1-based, counted across all tables).
    pub fn fail_bulk_insert(mut self, call: usize, error: StoreError) -> Self {
        self.state.get_mut().insert_failures.insert(call, error);
        self
    }

    /// Fail the `CREATE TABLE` statement for `table`.
    pub fn fail_create_table(mut self, table: &str, error: StoreError) -> Self {
        self.state
            .get_mut()
            .ddl_failures
            .insert(table.to_string(), error);
        self
    }

    /// Fail the next statement containing `fragment`, once.
    pub fn fail_ddl_matching(mut self, fragment: &str, error: StoreError) -> Self {
        self.state
            .get_mut()
            .statement_failures
            .push((fragment.to_string(), error));
        self
    }

    /// Fail every [`RelationalTarget::ping`] with `error`.
    pub fn unreachable(mut self, error: StoreError) -> Self {
        self.state.get_mut().unreachable = Some(error);
        self
    }

    pub async fn rows(&self, table: &str) -> Vec<TransformedRecord> {
        let state = self.state.lock().await;
        state
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub async fn row_count(&self, table: &str) -> usize {
        let state = self.state.lock().await;
        state.tables.get(table).map_or(0, |t| t.rows.len())
    }

    pub async fn table_names(&self) -> Vec<String> {
        self.state.lock().await.tables.keys().cloned().collect()
    }

    /// Every statement accepted by `execute_ddl`, in order.
    pub async fn statements(&self) -> Vec<String> {
        self.state.lock().await.statements.clone()
    }

    /// Installed policies as `(table, policy name)`.
    pub async fn policies(&self) -> Vec<(String, String)> {
        self.state.lock().await.policies.clone()
    }

    pub async fn bulk_insert_calls(&self) -> usize {
        self.state.lock().await.bulk_insert_calls
    }

    fn missing_relation(&self, table: &str) -> StoreError {
        StoreError::permanent(format!(
            "relation \"{}.{}\" does not exist",
            self.schema, table
        ))
    }

    /// Table name from a qualified reference in our schema.
    fn local_name(&self, schema: &str, table: String) -> Option<String> {
        (schema == self.schema).then_some(table)
    }

    fn apply_create_table(&self, state: &mut State, statement: &str) -> StoreResult<()> {
        let Some(rest) = statement.trim_start().strip_prefix("CREATE TABLE IF NOT EXISTS ") else {
            return Err(StoreError::permanent("unsupported CREATE TABLE form"));
        };
        let (schema, name, body) = parse_qualified(rest)
            .ok_or_else(|| StoreError::permanent("malformed table name"))?;
        let name = self
            .local_name(&schema, name)
            .ok_or_else(|| StoreError::permanent(format!("schema \"{}\" does not exist", schema)))?;

        if let Some(err) = state.ddl_failures.remove(&name) {
            return Err(err);
        }

        for (ref_schema, ref_table) in references(body) {
            let known = ref_schema == self.schema
                && (ref_table == name || state.tables.contains_key(&ref_table));
            if !known {
                return Err(StoreError::permanent(format!(
                    "relation \"{}.{}\" does not exist",
                    ref_schema, ref_table
                )));
            }
        }

        if state.tables.contains_key(&name) {
            return Ok(());
        }

        let mut table = MemoryTable::default();
        for line in body.lines().map(str::trim) {
            if let Some(list) = line.strip_prefix("UNIQUE (") {
                table.unique_keys.push(quoted_list(list));
            } else if let Some((column, attrs)) = parse_quoted(line) {
                if attrs.contains(" PRIMARY KEY") || attrs.contains(" UNIQUE") {
                    table.unique_keys.push(vec![column.clone()]);
                }
                if attrs.contains(" PRIMARY KEY") || attrs.contains(" NOT NULL") {
                    table.not_null.insert(column.clone());
                }
                if attrs.contains(" DEFAULT ") {
                    table.defaults.insert(column.clone());
                }
                if let Some((_, referenced)) = references(attrs).into_iter().next() {
                    table.objects.foreign_keys.insert((column.clone(), referenced));
                }
                table.columns.insert(column);
            }
        }
        state.tables.insert(name, table);
        Ok(())
    }

    /// Relations other statements operate on must already exist.
    fn check_target_relation(&self, state: &State, statement: &str) -> StoreResult<()> {
        for marker in [" ON ", "ALTER TABLE "] {
            for (idx, _) in statement.match_indices(marker) {
                let after = &statement[idx + marker.len()..];
                if let Some((schema, table, _)) = parse_qualified(after) {
                    if schema == self.schema && !state.tables.contains_key(&table) {
                        return Err(self.missing_relation(&table));
                    }
                }
            }
        }
        Ok(())
    }

    /// Record indexes and triggers on the table they are created on.
    fn record_objects(&self, state: &mut State, statement: &str) {
        if let Some(rest) = statement.trim_start().strip_prefix("CREATE INDEX IF NOT EXISTS ") {
            if let Some((name, table)) = named_on(rest) {
                if let Some(t) = state.tables.get_mut(&table) {
                    t.objects.indexes.insert(name);
                }
            }
        }
        if let Some(idx) = statement.find("CREATE TRIGGER ") {
            if let Some((name, table)) = named_on(&statement[idx + "CREATE TRIGGER ".len()..]) {
                if let Some(t) = state.tables.get_mut(&table) {
                    t.objects.triggers.insert(name);
                }
            }
        }
    }
}

#[async_trait]
impl RelationalTarget for MemoryTarget {
    async fn execute_ddl(&self, statement: &str) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if let Some(pos) = state
            .statement_failures
            .iter()
            .position(|(fragment, _)| statement.contains(fragment.as_str()))
        {
            return Err(state.statement_failures.remove(pos).1);
        }

        if statement.trim_start().starts_with("CREATE TABLE") {
            self.apply_create_table(&mut state, statement)?;
        } else {
            self.check_target_relation(&state, statement)?;
            self.record_objects(&mut state, statement);
        }
        state.statements.push(statement.to_string());
        Ok(())
    }

    async fn bulk_insert(&self, table: &str, rows: &[TransformedRecord]) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        state.bulk_insert_calls += 1;
        let call = state.bulk_insert_calls;
        if let Some(err) = state.insert_failures.remove(&call) {
            return Err(err);
        }

        let Some(target) = state.tables.get_mut(table) else {
            return Err(self.missing_relation(table));
        };

        for row in rows {
            if let Some(column) = row.columns.keys().find(|c| !target.columns.contains(*c)) {
                return Err(StoreError::permanent(format!(
                    "column \"{}\" of relation \"{}\" does not exist",
                    column, table
                )));
            }
        }
        target.check_not_null(table, rows)?;

        for key in &target.unique_keys {
            let mut seen: HashSet<String> = target.rows.iter().filter_map(|r| key_of(r, key)).collect();
            for row in rows {
                if let Some(value) = key_of(row, key) {
                    if !seen.insert(value.clone()) {
                        return Err(StoreError::permanent(format!(
                            "duplicate key value violates unique constraint \"{}_{}_key\": ({})=({})",
                            table,
                            key.join("_"),
                            key.join(", "),
                            value
                        )));
                    }
                }
            }
        }

        target.rows.extend_from_slice(rows);
        Ok(rows.len() as u64)
    }

    async fn enable_row_policy(&self, table: &str, policy: &RowPolicy) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if !state.tables.contains_key(table) {
            return Err(self.missing_relation(table));
        }
        state
            .policies
            .retain(|(t, name)| !(t == table && name == policy.name));
        state
            .policies
            .push((table.to_string(), policy.name.to_string()));
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> StoreResult<bool> {
        Ok(self.state.lock().await.tables.contains_key(table))
    }

    async fn table_objects(&self, table: &str) -> StoreResult<TableObjects> {
        let state = self.state.lock().await;
        match state.tables.get(table) {
            Some(t) => Ok(t.objects.clone()),
            None => Err(self.missing_relation(table)),
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        match &self.state.lock().await.unreachable {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

/// Unique-key value of a row; `None` when any key column is NULL or absent,
/// since NULLs never collide.
fn key_of(row: &TransformedRecord, key: &[String]) -> Option<String> {
    let mut parts = Vec::with_capacity(key.len());
    for column in key {
        match row.get(column) {
            Some(value) if !value.is_null() => parts.push(value.to_json().to_string()),
            _ => return None,
        }
    }
    Some(parts.join(", "))
}

/// Parse one double-quoted identifier at the start of `s`.
fn parse_quoted(s: &str) -> Option<(String, &str)> {
    let rest = s.strip_prefix('"')?;
    let mut ident = String::new();
    let mut chars = rest.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '"' {
            if let Some((_, '"')) = chars.peek() {
                ident.push('"');
                chars.next();
                continue;
            }
            return Some((ident, &rest[i + 1..]));
        }
        ident.push(c);
    }
    None
}

/// Parse `"schema"."table"` at the start of `s`.
fn parse_qualified(s: &str) -> Option<(String, String, &str)> {
    let (schema, rest) = parse_quoted(s)?;
    let rest = rest.strip_prefix('.')?;
    let (table, rest) = parse_quoted(rest)?;
    Some((schema, table, rest))
}

/// `"name" ON "schema"."table"` at the start of `s`, as `(name, table)`.
fn named_on(s: &str) -> Option<(String, String)> {
    let (name, rest) = parse_quoted(s)?;
    let idx = rest.find(" ON ")?;
    let (_, table, _) = parse_qualified(&rest[idx + " ON ".len()..])?;
    Some((name, table))
}

fn references(body: &str) -> Vec<(String, String)> {
    body.match_indices("REFERENCES ")
        .filter_map(|(idx, marker)| parse_qualified(&body[idx + marker.len()..]))
        .map(|(schema, table, _)| (schema, table))
        .collect()
}

/// Identifiers of a `"a", "b")` list.
fn quoted_list(mut s: &str) -> Vec<String> {
    let mut out = Vec::new();
    while let Some((ident, rest)) = parse_quoted(s.trim_start()) {
        out.push(ident);
        s = rest.trim_start().strip_prefix(',').unwrap_or(rest);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ColumnValue;
    use crate::schema::{ddl, Column, ColumnType, IndexDef, OnDelete, PolicyCommand, TableDef};

    static PARENT: TableDef = TableDef {
        name: "parent",
        phase: 1,
        columns: &[Column::required("code", ColumnType::Text).unique()],
        unique: &[],
        row_security: true,
    };

    static CHILD: TableDef = TableDef {
        name: "child",
        phase: 2,
        columns: &[
            Column::fk("parent_id", "parent", OnDelete::Cascade),
            Column::new("slot", ColumnType::Integer),
        ],
        unique: &[&["parent_id", "slot"]],
        row_security: false,
    };

    fn row(id: &str, column: &str, value: &str) -> TransformedRecord {
        let mut record = TransformedRecord::new(id);
        record.set(column, ColumnValue::Text(value.into()));
        record
    }

    #[test]
    fn test_parse_qualified_handles_escaped_quotes() {
        let (schema, table, rest) = parse_qualified("\"public\".\"we\"\"ird\" (").unwrap();
        assert_eq!(schema, "public");
        assert_eq!(table, "we\"ird");
        assert_eq!(rest, " (");
        assert_eq!(quoted_list("\"a\", \"b\")"), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_create_table_requires_referenced_relation() {
        let target = MemoryTarget::new("public");
        let err = target
            .execute_ddl(&ddl::create_table(&CHILD, "public").unwrap())
            .await
            .unwrap_err();
        assert!(err.message.contains("relation \"public.parent\" does not exist"));
        assert!(!err.is_transient());

        target
            .execute_ddl(&ddl::create_table(&PARENT, "public").unwrap())
            .await
            .unwrap();
        target
            .execute_ddl(&ddl::create_table(&CHILD, "public").unwrap())
            .await
            .unwrap();
        assert_eq!(target.table_names().await, vec!["child", "parent"]);
    }

    #[tokio::test]
    async fn test_unique_violation_rejects_whole_batch() {
        let target = MemoryTarget::new("public");
        target
            .execute_ddl(&ddl::create_table(&PARENT, "public").unwrap())
            .await
            .unwrap();

        let batch = vec![row("1", "code", "A"), row("2", "code", "B"), row("3", "code", "A")];
        let err = target.bulk_insert("parent", &batch).await.unwrap_err();
        assert!(err.message.starts_with("duplicate key value"));
        assert_eq!(target.row_count("parent").await, 0);

        assert_eq!(target.bulk_insert("parent", &batch[..2]).await.unwrap(), 2);
        assert!(target.bulk_insert("parent", &batch[2..]).await.is_err());
        assert_eq!(target.row_count("parent").await, 2);
    }

    #[tokio::test]
    async fn test_unknown_column_rejected() {
        let target = MemoryTarget::new("public").with_table("t", &["id", "name"], &[]);
        let err = target
            .bulk_insert("t", &[row("1", "nickname", "x")])
            .await
            .unwrap_err();
        assert!(err.message.contains("column \"nickname\""));
    }

    #[tokio::test]
    async fn test_scripted_insert_failure() {
        let target = MemoryTarget::new("public")
            .with_table("t", &["name"], &[])
            .fail_bulk_insert(2, StoreError::transient("connection reset"));
        assert!(target.bulk_insert("t", &[row("1", "name", "a")]).await.is_ok());
        assert!(target
            .bulk_insert("t", &[row("2", "name", "b")])
            .await
            .unwrap_err()
            .is_transient());
        assert!(target.bulk_insert("t", &[row("2", "name", "b")]).await.is_ok());
        assert_eq!(target.bulk_insert_calls().await, 3);
    }

    #[tokio::test]
    async fn test_index_and_policy_need_existing_table() {
        let target = MemoryTarget::new("public");
        assert!(target
            .execute_ddl(&ddl::enable_row_security("parent", "public").unwrap())
            .await
            .is_err());

        target
            .execute_ddl(&ddl::create_table(&PARENT, "public").unwrap())
            .await
            .unwrap();
        target
            .execute_ddl(&ddl::enable_row_security("parent", "public").unwrap())
            .await
            .unwrap();

        let policy = RowPolicy {
            name: "Owners",
            command: PolicyCommand::Select,
            using: Some("true"),
            with_check: None,
        };
        target.enable_row_policy("parent", &policy).await.unwrap();
        target.enable_row_policy("parent", &policy).await.unwrap();
        assert_eq!(target.policies().await.len(), 1);
        assert!(target.enable_row_policy("child", &policy).await.is_err());
    }

    #[tokio::test]
    async fn test_not_null_column_rejects_batch() {
        let target = MemoryTarget::new("public");
        target
            .execute_ddl(&ddl::create_table(&PARENT, "public").unwrap())
            .await
            .unwrap();

        // listed for one row, missing from the other
        let mut missing = TransformedRecord::new("2");
        missing.set("is_deleted", ColumnValue::Bool(false));
        let batch = vec![row("1", "code", "A"), missing];
        let err = target.bulk_insert("parent", &batch).await.unwrap_err();
        assert_eq!(
            err.message,
            "null value in column \"code\" of relation \"parent\" violates not-null constraint"
        );

        let mut explicit_null = TransformedRecord::new("3");
        explicit_null.set("code", ColumnValue::Null);
        assert!(target.bulk_insert("parent", &[explicit_null]).await.is_err());

        // never listed and no default
        let unlisted = target.bulk_insert("parent", &batch[1..]).await.unwrap_err();
        assert!(unlisted.message.contains("\"code\""));
        assert_eq!(target.row_count("parent").await, 0);

        // id is NOT NULL too, but its default covers rows that omit it
        assert_eq!(target.bulk_insert("parent", &batch[..1]).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_table_objects_track_keys_indexes_and_triggers() {
        let target = MemoryTarget::new("public");
        for table in [&PARENT, &CHILD] {
            target
                .execute_ddl(&ddl::create_table(table, "public").unwrap())
                .await
                .unwrap();
        }
        let index = IndexDef {
            name: "idx_child_slot",
            table: "child",
            columns: &["slot"],
        };
        target
            .execute_ddl(&ddl::create_index(&index, "public").unwrap())
            .await
            .unwrap();
        target
            .execute_ddl(&ddl::updated_at_trigger(&CHILD, "public").unwrap())
            .await
            .unwrap();

        let child = target.table_objects("child").await.unwrap();
        assert!(child
            .foreign_keys
            .contains(&("parent_id".to_string(), "parent".to_string())));
        assert!(child.indexes.contains("idx_child_slot"));
        assert!(child.triggers.contains("update_child_updated_at"));

        let parent = target.table_objects("parent").await.unwrap();
        assert_eq!(parent, TableObjects::default());
        assert!(target.table_objects("missing").await.is_err());
    }

    #[tokio::test]
    async fn test_scripted_statement_failure_fires_once() {
        let target = MemoryTarget::new("public")
            .fail_ddl_matching("\"parent\"", StoreError::permanent("permission denied"));
        let sql = ddl::create_table(&PARENT, "public").unwrap();
        assert_eq!(
            target.execute_ddl(&sql).await.unwrap_err().message,
            "permission denied"
        );
        assert!(target.execute_ddl(&sql).await.is_ok());
        assert_eq!(target.statements().await.len(), 1);
    }

    #[tokio::test]
    async fn test_ping() {
        assert!(MemoryTarget::default().ping().await.is_ok());
        let down = MemoryTarget::default().unreachable(StoreError::transient("connection refused"));
        assert!(down.ping().await.unwrap_err().is_transient());
    }
}
