//! Declarative destination schema.
//!
//! Tables are plain values ([`TableDef`]) grouped into dependency phases and
//! rendered to SQL by [`ddl`]. The built-in application schema lives in
//! [`catalog`].

pub mod catalog;
pub mod ddl;

use std::collections::BTreeMap;

pub use catalog::Catalog;

/// PostgreSQL column types used by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Uuid,
    Text,
    VarChar(u32),
    Integer,
    BigInt,
    Decimal(u8, u8),
    Boolean,
    Timestamptz,
    Date,
    Jsonb,
    TextArray,
    Inet,
}

impl ColumnType {
    pub fn sql(&self) -> String {
        match self {
            ColumnType::Uuid => "UUID".into(),
            ColumnType::Text => "TEXT".into(),
            ColumnType::VarChar(n) => format!("VARCHAR({})", n),
            ColumnType::Integer => "INTEGER".into(),
            ColumnType::BigInt => "BIGINT".into(),
            ColumnType::Decimal(p, s) => format!("DECIMAL({},{})", p, s),
            ColumnType::Boolean => "BOOLEAN".into(),
            ColumnType::Timestamptz => "TIMESTAMPTZ".into(),
            ColumnType::Date => "DATE".into(),
            ColumnType::Jsonb => "JSONB".into(),
            ColumnType::TextArray => "TEXT[]".into(),
            ColumnType::Inet => "INET".into(),
        }
    }
}

/// Column default expression.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnDefault {
    Bool(bool),
    Int(i64),
    Decimal(f64),
    Text(&'static str),
    Now,
    RandomUuid,
}

/// Referential action when the referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    NoAction,
    Cascade,
    SetNull,
}

/// Foreign key to another table's `id` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKeyRef {
    pub table: &'static str,
    pub on_delete: OnDelete,
}

/// Column-level CHECK constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnCheck {
    /// Value must be one of the listed literals.
    OneOf(&'static [&'static str]),
    /// JSONB value must be an object.
    JsonObject,
}

/// Column definition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub primary_key: bool,
    pub not_null: bool,
    pub unique: bool,
    pub default: Option<ColumnDefault>,
    pub check: Option<ColumnCheck>,
    pub references: Option<ForeignKeyRef>,
}

impl Column {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            primary_key: false,
            not_null: false,
            unique: false,
            default: None,
            check: None,
            references: None,
        }
    }

    /// NOT NULL column.
    pub const fn required(name: &'static str, ty: ColumnType) -> Self {
        Self::new(name, ty).not_null()
    }

    /// Nullable UUID foreign key to `table(id)`.
    pub const fn fk(name: &'static str, table: &'static str, on_delete: OnDelete) -> Self {
        Self::new(name, ColumnType::Uuid).references(table, on_delete)
    }

    pub const fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub const fn default(mut self, value: ColumnDefault) -> Self {
        self.default = Some(value);
        self
    }

    pub const fn one_of(mut self, values: &'static [&'static str]) -> Self {
        self.check = Some(ColumnCheck::OneOf(values));
        self
    }

    pub const fn json_object(mut self) -> Self {
        self.check = Some(ColumnCheck::JsonObject);
        self
    }

    pub const fn references(mut self, table: &'static str, on_delete: OnDelete) -> Self {
        self.references = Some(ForeignKeyRef { table, on_delete });
        self
    }
}

/// Primary key shared by every table.
pub static ID_COLUMN: Column = Column::new("id", ColumnType::Uuid)
    .primary_key()
    .default(ColumnDefault::RandomUuid);

/// Soft-delete, versioning and timestamp columns shared by every table.
pub static BOOKKEEPING_COLUMNS: &[Column] = &[
    Column::new("is_deleted", ColumnType::Boolean).default(ColumnDefault::Bool(false)),
    Column::new("deleted_at", ColumnType::Timestamptz),
    Column::new("deleted_by", ColumnType::Uuid),
    Column::new("version", ColumnType::Integer).default(ColumnDefault::Int(1)),
    Column::new("created_at", ColumnType::Timestamptz).default(ColumnDefault::Now),
    Column::new("updated_at", ColumnType::Timestamptz).default(ColumnDefault::Now),
];

/// Declarative table definition.
#[derive(Debug)]
pub struct TableDef {
    pub name: &'static str,
    /// Dependency level; foreign keys may only target lower phases.
    pub phase: u32,
    /// Table-specific columns, rendered between `id` and the bookkeeping columns.
    pub columns: &'static [Column],
    /// Multi-column UNIQUE constraints.
    pub unique: &'static [&'static [&'static str]],
    /// Whether row-level security is enabled on the table.
    pub row_security: bool,
}

impl TableDef {
    /// Every rendered column, in DDL order.
    pub fn all_columns(&self) -> impl Iterator<Item = &Column> {
        std::iter::once(&ID_COLUMN)
            .chain(self.columns.iter())
            .chain(BOOKKEEPING_COLUMNS.iter())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.all_columns().find(|c| c.name == name)
    }

    /// Tables this one references, without duplicates or self-references.
    pub fn dependencies(&self) -> Vec<&'static str> {
        let mut deps: Vec<&'static str> = self
            .columns
            .iter()
            .filter_map(|c| c.references.map(|r| r.table))
            .filter(|t| *t != self.name)
            .collect();
        deps.sort_unstable();
        deps.dedup();
        deps
    }
}

/// Secondary index.
#[derive(Debug)]
pub struct IndexDef {
    pub name: &'static str,
    pub table: &'static str,
    pub columns: &'static [&'static str],
}

/// Statement kind a row policy applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyCommand {
    All,
    Select,
    Insert,
    Update,
    Delete,
}

impl PolicyCommand {
    pub fn sql(&self) -> &'static str {
        match self {
            PolicyCommand::All => "ALL",
            PolicyCommand::Select => "SELECT",
            PolicyCommand::Insert => "INSERT",
            PolicyCommand::Update => "UPDATE",
            PolicyCommand::Delete => "DELETE",
        }
    }
}

/// Row-level access policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowPolicy {
    pub name: &'static str,
    pub command: PolicyCommand,
    /// Predicate for rows visible to the statement.
    pub using: Option<&'static str>,
    /// Predicate new rows must satisfy.
    pub with_check: Option<&'static str>,
}

/// A policy bound to the table it protects.
#[derive(Debug)]
pub struct PolicyDef {
    pub table: &'static str,
    pub policy: RowPolicy,
}

/// Tables sharing one dependency level, in catalog order.
#[derive(Debug, Clone)]
pub struct Phase {
    pub number: u32,
    pub tables: Vec<&'static TableDef>,
}

impl Phase {
    pub fn table_names(&self) -> Vec<&'static str> {
        self.tables.iter().map(|t| t.name).collect()
    }
}

/// Group tables by phase, ascending.
pub fn group_phases(tables: &[&'static TableDef]) -> Vec<Phase> {
    let mut by_phase: BTreeMap<u32, Vec<&'static TableDef>> = BTreeMap::new();
    for table in tables {
        by_phase.entry(table.phase).or_default().push(table);
    }
    by_phase
        .into_iter()
        .map(|(number, tables)| Phase { number, tables })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    static PARENT: TableDef = TableDef {
        name: "parent",
        phase: 1,
        columns: &[Column::required("code", ColumnType::Text).unique()],
        unique: &[],
        row_security: false,
    };

    static CHILD: TableDef = TableDef {
        name: "child",
        phase: 2,
        columns: &[
            Column::fk("parent_id", "parent", OnDelete::Cascade),
            Column::fk("other_parent_id", "parent", OnDelete::SetNull),
            Column::fk("sibling_id", "child", OnDelete::NoAction),
        ],
        unique: &[],
        row_security: false,
    };

    #[test]
    fn test_all_columns_wraps_declared_columns() {
        let names: Vec<_> = PARENT.all_columns().map(|c| c.name).collect();
        assert_eq!(names.first(), Some(&"id"));
        assert_eq!(names[1], "code");
        assert_eq!(names.last(), Some(&"updated_at"));
        assert!(PARENT.column("is_deleted").is_some());
        assert!(PARENT.column("missing").is_none());
    }

    #[test]
    fn test_dependencies_deduplicated_without_self() {
        assert_eq!(CHILD.dependencies(), vec!["parent"]);
        assert!(PARENT.dependencies().is_empty());
    }

    #[test]
    fn test_group_phases_ascending() {
        let phases = group_phases(&[&CHILD, &PARENT]);
        assert_eq!(phases.len(), 2);
        assert_eq!(phases[0].number, 1);
        assert_eq!(phases[0].table_names(), vec!["parent"]);
        assert_eq!(phases[1].table_names(), vec!["child"]);
    }

    #[test]
    fn test_column_type_sql() {
        assert_eq!(ColumnType::Decimal(15, 2).sql(), "DECIMAL(15,2)");
        assert_eq!(ColumnType::VarChar(10).sql(), "VARCHAR(10)");
        assert_eq!(ColumnType::TextArray.sql(), "TEXT[]");
    }
}
