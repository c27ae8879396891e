//! Collaborator traits for the two stores the migration talks to.
//!
//! - [`DocumentSource`]: lists and reads collections from the document store
//! - [`RelationalTarget`]: executes schema statements and inserts rows
//!
//! Both return [`StoreError`] so callers can tell transient failures (worth
//! retrying) from permanent rejections.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::schema::RowPolicy;

use super::value::{RawRecord, TransformedRecord};

/// Result type for collaborator calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Schema objects attached to one table, as the target reports them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableObjects {
    /// `(column, referenced table)` for every foreign key.
    pub foreign_keys: BTreeSet<(String, String)>,
    pub indexes: BTreeSet<String>,
    /// User-defined triggers only.
    pub triggers: BTreeSet<String>,
}

/// Read documents from a schemaless store.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Names of every collection the store holds.
    async fn list_collections(&self) -> StoreResult<Vec<String>>;

    /// Every document of one collection, fully materialized.
    ///
    /// A collection with zero documents returns an empty list.
    async fn read_all(&self, collection: &str) -> StoreResult<Vec<RawRecord>>;
}

/// Write schema and rows to the relational store.
#[async_trait]
pub trait RelationalTarget: Send + Sync {
    /// Execute one schema statement.
    async fn execute_ddl(&self, statement: &str) -> StoreResult<()>;

    /// Insert rows into `table` as a single call.
    ///
    /// Either every row is inserted or none is; returns the inserted count.
    async fn bulk_insert(&self, table: &str, rows: &[TransformedRecord]) -> StoreResult<u64>;

    /// Install a row-level access policy on `table`, replacing any policy of
    /// the same name.
    async fn enable_row_policy(&self, table: &str, policy: &RowPolicy) -> StoreResult<()>;

    /// Check whether `table` exists in the target schema.
    async fn table_exists(&self, table: &str) -> StoreResult<bool>;

    /// Foreign keys, indexes and triggers currently defined on `table`.
    async fn table_objects(&self, table: &str) -> StoreResult<TableObjects>;

    /// Round trip to the store without touching any table.
    async fn ping(&self) -> StoreResult<()>;
}
