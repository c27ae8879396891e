//! # docstore-pg-migrate
//!
//! Document store to PostgreSQL migration library.
//!
//! Moves an application's collections out of a schemaless document store
//! into a normalized PostgreSQL schema that it provisions first:
//!
//! - **Phased provisioning** of tables in foreign-key order, then triggers,
//!   indexes and row-level security policies
//! - **Per-collection rules** that rename fields and coerce values, with a
//!   verbatim fallback for collections without one
//! - **Batched loading** where a rejected batch is counted, not fatal
//! - **Run reports** written as JSON for auditing
//! - **Health checks** that reach both stores without changing either
//!
//! ## Example
//!
//! ```rust,no_run
//! use docstore_pg_migrate::{Config, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> docstore_pg_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::from_config(&config, false, CancellationToken::new()).await?;
//!     let summary = orchestrator.run_all().await;
//!     println!("Inserted {} rows", summary.totals.inserted);
//!     summary.outcome()
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod extract;
pub mod health;
pub mod load;
pub mod mapping;
pub mod orchestrator;
pub mod provision;
pub mod report;
pub mod retry;
pub mod schema;
pub mod source;
pub mod target;
pub mod transform;

// Re-exports for convenient access
pub use crate::core::{ColumnValue, DocumentSource, RawRecord, RelationalTarget, TransformedRecord};
pub use config::{Config, MigrationConfig, SourceConfig, TargetConfig, TransformConfig};
pub use error::{MigrateError, Result, StoreError, StoreErrorKind};
pub use extract::Extractor;
pub use health::HealthCheckResult;
pub use load::{BatchResult, LoadProgress, Loader};
pub use mapping::{CollectionMapper, CollectionMapping};
pub use orchestrator::{CollectionStatus, MigrationResult, Orchestrator, RunOptions};
pub use provision::{ExtrasResult, PhaseResult, Provisioner, SchemaReport, TableGaps};
pub use report::{RunSummary, RunTotals};
pub use retry::RetryPolicy;
pub use schema::Catalog;
pub use source::{JsonExportSource, MemorySource};
pub use target::{MemoryTarget, PostgresTarget};
pub use transform::{TransformOutput, Transformer};
