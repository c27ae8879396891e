//! Core abstractions shared by every stage of the migration.
//!
//! - [`value`]: raw documents, destination rows and column values
//! - [`traits`]: document-store and relational-store collaborator traits
//! - [`identifier`]: PostgreSQL identifier quoting

pub mod identifier;
pub mod traits;
pub mod value;

pub use traits::{DocumentSource, RelationalTarget, StoreResult, TableObjects};
pub use value::{ColumnValue, RawRecord, TransformedRecord};
