//! Error types for the migration library.

use thiserror::Error;

/// How a collaborator failure should be treated by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// Connection drop, timeout, pool exhaustion, serialization conflict.
    Transient,
    /// Constraint violation, missing relation, bad credentials.
    Permanent,
}

/// Error returned by a document-store or relational-store collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: StoreErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: StoreErrorKind::Permanent,
            message: message.into(),
        }
    }

    /// Only transient failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        self.kind == StoreErrorKind::Transient
    }
}

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source collection has no destination table
    #[error("Collection '{collection}' is not mapped to a destination table")]
    Mapping { collection: String },

    /// Reading a collection from the document store failed
    #[error("Extraction failed for collection {collection}: {message}")]
    Extraction { collection: String, message: String },

    /// A single record could not be coerced into the destination columns
    #[error("Record {source_id} in {collection} dropped: {reason}")]
    TransformDrop {
        collection: String,
        source_id: String,
        reason: String,
    },

    /// The destination rejected a whole batch
    #[error("Batch {batch} rejected by table {table}: {message}")]
    BatchInsert {
        table: String,
        batch: usize,
        message: String,
    },

    /// A schema statement failed
    #[error("DDL failed for table {table}: {message}")]
    Ddl { table: String, message: String },

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Collaborator error outside of extraction/loading
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Run finished but at least one collection failed or inserted nothing
    #[error("Migration incomplete: {0}")]
    Incomplete(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

/// Process exit codes used by the CLI.
pub const EXIT_CONFIG_ERROR: u8 = 1;
pub const EXIT_PROVISION_ERROR: u8 = 2;
pub const EXIT_MIGRATION_INCOMPLETE: u8 = 3;
pub const EXIT_CONNECTION_ERROR: u8 = 4;
pub const EXIT_EXTRACTION_ERROR: u8 = 5;
pub const EXIT_CANCELLED: u8 = 6;
pub const EXIT_IO_ERROR: u8 = 7;

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a DDL error
    pub fn ddl(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Ddl {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create an Extraction error
    pub fn extraction(collection: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Extraction {
            collection: collection.into(),
            message: message.into(),
        }
    }

    /// Exit code the CLI reports for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_)
            | MigrateError::Mapping { .. }
            | MigrateError::Yaml(_)
            | MigrateError::Json(_) => EXIT_CONFIG_ERROR,
            MigrateError::Ddl { .. } => EXIT_PROVISION_ERROR,
            MigrateError::Incomplete(_)
            | MigrateError::TransformDrop { .. }
            | MigrateError::BatchInsert { .. } => EXIT_MIGRATION_INCOMPLETE,
            MigrateError::Pool { .. } | MigrateError::Store(_) => EXIT_CONNECTION_ERROR,
            MigrateError::Extraction { .. } => EXIT_EXTRACTION_ERROR,
            MigrateError::Cancelled => EXIT_CANCELLED,
            MigrateError::Io(_) => EXIT_IO_ERROR,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_kinds() {
        assert!(StoreError::transient("connection reset").is_transient());
        assert!(!StoreError::permanent("duplicate key").is_transient());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Config("bad".into()).exit_code(), 1);
        assert_eq!(MigrateError::ddl("users", "boom").exit_code(), 2);
        assert_eq!(MigrateError::Incomplete("x".into()).exit_code(), 3);
        assert_eq!(MigrateError::extraction("users", "auth").exit_code(), 5);
        assert_eq!(MigrateError::Cancelled.exit_code(), 6);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(MigrateError::from(io).exit_code(), 7);
    }

    #[test]
    fn test_format_detailed_includes_cause() {
        let err = MigrateError::from(StoreError::transient("connection reset"));
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: Store error: connection reset"));
        assert!(detailed.contains("Caused by:"));
    }
}
