//! Identifier validation and quoting for generated PostgreSQL statements.
//!
//! Table, column, index and policy names cannot be bound as statement
//! parameters, so every name that reaches generated SQL goes through
//! [`quote_pg`]. Expressions embedded verbatim (check constraints, policy
//! predicates) go through [`validate_expression`].

use crate::error::{MigrateError, Result};

/// PostgreSQL truncates identifiers longer than 63 bytes.
const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Validate an identifier for security issues.
///
/// Rejects empty identifiers, identifiers containing null bytes and
/// identifiers PostgreSQL would silently truncate.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config(
            "Identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier.
///
/// Escapes double quotes by doubling them and wraps in double quotes.
///
/// ```ignore
/// assert_eq!(quote_pg("users")?, "\"users\"");
/// assert_eq!(quote_pg("table\"name")?, "\"table\"\"name\"");
/// ```
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Qualify a PostgreSQL table name with schema.
pub fn qualify_pg(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_pg(schema)?, quote_pg(table)?))
}

/// Quote a string literal for inline use in DDL (defaults, CHECK lists).
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Validate a boolean SQL expression that is embedded verbatim.
///
/// Rejects statement separators and comment markers, which never appear in
/// a well-formed single predicate.
pub fn validate_expression(definition: &str) -> Result<()> {
    if definition.trim().is_empty() {
        return Err(MigrateError::Config("Expression cannot be empty".into()));
    }

    if definition.contains(';') {
        return Err(MigrateError::Config(format!(
            "SECURITY: Expression contains semicolon (possible injection): {:?}",
            definition
        )));
    }

    if definition.contains("--") || definition.contains("/*") || definition.contains("*/") {
        return Err(MigrateError::Config(format!(
            "SECURITY: Expression contains SQL comment markers (possible injection): {:?}",
            definition
        )));
    }

    Ok(())
}
