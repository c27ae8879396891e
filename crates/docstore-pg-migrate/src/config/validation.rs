//! Configuration validation.

use super::Config;
use crate::core::identifier::validate_identifier;
use crate::error::{MigrateError, Result};
use crate::mapping::BUILTIN_MAPPINGS;
use crate::target::tls::SslMode;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.r#type != "json_export" {
        return Err(MigrateError::Config(format!(
            "source.type must be 'json_export', got '{}'",
            config.source.r#type
        )));
    }
    if config.source.path.as_os_str().is_empty() {
        return Err(MigrateError::Config("source.path is required".into()));
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(MigrateError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(MigrateError::Config("target.user is required".into()));
    }
    if config.target.r#type != "postgres" {
        return Err(MigrateError::Config(format!(
            "target.type must be 'postgres', got '{}'",
            config.target.r#type
        )));
    }
    validate_identifier(&config.target.schema)?;
    SslMode::parse(&config.target.ssl_mode)?;
    if let Some(0) = config.target.max_connections {
        return Err(MigrateError::Config(
            "target.max_connections must be at least 1".into(),
        ));
    }

    // Migration config validation - only check if explicitly set
    if let Some(0) = config.migration.batch_size {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    for (collection, table) in &config.migration.extra_mappings {
        if BUILTIN_MAPPINGS.iter().any(|(c, _)| *c == collection.as_str()) {
            return Err(MigrateError::Config(format!(
                "migration.extra_mappings cannot redefine built-in collection '{}'",
                collection
            )));
        }
        validate_identifier(table)?;
    }

    for key in config.transform.boolean_defaults.keys() {
        match key.split_once('.') {
            Some((table, column)) if !table.is_empty() && !column.is_empty() => {}
            _ => {
                return Err(MigrateError::Config(format!(
                    "transform.boolean_defaults key '{}' must be 'table.column'",
                    key
                )))
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MigrationConfig, SourceConfig, TargetConfig, TransformConfig};
    use std::path::PathBuf;

    fn valid_config() -> Config {
        Config {
            source: SourceConfig {
                r#type: "json_export".to_string(),
                path: PathBuf::from("./export"),
            },
            target: TargetConfig {
                r#type: "postgres".to_string(),
                host: "localhost".to_string(),
                port: 5432,
                database: "target_db".to_string(),
                user: "postgres".to_string(),
                password: "password".to_string(),
                schema: "public".to_string(),
                ssl_mode: "disable".to_string(),
                max_connections: None,
            },
            migration: MigrationConfig::default(),
            transform: TransformConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_target_host() {
        let mut config = valid_config();
        config.target.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_wrong_source_type() {
        let mut config = valid_config();
        config.source.r#type = "firestore".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_wrong_target_type() {
        let mut config = valid_config();
        config.target.r#type = "mysql".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_ssl_mode() {
        let mut config = valid_config();
        config.target.ssl_mode = "sometimes".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = valid_config();
        config.migration.batch_size = Some(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_extra_mapping_cannot_shadow_builtin() {
        let mut config = valid_config();
        config
            .migration
            .extra_mappings
            .insert("users".into(), "people".into());
        assert!(validate(&config).is_err());

        let mut config = valid_config();
        config
            .migration
            .extra_mappings
            .insert("audit-trail".into(), "audit_logs".into());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_boolean_default_key_shape() {
        let mut config = valid_config();
        config
            .transform
            .boolean_defaults
            .insert("alert_otp".into(), false);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_target_config_debug_redacts_password() {
        let mut config = valid_config();
        config.target.password = "super_secret_password_456".to_string();
        let debug_output = format!("{:?}", config.target);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_456"),
            "Debug output should not contain actual password value"
        );
    }
}
