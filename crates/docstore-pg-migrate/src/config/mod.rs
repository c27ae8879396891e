//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Compute a SHA256 hash of the configuration, stamped on run reports.
    pub fn hash(&self) -> String {
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
source:
  path: ./export
target:
  host: localhost
  database: app
  user: postgres
  password: secret
"#;

    #[test]
    fn test_from_yaml_applies_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.source.r#type, "json_export");
        assert_eq!(config.target.port, 5432);
        assert_eq!(config.target.schema, "public");
        assert_eq!(config.target.ssl_mode, "require");
        assert_eq!(config.migration.get_batch_size(), 1_000);
        assert_eq!(config.migration.get_batch_delay().as_millis(), 1_000);
        assert_eq!(config.migration.get_max_retries(), 3);
        assert!(config.transform.boolean_defaults.is_empty());
    }

    #[test]
    fn test_from_yaml_reads_overrides() {
        let yaml = format!(
            "{}migration:\n  batch_size: 50\n  batch_delay_ms: 0\n  collections: [users]\n  extra_mappings:\n    audit-trail: audit_logs\ntransform:\n  boolean_defaults:\n    user_preferences.alert_otp: false\n",
            MINIMAL
        );
        let config = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.migration.get_batch_size(), 50);
        assert_eq!(config.migration.get_batch_delay().as_millis(), 0);
        assert_eq!(config.migration.collections, vec!["users".to_string()]);
        assert_eq!(
            config.migration.extra_mappings.get("audit-trail").map(String::as_str),
            Some("audit_logs")
        );
        assert_eq!(
            config.transform.boolean_defaults.get("user_preferences.alert_otp"),
            Some(&false)
        );
    }

    #[test]
    fn test_hash_is_stable() {
        let a = Config::from_yaml(MINIMAL).unwrap();
        let b = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 64);
    }
}
