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

    /// Compute a SHA256 hash of the configuration, reported with each run.
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

    const YAML: &str = r#"
source:
  type: mysql
  host: src.local
  database: shop
  user: sync
  password: secret
destination:
  type: postgres
  host: dst.local
  database: shop
  user: sync
  schema: mirror
sync:
  tables: [orders, customers]
  window_size: 250
"#;

    #[test]
    fn test_from_yaml() {
        let config = Config::from_yaml(YAML).unwrap();
        assert_eq!(config.source.effective_port(), 3306);
        assert_eq!(config.destination.effective_schema(), "mirror");
        assert_eq!(config.sync.tables, vec!["orders", "customers"]);
        assert_eq!(config.sync.window_size, 250);
        assert!(config.sync.continue_on_error);
    }

    #[test]
    fn test_from_yaml_rejects_invalid() {
        let yaml = YAML.replace("window_size: 250", "window_size: 0");
        assert!(Config::from_yaml(&yaml).is_err());
        assert!(Config::from_yaml("source: [").is_err());
    }

    #[test]
    fn test_hash_is_stable_and_sensitive() {
        let a = Config::from_yaml(YAML).unwrap();
        let b = Config::from_yaml(YAML).unwrap();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 64);

        let c = Config::from_yaml(&YAML.replace("250", "251")).unwrap();
        assert_ne!(a.hash(), c.hash());
    }
}
