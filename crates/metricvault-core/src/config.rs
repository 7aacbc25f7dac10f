//! metricvault.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default cap on items pulled from any single backend cursor.
pub const DEFAULT_MAX_RESULTS: usize = 10_000;
/// Default table holding metric rows and the metadata partition.
pub const DEFAULT_TABLE: &str = "SonarCloudMetrics";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    pub storage: StorageConfig,
    pub cache: Option<CacheConfig>,
    pub coverage: Option<CoverageConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub table: Option<String>,
    pub max_results: Option<usize>,
    pub legacy_metadata_cleanup: Option<bool>,
    pub backend: BackendConfig,
}

/// Which table backend to open at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum BackendConfig {
    Redb { path: String },
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    pub ttl_secs: Option<u64>,
    pub max_entries: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoverageConfig {
    pub max_age_days: Option<i64>,
    pub days_per_record: Option<u32>,
}

impl StorageConfig {
    pub fn in_memory() -> Self {
        Self {
            backend: BackendConfig::Memory,
            table: None,
            max_results: None,
            legacy_metadata_cleanup: None,
        }
    }

    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or(DEFAULT_TABLE)
    }

    pub fn max_results(&self) -> usize {
        self.max_results.unwrap_or(DEFAULT_MAX_RESULTS)
    }

    pub fn legacy_metadata_cleanup(&self) -> bool {
        self.legacy_metadata_cleanup.unwrap_or(true)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs.unwrap_or(300))
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries.unwrap_or(256)
    }
}

impl CoverageConfig {
    pub fn max_age_days(&self) -> i64 {
        self.max_age_days.unwrap_or(2)
    }

    pub fn days_per_record(&self) -> u32 {
        self.days_per_record.unwrap_or(10)
    }
}

impl VaultConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: VaultConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.max_results == Some(0) {
            return Err(ConfigError::Invalid(
                "storage.max_results must be greater than zero".to_string(),
            ));
        }
        if let BackendConfig::Redb { path } = &self.storage.backend {
            if path.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "storage.backend.path must not be empty".to_string(),
                ));
            }
        }
        if self.coverage.as_ref().and_then(|c| c.days_per_record) == Some(0) {
            return Err(ConfigError::Invalid(
                "coverage.days_per_record must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Scaffold a config that stores metrics in a redb file at `path`.
    pub fn scaffold(path: &str) -> Self {
        VaultConfig {
            storage: StorageConfig {
                backend: BackendConfig::Redb {
                    path: path.to_string(),
                },
                table: Some(DEFAULT_TABLE.to_string()),
                max_results: Some(DEFAULT_MAX_RESULTS),
                legacy_metadata_cleanup: Some(true),
            },
            cache: Some(CacheConfig {
                ttl_secs: Some(300),
                max_entries: Some(256),
            }),
            coverage: Some(CoverageConfig {
                max_age_days: Some(2),
                days_per_record: Some(10),
            }),
        }
    }

    pub fn cache(&self) -> CacheConfig {
        self.cache.clone().unwrap_or_default()
    }

    pub fn coverage(&self) -> CoverageConfig {
        self.coverage.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaffold() {
        let config = VaultConfig::scaffold("/tmp/metrics.redb");
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("redb"));
        assert!(toml_str.contains("/tmp/metrics.redb"));

        let parsed = VaultConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(parsed.storage.backend, config.storage.backend);
    }

    #[test]
    fn test_parse_minimal() {
        let toml_str = r#"
[storage.backend]
provider = "memory"
"#;
        let config = VaultConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.storage.backend, BackendConfig::Memory);
        assert_eq!(config.storage.table_name(), DEFAULT_TABLE);
        assert_eq!(config.storage.max_results(), DEFAULT_MAX_RESULTS);
        assert!(config.storage.legacy_metadata_cleanup());
        assert_eq!(config.cache().ttl(), Duration::from_secs(300));
        assert_eq!(config.coverage().max_age_days(), 2);
        assert_eq!(config.coverage().days_per_record(), 10);
    }

    #[test]
    fn test_unsupported_provider_rejected() {
        let toml_str = r#"
[storage.backend]
provider = "postgres"
url = "postgres://localhost/metrics"
"#;
        assert!(matches!(
            VaultConfig::from_toml_str(toml_str),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_zero_max_results_rejected() {
        let toml_str = r#"
[storage]
max_results = 0

[storage.backend]
provider = "memory"
"#;
        assert!(matches!(
            VaultConfig::from_toml_str(toml_str),
            Err(ConfigError::Invalid(_))
        ));
    }
}
