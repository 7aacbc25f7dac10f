pub mod config;
pub mod types;

pub use config::{
    BackendConfig, CacheConfig, ConfigError, CoverageConfig, StorageConfig, VaultConfig,
};
pub use types::*;
