pub mod init;
pub mod inspect;
pub mod maintain;

use std::path::Path;

use anyhow::Context;
use metricvault_core::VaultConfig;
use metricvault_store::{CoverageRules, RedbTableBackend, TableMetricsStore, open_store};

/// Load the config at `path` and open the store it describes.
pub fn open(path: &Path) -> anyhow::Result<(VaultConfig, TableMetricsStore<RedbTableBackend>)> {
    let config = VaultConfig::from_file(path)
        .with_context(|| format!("loading {} (run `mvault init` to create one)", path.display()))?;
    let store = open_store(&config.storage)?
        .with_coverage_rules(CoverageRules::from_config(&config.coverage()));
    Ok((config, store))
}
