use std::path::Path;

use metricvault_core::VaultConfig;

pub fn run(config_path: &Path, store_path: &str, force: bool) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists (pass --force to overwrite)",
            config_path.display()
        );
    }

    let config = VaultConfig::scaffold(store_path);
    std::fs::write(config_path, config.to_toml_string()?)?;
    println!("✓ Generated {}", config_path.display());
    Ok(())
}
