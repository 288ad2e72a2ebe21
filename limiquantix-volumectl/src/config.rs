//! Configuration loading for the volume CLI.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use limiquantix_volume::DriverConfig;

use crate::cli::Args;

/// Config file used when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/limiquantix/volumes.yaml";

/// Load driver configuration from a YAML file.
pub fn load<P: AsRef<Path>>(path: P) -> Result<DriverConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: DriverConfig = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Resolve the effective configuration.
///
/// An explicit `--config` must exist; a missing default file falls back
/// to built-in defaults. CLI flags override the file either way.
pub fn resolve(args: &Args) -> Result<DriverConfig> {
    let config = match &args.config {
        Some(path) => {
            let config = load(path)?;
            info!(config_path = %path, "Configuration loaded");
            config
        }
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            let config = load(DEFAULT_CONFIG_PATH)?;
            info!(config_path = %DEFAULT_CONFIG_PATH, "Configuration loaded from default location");
            config
        }
        None => {
            info!("No config file found, using CLI arguments and defaults");
            DriverConfig::default()
        }
    };

    Ok(with_cli_overrides(config, args))
}

/// Apply CLI argument overrides to the configuration.
pub fn with_cli_overrides(mut config: DriverConfig, args: &Args) -> DriverConfig {
    if let Some(backend) = args.backend {
        config.backend = backend.into();
    }

    if let Some(ref pool) = args.default_pool {
        config.rbd.default_pool = pool.clone();
    }

    if let Some(ref instance_id) = args.instance_id {
        config.instance_id = Some(instance_id.clone());
    }

    config
}
