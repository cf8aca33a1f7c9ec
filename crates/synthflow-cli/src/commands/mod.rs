pub mod build;
pub mod descriptor;
pub mod stages;
pub mod validate;

use anyhow::{Context, Result};
use std::path::Path;
use synthflow_build::TargetContext;
use synthflow_config::{Config, ConfigLoader};

/// Load synthflow.toml from an explicit path or by searching upwards
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let loader = ConfigLoader::new();
    match path {
        Some(path) => loader
            .load_from_file(path)
            .with_context(|| format!("Failed to load {}", path.display())),
        None => {
            let cwd = std::env::current_dir().context("Failed to read current directory")?;
            loader
                .load_from_directory(&cwd)
                .context("Failed to load project configuration")
        }
    }
}

/// Context for a single named target
pub fn target_context(target: &str, config_path: Option<&Path>) -> Result<TargetContext> {
    let config = load_config(config_path)?;
    TargetContext::from_config(&config, target)
        .with_context(|| format!("Failed to prepare target '{}'", target))
}
