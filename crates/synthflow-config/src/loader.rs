//! Configuration Loader
//!
//! Finds and loads `synthflow.toml`, then applies environment overrides:
//! 1. Project config (./synthflow.toml) - lowest priority
//! 2. Environment variables (SYNTHFLOW_*) - overrides project
//! 3. CLI flags - highest priority (handled by caller)

use crate::project::ProjectConfig;
use crate::{ConfigError, ConfigResult};
use std::env;
use std::path::{Path, PathBuf};

/// File name searched for by the loader
pub const CONFIG_FILE_NAME: &str = "synthflow.toml";

/// Configuration loader
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Skip SYNTHFLOW_* environment overrides
    ignore_env: bool,
}

/// Loaded configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Project root directory (where synthflow.toml was found)
    pub project_root: PathBuf,
}

impl Config {
    /// Path of the loaded configuration file
    pub fn config_path(&self) -> PathBuf {
        self.project_root.join(CONFIG_FILE_NAME)
    }
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { ignore_env: false }
    }

    /// Disable environment overrides
    pub fn without_env(mut self) -> Self {
        self.ignore_env = true;
        self
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to the first directory containing
    /// synthflow.toml.
    pub fn load_from_directory(&self, start_dir: &Path) -> ConfigResult<Config> {
        let config_path = find_config_file(start_dir)
            .ok_or_else(|| ConfigError::NotFound(start_dir.join(CONFIG_FILE_NAME)))?;
        self.load_from_file(&config_path)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(&self, config_path: &Path) -> ConfigResult<Config> {
        let project = ProjectConfig::load_from_file(config_path)?;
        let project = if self.ignore_env {
            project
        } else {
            self.apply_env_overrides(project)?
        };

        let project_root = match config_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        Ok(Config {
            project,
            project_root,
        })
    }

    /// Apply environment variable overrides to every target
    ///
    /// - SYNTHFLOW_FLASH_TOOL replaces `flash-tool`
    /// - SYNTHFLOW_SEED replaces `seed`
    fn apply_env_overrides(&self, mut config: ProjectConfig) -> ConfigResult<ProjectConfig> {
        if let Ok(tool) = env::var("SYNTHFLOW_FLASH_TOOL") {
            if tool.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "SYNTHFLOW_FLASH_TOOL".to_string(),
                    reason: "flash tool cannot be empty".to_string(),
                });
            }
            for target in &mut config.targets {
                target.flash_tool = Some(tool.clone());
            }
        }

        if let Ok(seed) = env::var("SYNTHFLOW_SEED") {
            let seed: u32 = seed.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "SYNTHFLOW_SEED".to_string(),
                reason: format!("'{}' is not an unsigned integer", seed),
            })?;
            for target in &mut config.targets {
                target.seed = Some(seed);
            }
        }

        Ok(config)
    }
}

/// Walk up from `start_dir` looking for synthflow.toml
pub fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();

    loop {
        let candidate = current.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Some(candidate);
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_find_config_file_in_parent() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(CONFIG_FILE_NAME),
            "[project]\nname = \"qa\"\n",
        )
        .unwrap();
        let nested = temp.path().join("hw/rtl");
        fs::create_dir_all(&nested).unwrap();

        let found = find_config_file(&nested).unwrap();
        assert_eq!(found, temp.path().join(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_load_missing_config() {
        let temp = TempDir::new().unwrap();
        let loader = ConfigLoader::new().without_env();
        let result = loader.load_from_file(&temp.path().join(CONFIG_FILE_NAME));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_project_root_is_config_parent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[project]\nname = \"qa\"\n").unwrap();

        let config = ConfigLoader::new().without_env().load_from_file(&path).unwrap();
        assert_eq!(config.project_root, temp.path());
        assert_eq!(config.config_path(), path);
    }
}
