//! Synthflow Configuration System
//!
//! Loads the per-project `synthflow.toml` that describes one or more
//! hardware build targets:
//! - Project metadata
//! - Per-target sources, toolchain options and vendor release files
//! - Environment variable overrides (SYNTHFLOW_*)
//!
//! # Example
//!
//! ```no_run
//! use synthflow_config::ConfigLoader;
//! use std::path::Path;
//!
//! let loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! for target in &config.project.targets {
//!     println!("{}", target.name);
//! }
//! ```

pub mod loader;
pub mod project;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

// Re-export main types
pub use loader::{Config, ConfigLoader, CONFIG_FILE_NAME};
pub use project::{
    FeatureConfig, ProjectConfig, ProjectMeta, SourceRole, SourcesConfig, TargetConfig,
    ValidationConfig, VariantName, VendorConfig, DEFAULT_FLASH_TOOL, DEFAULT_VENDOR_ROOT_ENV,
};
