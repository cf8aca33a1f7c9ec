//! Project Configuration (synthflow.toml)
//!
//! Handles the project-level configuration stored in `synthflow.toml` at the
//! project root. Every table rejects unknown keys, so a misspelled source
//! kind is reported when the file is loaded rather than silently ignored.

use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Default environment variable locating the vendor release tree
pub const DEFAULT_VENDOR_ROOT_ENV: &str = "AAL_QA_HW";

/// Default tool used by the generated deployment script
pub const DEFAULT_FLASH_TOOL: &str = "nios2-configure-sof";

/// Project configuration from synthflow.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Project metadata
    pub project: ProjectMeta,

    /// Build targets, each with its own workspace
    #[serde(default, rename = "target")]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<TargetConfig>,
}

/// Project metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProjectMeta {
    /// Project name
    pub name: String,

    /// Project description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Platform variant selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantName {
    /// Partition-merge flow
    #[default]
    Bdx,
    /// Partition snapshot export/import flow
    Skx,
}

impl fmt::Display for VariantName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bdx => write!(f, "bdx"),
            Self::Skx => write!(f, "skx"),
        }
    }
}

/// One build target
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct TargetConfig {
    /// Target name, also used as the toolchain project name
    pub name: String,

    /// Pipeline variant
    #[serde(default)]
    pub variant: VariantName,

    /// Build workspace directory (relative to the project root)
    pub workspace: PathBuf,

    /// Generated parameter file emitted ahead of all constraint files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_file: Option<PathBuf>,

    /// Board settings file sourced by the descriptor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_settings: Option<PathBuf>,

    /// Include directories, emitted as search paths in order
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub include_dirs: Vec<PathBuf>,

    /// Fixed seed for incremental compilation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,

    /// Extra `NAME=VALUE` macros
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub macros: Vec<String>,

    /// Programming tool invoked by the deployment script
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flash_tool: Option<String>,

    /// Interface feature flags
    #[serde(default)]
    pub features: FeatureConfig,

    /// Source lists
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Vendor release files
    #[serde(default)]
    pub vendor: VendorConfig,

    /// Report marker overrides
    #[serde(default)]
    pub validation: ValidationConfig,
}

/// Interface feature flags
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct FeatureConfig {
    /// Enable the CCI-S interface
    #[serde(default)]
    pub ccis: bool,

    /// Enable the CCI-P interface
    #[serde(default)]
    pub ccip: bool,
}

/// Kind of source list in `[target.sources]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceRole {
    Rtl,
    Vhdl,
    ConstraintHeaders,
    Constraints,
    ConstraintAlgebras,
    Packages,
    Generated,
}

impl SourceRole {
    /// All roles, in declaration order
    pub const ALL: [SourceRole; 7] = [
        Self::Rtl,
        Self::Vhdl,
        Self::ConstraintHeaders,
        Self::Constraints,
        Self::ConstraintAlgebras,
        Self::Packages,
        Self::Generated,
    ];

    /// Key used in synthflow.toml
    pub fn key(&self) -> &'static str {
        match self {
            Self::Rtl => "rtl",
            Self::Vhdl => "vhdl",
            Self::ConstraintHeaders => "constraint-headers",
            Self::Constraints => "constraints",
            Self::ConstraintAlgebras => "constraint-algebras",
            Self::Packages => "packages",
            Self::Generated => "generated",
        }
    }
}

impl fmt::Display for SourceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Source lists for one target
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct SourcesConfig {
    #[serde(default)]
    pub rtl: Vec<PathBuf>,

    #[serde(default)]
    pub vhdl: Vec<PathBuf>,

    #[serde(default)]
    pub constraint_headers: Vec<PathBuf>,

    #[serde(default)]
    pub constraints: Vec<PathBuf>,

    #[serde(default)]
    pub constraint_algebras: Vec<PathBuf>,

    #[serde(default)]
    pub packages: Vec<PathBuf>,

    /// Verilog produced by external system builders
    #[serde(default)]
    pub generated: Vec<PathBuf>,

    /// Module boundaries; each gets a synthesized wrapper source
    #[serde(default)]
    pub boundaries: Vec<String>,

    /// Directory holding generated wrapper sources
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wrapper_dir: Option<PathBuf>,
}

impl SourcesConfig {
    /// Paths supplied for one role
    pub fn paths(&self, role: SourceRole) -> &[PathBuf] {
        match role {
            SourceRole::Rtl => &self.rtl,
            SourceRole::Vhdl => &self.vhdl,
            SourceRole::ConstraintHeaders => &self.constraint_headers,
            SourceRole::Constraints => &self.constraints,
            SourceRole::ConstraintAlgebras => &self.constraint_algebras,
            SourceRole::Packages => &self.packages,
            SourceRole::Generated => &self.generated,
        }
    }

    /// Wrapper directory, defaulting to `.bsc` under the project root
    pub fn wrapper_dir(&self) -> &Path {
        self.wrapper_dir
            .as_deref()
            .unwrap_or_else(|| Path::new(".bsc"))
    }
}

/// Vendor release files
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct VendorConfig {
    /// Environment variable naming the vendor release root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_env: Option<String>,

    /// Files under the vendor root that must exist
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<PathBuf>,

    /// Project files linked into the workspace when present
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub local: Vec<PathBuf>,
}

impl VendorConfig {
    /// Environment variable for the vendor root
    pub fn root_env(&self) -> &str {
        self.root_env.as_deref().unwrap_or(DEFAULT_VENDOR_ROOT_ENV)
    }
}

/// Report marker overrides
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ValidationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl TargetConfig {
    /// Create a target with only the required fields set
    pub fn new(name: impl Into<String>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            variant: VariantName::default(),
            workspace: workspace.into(),
            parameter_file: None,
            base_settings: None,
            include_dirs: Vec::new(),
            seed: None,
            macros: Vec::new(),
            flash_tool: None,
            features: FeatureConfig::default(),
            sources: SourcesConfig::default(),
            vendor: VendorConfig::default(),
            validation: ValidationConfig::default(),
        }
    }

    /// Programming tool, falling back to the default
    pub fn flash_tool(&self) -> &str {
        self.flash_tool.as_deref().unwrap_or(DEFAULT_FLASH_TOOL)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "target.name".to_string(),
                reason: "name cannot be empty".to_string(),
            });
        }

        if self.workspace.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("target.{}.workspace", self.name),
                reason: "workspace cannot be empty".to_string(),
            });
        }

        for macro_def in &self.macros {
            if !is_valid_macro(macro_def) {
                return Err(ConfigError::InvalidValue {
                    field: format!("target.{}.macros", self.name),
                    reason: format!("invalid macro '{}'", macro_def),
                });
            }
        }

        if let Some(tool) = &self.flash_tool {
            if tool.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("target.{}.flash-tool", self.name),
                    reason: "flash tool cannot be empty".to_string(),
                });
            }
        }

        if self.vendor.root_env().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("target.{}.vendor.root-env", self.name),
                reason: "environment variable name cannot be empty".to_string(),
            });
        }

        Ok(())
    }
}

impl ProjectConfig {
    /// Load project configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            file: path.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::TomlParseError {
            file: PathBuf::from("<string>"),
            error: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the project configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.project.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "project.name".to_string(),
                reason: "name cannot be empty".to_string(),
            });
        }

        let mut names = HashSet::new();
        let mut workspaces: Vec<(&str, PathBuf)> = Vec::new();

        for target in &self.targets {
            target.validate()?;

            if !names.insert(target.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate target name '{}'",
                    target.name
                )));
            }

            // Targets may run concurrently, so each must own a disjoint directory.
            let workspace = normalize_workspace(&target.workspace);
            if let Some((other, _)) = workspaces
                .iter()
                .find(|(_, w)| w.starts_with(&workspace) || workspace.starts_with(w))
            {
                return Err(ConfigError::ValidationError(format!(
                    "target '{}' workspace '{}' overlaps the workspace of target '{}'",
                    target.name,
                    target.workspace.display(),
                    other
                )));
            }
            workspaces.push((target.name.as_str(), workspace));
        }

        Ok(())
    }

    /// Look up a target by name
    pub fn target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Get target names in declaration order
    pub fn target_names(&self) -> Vec<&str> {
        self.targets.iter().map(|t| t.name.as_str()).collect()
    }
}

/// Lexically fold `.` and `..` so aliases of one directory compare equal
fn normalize_workspace(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}

fn is_valid_macro(def: &str) -> bool {
    let name = def.split_once('=').map_or(def, |(name, _)| name);
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}
