//! Per-target build context
//!
//! Constructed once from configuration and passed by reference to every
//! component. Nothing in it changes during a build.

use crate::catalog::{normalize_path, SourceLists};
use crate::descriptor::ToolchainOptions;
use crate::error::{BuildError, BuildResult};
use crate::variant::{PipelineParams, PlatformVariant, OUTPUT_DIR};
use std::path::{Path, PathBuf};
use synthflow_config::{Config, SourceRole, TargetConfig};
use walkdir::WalkDir;

/// Immutable description of one target's build
#[derive(Debug, Clone)]
pub struct TargetContext {
    name: String,
    project_root: PathBuf,
    workdir: PathBuf,
    variant: PlatformVariant,
    options: ToolchainOptions,
    sources: SourceLists,
    vendor_env: String,
    vendor_files: Vec<PathBuf>,
    local_files: Vec<PathBuf>,
    flash_tool: String,
    success: Option<String>,
    failure: Option<String>,
}

impl TargetContext {
    /// Build the context for a named target of a loaded configuration
    pub fn from_config(config: &Config, target_name: &str) -> BuildResult<Self> {
        let target = config.project.target(target_name).ok_or_else(|| {
            BuildError::Config(synthflow_config::ConfigError::ValidationError(format!(
                "unknown target '{}' (available: {})",
                target_name,
                config.project.target_names().join(", ")
            )))
        })?;
        Self::new(&config.project_root, target)
    }

    /// Build the context for a target rooted at `project_root`
    pub fn new(project_root: &Path, target: &TargetConfig) -> BuildResult<Self> {
        let project_root = absolute(project_root)?;
        let workdir = normalize_path(&project_root.join(&target.workspace));
        let variant = PlatformVariant::from(target.variant);

        let mut options = ToolchainOptions::new(variant, &project_root, &target.workspace);
        options.features = target.features;
        options.extra_macros = target.macros.clone();
        options.base_settings = target.base_settings.clone();
        options.output_dir = Some(PathBuf::from(OUTPUT_DIR));
        options.include_dirs = target.include_dirs.clone();
        options.seed = target.seed;
        options.parameter_file = target.parameter_file.clone();

        let mut sources = SourceLists::new().with_boundaries(
            target.sources.boundaries.clone(),
            target.sources.wrapper_dir(),
        );
        for role in SourceRole::ALL {
            sources.add(
                role,
                expand_paths(&project_root, role, target.sources.paths(role)),
            );
        }

        Ok(Self {
            name: target.name.clone(),
            project_root,
            workdir,
            variant,
            options,
            sources,
            vendor_env: target.vendor.root_env().to_string(),
            vendor_files: target.vendor.files.clone(),
            local_files: target.vendor.local.clone(),
            flash_tool: target.flash_tool().to_string(),
            success: target.validation.success.clone(),
            failure: target.validation.failure.clone(),
        })
    }

    /// Target name, also the toolchain project name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Absolute workspace directory
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn variant(&self) -> PlatformVariant {
        self.variant
    }

    pub fn options(&self) -> &ToolchainOptions {
        &self.options
    }

    pub fn sources(&self) -> &SourceLists {
        &self.sources
    }

    /// Environment variable naming the vendor release root
    pub fn vendor_env(&self) -> &str {
        &self.vendor_env
    }

    /// Required files under the vendor root
    pub fn vendor_files(&self) -> &[PathBuf] {
        &self.vendor_files
    }

    /// Optional project files linked into the workspace
    pub fn local_files(&self) -> &[PathBuf] {
        &self.local_files
    }

    pub fn flash_tool(&self) -> &str {
        &self.flash_tool
    }

    /// Descriptor path, relative to the workspace
    pub fn descriptor_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.qsf", self.name))
    }

    /// Status summary path
    pub fn errinfo_path(&self) -> PathBuf {
        self.workdir.join(format!("{}_hw.errinfo", self.name))
    }

    /// Parameters for the variant's pipeline template
    pub fn pipeline_params<I>(&self, inputs: I) -> PipelineParams
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut params = PipelineParams::new(&self.name, &self.workdir);
        params.descriptor = self.descriptor_path();
        params.sources = inputs.into_iter().collect();
        params.flash_tool = self.flash_tool.clone();
        params.success = self.success.clone();
        params.failure = self.failure.clone();
        params
    }
}

fn absolute(path: &Path) -> BuildResult<PathBuf> {
    if path.is_absolute() {
        return Ok(normalize_path(path));
    }
    let cwd = std::env::current_dir().map_err(|e| BuildError::io(path, e))?;
    Ok(normalize_path(&cwd.join(path)))
}

/// Extensions picked up when a source entry names a directory
fn role_extensions(role: SourceRole) -> &'static [&'static str] {
    match role {
        SourceRole::Rtl => &["v", "sv", "vh", "svh"],
        SourceRole::Vhdl => &["vhd", "vhdl"],
        SourceRole::ConstraintHeaders
        | SourceRole::Constraints
        | SourceRole::ConstraintAlgebras => &["sdc", "tcl"],
        SourceRole::Packages => &["sv", "svh", "vh"],
        SourceRole::Generated => &["v", "sv"],
    }
}

/// Replace directory entries with the matching files beneath them, in
/// file-name order. Plain file entries pass through untouched.
fn expand_paths(project_root: &Path, role: SourceRole, paths: &[PathBuf]) -> Vec<PathBuf> {
    let extensions = role_extensions(role);
    let mut expanded = Vec::with_capacity(paths.len());

    for path in paths {
        let on_disk = project_root.join(path);
        if !on_disk.is_dir() {
            expanded.push(path.clone());
            continue;
        }

        for entry in WalkDir::new(&on_disk)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
        {
            let matches = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| extensions.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if !matches {
                continue;
            }
            let found = entry.path().strip_prefix(project_root).unwrap_or(entry.path());
            expanded.push(found.to_path_buf());
        }
    }

    expanded
}
