//! Project descriptor generation
//!
//! The descriptor is a line-oriented settings file consumed by the
//! synthesis toolchain. Constraint files are emitted strictly in the order
//! headers, constraints, algebras (each group sorted by path) because the
//! toolchain resolves dependencies between them in file order.

use crate::artifact::{ArtifactGroup, ArtifactKind};
use crate::catalog::{normalize_path, Catalog};
use crate::error::{BuildError, BuildResult};
use crate::variant::PlatformVariant;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use synthflow_config::FeatureConfig;

/// Assignment directive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directive {
    VerilogMacro,
    Source,
    ProjectOutputDirectory,
    SearchPath,
    Seed,
    SdcFile,
    VerilogFile,
    SystemVerilogFile,
    VhdlFile,
}

impl Directive {
    /// Directive name as written in the descriptor
    pub fn name(&self) -> &'static str {
        match self {
            Self::VerilogMacro => "VERILOG_MACRO",
            Self::Source => "source",
            Self::ProjectOutputDirectory => "PROJECT_OUTPUT_DIRECTORY",
            Self::SearchPath => "SEARCH_PATH",
            Self::Seed => "SEED",
            Self::SdcFile => "SDC_FILE",
            Self::VerilogFile => "VERILOG_FILE",
            Self::SystemVerilogFile => "SYSTEMVERILOG_FILE",
            Self::VhdlFile => "VHDL_FILE",
        }
    }

    /// Source-file directive for an HDL artifact kind
    fn for_source(kind: ArtifactKind) -> Self {
        match kind {
            ArtifactKind::SystemVerilogSource | ArtifactKind::Package => Self::SystemVerilogFile,
            ArtifactKind::VhdlSource => Self::VhdlFile,
            ArtifactKind::ConstraintHeader
            | ArtifactKind::Constraint
            | ArtifactKind::ConstraintAlgebra => Self::SdcFile,
            ArtifactKind::RtlSource | ArtifactKind::GeneratedSource => Self::VerilogFile,
        }
    }
}

/// One `(directive, value)` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub directive: Directive,
    pub value: String,
}

impl Assignment {
    pub fn new(directive: Directive, value: impl Into<String>) -> Self {
        Self {
            directive,
            value: value.into(),
        }
    }

    fn path(directive: Directive, path: &Path) -> Self {
        Self::new(directive, path.display().to_string())
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.directive {
            Directive::Source => write!(f, "source {}", quote_if_needed(&self.value)),
            Directive::VerilogMacro => write!(
                f,
                "set_global_assignment -name {} \"{}\"",
                self.directive.name(),
                self.value
            ),
            _ => write!(
                f,
                "set_global_assignment -name {} {}",
                self.directive.name(),
                quote_if_needed(&self.value)
            ),
        }
    }
}

fn quote_if_needed(value: &str) -> String {
    if value.chars().any(char::is_whitespace) {
        format!("\"{}\"", value)
    } else {
        value.to_string()
    }
}

/// Options controlling descriptor preamble and path rendering
#[derive(Debug, Clone)]
pub struct ToolchainOptions {
    /// Platform variant (selects macro names)
    pub variant: PlatformVariant,
    /// Interface feature flags
    pub features: FeatureConfig,
    /// Extra `NAME=VALUE` macros, in configured order
    pub extra_macros: Vec<String>,
    /// Settings file sourced ahead of all assignments
    pub base_settings: Option<PathBuf>,
    /// Directory for toolchain outputs, relative to the workspace
    pub output_dir: Option<PathBuf>,
    /// Include directories
    pub include_dirs: Vec<PathBuf>,
    /// Fixed seed for incremental compilation
    pub seed: Option<u32>,
    /// Parameter file emitted ahead of every constraint file
    pub parameter_file: Option<PathBuf>,
    /// Project root; relative paths are resolved against it for existence checks
    pub project_root: PathBuf,
    /// Workspace directory relative to the project root; emitted paths are
    /// made relative to it
    pub workspace: PathBuf,
}

impl ToolchainOptions {
    /// Options with no preamble for the given workspace
    pub fn new(variant: PlatformVariant, project_root: impl Into<PathBuf>, workspace: impl Into<PathBuf>) -> Self {
        Self {
            variant,
            features: FeatureConfig::default(),
            extra_macros: Vec::new(),
            base_settings: None,
            output_dir: None,
            include_dirs: Vec::new(),
            seed: None,
            parameter_file: None,
            project_root: project_root.into(),
            workspace: workspace.into(),
        }
    }

    /// Express a project-relative path relative to the workspace.
    /// With an absolute workspace, relative paths are anchored at the
    /// project root instead.
    pub fn relative(&self, path: &Path) -> PathBuf {
        if self.workspace.is_absolute() && path.is_relative() {
            return normalize_path(&self.project_root.join(path));
        }
        workspace_relative(path, &self.workspace)
    }
}

/// Generated project descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectDescriptor {
    entries: Vec<Assignment>,
}

impl ProjectDescriptor {
    /// Build the descriptor for a catalog.
    ///
    /// Fails with `MissingRequiredFile` when a parameter file is configured
    /// but absent.
    pub fn generate(catalog: &Catalog, options: &ToolchainOptions) -> BuildResult<Self> {
        let mut entries = Vec::new();

        let mut macros = options.variant.macros(&options.features);
        for extra in &options.extra_macros {
            if !macros.contains(extra) {
                macros.push(extra.clone());
            }
        }
        entries.extend(
            macros
                .into_iter()
                .map(|m| Assignment::new(Directive::VerilogMacro, m)),
        );

        if let Some(settings) = &options.base_settings {
            entries.push(Assignment::path(Directive::Source, &options.relative(settings)));
        }

        if let Some(dir) = &options.output_dir {
            entries.push(Assignment::path(Directive::ProjectOutputDirectory, dir));
        }

        let mut search_paths: Vec<PathBuf> = Vec::new();
        for dir in &options.include_dirs {
            let rel = options.relative(dir);
            if !search_paths.contains(&rel) {
                search_paths.push(rel);
            }
        }
        entries.extend(
            search_paths
                .iter()
                .map(|p| Assignment::path(Directive::SearchPath, p)),
        );

        if let Some(seed) = options.seed {
            entries.push(Assignment::new(Directive::Seed, seed.to_string()));
        }

        if let Some(param) = &options.parameter_file {
            let on_disk = options.project_root.join(param);
            if !on_disk.is_file() {
                return Err(BuildError::missing_file(on_disk, "build parameter file"));
            }
            entries.push(Assignment::path(Directive::SdcFile, &options.relative(param)));
        }

        for group in [
            ArtifactGroup::ConstraintHeaders,
            ArtifactGroup::Constraints,
            ArtifactGroup::ConstraintAlgebras,
            ArtifactGroup::Packages,
            ArtifactGroup::Hdl,
            ArtifactGroup::Vhdl,
            ArtifactGroup::Generated,
        ] {
            for artifact in catalog.group(group) {
                entries.push(Assignment::path(
                    Directive::for_source(artifact.kind),
                    &options.relative(&artifact.path),
                ));
            }
        }

        Ok(Self { entries })
    }

    /// All entries in emission order
    pub fn entries(&self) -> &[Assignment] {
        &self.entries
    }

    /// Values of every entry with the given directive
    pub fn values(&self, directive: Directive) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.directive == directive)
            .map(|e| e.value.as_str())
            .collect()
    }

    /// Render descriptor text, one directive per line
    pub fn render(&self) -> String {
        let mut text = String::new();
        for entry in &self.entries {
            text.push_str(&entry.to_string());
            text.push('\n');
        }
        text
    }

    /// Write the descriptor, leaving the file untouched when its content is
    /// already identical. Returns whether the file was written.
    pub fn write_if_changed(&self, path: &Path) -> BuildResult<bool> {
        let text = self.render();
        match fs::read_to_string(path) {
            Ok(existing) if existing == text => return Ok(false),
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(BuildError::io(path, e)),
        }
        fs::write(path, text).map_err(|e| BuildError::io(path, e))?;
        Ok(true)
    }
}

/// Render descriptor text for a catalog
pub fn render(catalog: &Catalog, options: &ToolchainOptions) -> BuildResult<String> {
    Ok(ProjectDescriptor::generate(catalog, options)?.render())
}

/// Express `path` relative to `workspace`; absolute paths are kept as-is.
pub fn workspace_relative(path: &Path, workspace: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let path = normalize_path(path);
    pathdiff::diff_paths(&path, normalize_path(workspace)).unwrap_or(path)
}
