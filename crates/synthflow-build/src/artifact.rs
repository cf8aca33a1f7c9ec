//! Build artifact kinds and classification
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use synthflow_config::SourceRole;

/// Kind of build input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    /// Plain Verilog source
    RtlSource,
    /// SystemVerilog source or header
    SystemVerilogSource,
    /// VHDL source
    VhdlSource,
    /// Constraint script that other constraint files depend on
    ConstraintHeader,
    /// Timing constraint file
    Constraint,
    /// Constraints derived from other constraints
    ConstraintAlgebra,
    /// SystemVerilog package
    Package,
    /// Verilog emitted by an external system builder
    GeneratedSource,
}

/// Ordering groups used by the descriptor.
///
/// Declaration order is emission order; the toolchain reads constraint
/// files in sequence, so headers must precede the files that use them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArtifactGroup {
    ConstraintHeaders,
    Constraints,
    ConstraintAlgebras,
    Packages,
    Hdl,
    Vhdl,
    Generated,
}

impl ArtifactKind {
    /// Classify an HDL file by extension.
    ///
    /// Unrecognized extensions are treated as plain Verilog.
    pub fn from_extension(path: &Path) -> Self {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("sv") | Some("vh") | Some("svh") => Self::SystemVerilogSource,
            Some("vhd") | Some("vhdl") => Self::VhdlSource,
            _ => Self::RtlSource,
        }
    }

    /// Classify a path supplied under a configured source role
    pub fn classify(role: SourceRole, path: &Path) -> Self {
        match role {
            SourceRole::Rtl => Self::from_extension(path),
            SourceRole::Vhdl => Self::VhdlSource,
            SourceRole::ConstraintHeaders => Self::ConstraintHeader,
            SourceRole::Constraints => Self::Constraint,
            SourceRole::ConstraintAlgebras => Self::ConstraintAlgebra,
            SourceRole::Packages => Self::Package,
            SourceRole::Generated => Self::GeneratedSource,
        }
    }

    /// Descriptor ordering group
    pub fn group(&self) -> ArtifactGroup {
        match self {
            Self::ConstraintHeader => ArtifactGroup::ConstraintHeaders,
            Self::Constraint => ArtifactGroup::Constraints,
            Self::ConstraintAlgebra => ArtifactGroup::ConstraintAlgebras,
            Self::Package => ArtifactGroup::Packages,
            Self::RtlSource | Self::SystemVerilogSource => ArtifactGroup::Hdl,
            Self::VhdlSource => ArtifactGroup::Vhdl,
            Self::GeneratedSource => ArtifactGroup::Generated,
        }
    }

    /// Whether this kind is a timing constraint file
    pub fn is_constraint(&self) -> bool {
        matches!(
            self,
            Self::ConstraintHeader | Self::Constraint | Self::ConstraintAlgebra
        )
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::RtlSource => "rtl",
            Self::SystemVerilogSource => "systemverilog",
            Self::VhdlSource => "vhdl",
            Self::ConstraintHeader => "constraint-header",
            Self::Constraint => "constraint",
            Self::ConstraintAlgebra => "constraint-algebra",
            Self::Package => "package",
            Self::GeneratedSource => "generated",
        };
        f.write_str(name)
    }
}

/// A classified build input
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildArtifact {
    /// Normalized path, relative to the project root unless absolute
    pub path: PathBuf,
    /// Artifact kind
    pub kind: ArtifactKind,
    /// Pipeline stage that writes this file. Sources made outside the
    /// pipeline, wrappers included, have none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producing_stage: Option<String>,
}

impl BuildArtifact {
    /// Create a new artifact
    pub fn new(path: impl Into<PathBuf>, kind: ArtifactKind) -> Self {
        Self {
            path: path.into(),
            kind,
            producing_stage: None,
        }
    }
}
