//! Synthflow build pipeline
//!
//! Drives a hardware synthesis toolchain for one build target:
//! - Artifact catalog with deterministic ordering
//! - Project descriptor generation
//! - Workspace staging of vendor and local files
//! - Stage graph with incremental reuse and partition snapshots
//! - Timing report validation
//! - Deployment script emission

pub mod artifact;
pub mod builder;
pub mod catalog;
pub mod context;
pub mod deploy;
pub mod descriptor;
pub mod error;
pub mod executor;
pub mod freshness;
pub mod stage;
pub mod staging;
pub mod validator;
pub mod variant;

// Re-export main types
pub use artifact::{ArtifactGroup, ArtifactKind, BuildArtifact};
pub use builder::{BuildOutcome, Builder};
pub use catalog::{Catalog, SourceLists};
pub use context::TargetContext;
pub use deploy::DeploymentScript;
pub use descriptor::{Assignment, Directive, ProjectDescriptor, ToolchainOptions};
pub use error::{BuildError, BuildResult};
pub use executor::{
    PipelineExecutor, PipelineOutcome, PlannedStage, ProcessRunner, StageAction, StageReport,
    ToolOutput, ToolRunner,
};
pub use freshness::{Freshness, StaleReason};
pub use stage::{Stage, StageCommand, StageGraph, ToolInvocation};
pub use staging::StagedLink;
pub use validator::{validate_report, BuildStatus, ValidationSpec, Verdict};
pub use variant::{PartitionStrategy, PipelineParams, PlatformVariant};
