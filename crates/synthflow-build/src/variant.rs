//! Platform variants and the pipeline template they parameterize
//!
//! Both platforms run the same template. A variant selects the interface
//! macro names, the partition strategy between synthesis and fitting, and
//! the phrasing the timing analyzer uses to report success.

use crate::error::BuildResult;
use crate::stage::{Stage, StageCommand, StageGraph, ToolInvocation};
use crate::staging::StagedLink;
use crate::validator::ValidationSpec;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use synthflow_config::{FeatureConfig, VariantName};

/// Directory holding every toolchain-produced file, relative to the workspace
pub const OUTPUT_DIR: &str = "output_files";

/// Directory holding the deployment script, relative to the workspace
pub const CONFIG_DIR: &str = "config";

/// Report line printed when timing is not met, on either platform
pub const TIMING_FAILURE_MARKER: &str = "Timing requirements not met";

/// How the synthesized netlist reaches the fitter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionStrategy {
    /// Merge partitions into the base project database
    Merge,
    /// Export a snapshot and import it into base and overlay revisions
    Snapshot,
}

/// Target platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformVariant {
    Bdx,
    Skx,
}

impl From<VariantName> for PlatformVariant {
    fn from(name: VariantName) -> Self {
        match name {
            VariantName::Bdx => Self::Bdx,
            VariantName::Skx => Self::Skx,
        }
    }
}

impl fmt::Display for PlatformVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl PlatformVariant {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bdx => "bdx",
            Self::Skx => "skx",
        }
    }

    /// Interface macros, feature-gated ones first
    pub fn macros(&self, features: &FeatureConfig) -> Vec<String> {
        let (ccis, ccip, interface) = match self {
            Self::Bdx => ("USE_PLATFORM_CCIS=1", "USE_PLATFORM_CCIP=1", "CCIP_IF_V0_1=1"),
            Self::Skx => (
                "PLATFORM_PROVIDES_CCIS=1",
                "PLATFORM_PROVIDES_CCIP=1",
                "CCIP_IF_V0_2=1",
            ),
        };

        let mut macros = Vec::new();
        if features.ccis {
            macros.push(ccis.to_string());
        }
        if features.ccip {
            macros.push(ccip.to_string());
        }
        macros.push(interface.to_string());
        macros
    }

    pub fn partition_strategy(&self) -> PartitionStrategy {
        match self {
            Self::Bdx => PartitionStrategy::Merge,
            Self::Skx => PartitionStrategy::Snapshot,
        }
    }

    /// Line the timing analyzer prints on success
    pub fn success_marker(&self) -> &'static str {
        match self {
            Self::Bdx => "Timing Analyzer was successful",
            Self::Skx => "Quartus Prime Timing Analyzer was successful",
        }
    }

    pub fn failure_marker(&self) -> &'static str {
        TIMING_FAILURE_MARKER
    }

    /// Instantiate the pipeline template for one target
    pub fn pipeline(&self, params: &PipelineParams) -> BuildResult<StageGraph> {
        let p = params.project.as_str();
        let out = |suffix: &str| PathBuf::from(OUTPUT_DIR).join(format!("{}{}", p, suffix));
        let quartus = |program: &str| ToolInvocation::new(program).arg(p);

        let map_report = out(".map.rpt");
        let fit_report = out(".fit.rpt");
        let sof = out(".sof");

        let mut graph = StageGraph::new();

        if !params.links.is_empty() {
            graph.add_stage(
                Stage::new(
                    "stage-files",
                    StageCommand::Link {
                        links: params.links.clone(),
                    },
                )
                .with_inputs(params.links.iter().map(|l| l.source.clone()))
                .with_outputs(params.links.iter().map(|l| l.dest.clone())),
            )?;
        }

        graph.add_stage(
            Stage::tool(
                "synthesize",
                quartus("quartus_map")
                    .arg("--verilog_macro=QUARTUS_COMPILATION=1")
                    .arg("--lib_path")
                    .arg(params.workdir.display().to_string()),
            )
            .with_inputs([params.descriptor.clone()])
            .with_inputs(params.sources.iter().cloned())
            .with_inputs(params.links.iter().map(|l| l.dest.clone()))
            .with_outputs([map_report.clone()]),
        )?;

        let fit_inputs = match self.partition_strategy() {
            PartitionStrategy::Merge => {
                let merged = out(".merge.rpt");
                graph.add_stage(
                    Stage::tool("merge", quartus("quartus_cdb").arg("--merge=on"))
                        .with_inputs([map_report])
                        .with_outputs([merged.clone()]),
                )?;
                vec![merged]
            }
            PartitionStrategy::Snapshot => {
                let snapshot = out(".qdb");
                let overlay = format!("{}_overlay", p);
                let base_import = out(".import.rpt");
                let overlay_import =
                    PathBuf::from(OUTPUT_DIR).join(format!("{}.import.rpt", overlay));

                graph.add_stage(
                    Stage::tool(
                        "export",
                        quartus("quartus_cdb").args([
                            "--export_block",
                            "root_partition",
                            "--snapshot",
                            "synthesized",
                            "--file",
                        ])
                        .arg(snapshot.display().to_string()),
                    )
                    .with_inputs([map_report])
                    .with_outputs([snapshot.clone()]),
                )?;
                graph.add_stage(import_stage("import-base", p, p, &snapshot, base_import.clone()))?;
                graph.add_stage(import_stage(
                    "import-overlay",
                    p,
                    &overlay,
                    &snapshot,
                    overlay_import.clone(),
                ))?;
                vec![base_import, overlay_import]
            }
        };

        graph.add_stage(
            Stage::tool("fit", quartus("quartus_fit"))
                .with_inputs(fit_inputs)
                .with_outputs([fit_report.clone()]),
        )?;

        graph.add_stage(
            Stage::tool("assemble", quartus("quartus_asm"))
                .with_inputs([fit_report.clone()])
                .with_outputs([sof.clone()]),
        )?;

        let sta_report = out(".sta.rpt");
        graph.add_stage(
            Stage::tool("timing", quartus("quartus_sta"))
                .with_inputs([fit_report])
                .with_outputs([sta_report.clone()]),
        )?;

        let rbf = out(".rbf");
        graph.add_stage(
            Stage::tool(
                "convert",
                ToolInvocation::new("quartus_cpf")
                    .arg("-c")
                    .arg(sof.display().to_string())
                    .arg(rbf.display().to_string()),
            )
            .with_inputs([sof.clone()])
            .with_outputs([rbf]),
        )?;

        let script = PathBuf::from(CONFIG_DIR).join(format!("{}.download", p));
        graph.add_stage(
            Stage::new(
                "deploy",
                StageCommand::DeployScript {
                    bitstream: sof.clone(),
                    script: script.clone(),
                    flash_tool: params.flash_tool.clone(),
                },
            )
            .with_inputs([sof])
            .with_outputs([script]),
        )?;

        graph.set_validation(ValidationSpec::new(
            "timing",
            sta_report,
            params
                .success
                .clone()
                .unwrap_or_else(|| self.success_marker().to_string()),
            params
                .failure
                .clone()
                .unwrap_or_else(|| self.failure_marker().to_string()),
        ));

        Ok(graph)
    }
}

fn import_stage(name: &str, project: &str, revision: &str, snapshot: &Path, report: PathBuf) -> Stage {
    Stage::tool(
        name,
        ToolInvocation::new("quartus_cdb")
            .arg(project)
            .args(["-c", revision, "--import_block", "root_partition", "--file"])
            .arg(snapshot.display().to_string()),
    )
    .with_inputs([snapshot.to_path_buf()])
    .with_outputs([report])
}

/// Per-target values the pipeline template needs
#[derive(Debug, Clone)]
pub struct PipelineParams {
    /// Toolchain project name
    pub project: String,
    /// Absolute workspace directory
    pub workdir: PathBuf,
    /// Descriptor path, relative to the workspace
    pub descriptor: PathBuf,
    /// Synthesis inputs besides the descriptor, relative to the workspace
    pub sources: BTreeSet<PathBuf>,
    /// Files linked into the workspace ahead of synthesis
    pub links: Vec<StagedLink>,
    pub flash_tool: String,
    /// Success marker override
    pub success: Option<String>,
    /// Failure marker override
    pub failure: Option<String>,
}

impl PipelineParams {
    pub fn new(project: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        let project = project.into();
        Self {
            descriptor: PathBuf::from(format!("{}.qsf", project)),
            project,
            workdir: workdir.into(),
            sources: BTreeSet::new(),
            links: Vec::new(),
            flash_tool: synthflow_config::DEFAULT_FLASH_TOOL.to_string(),
            success: None,
            failure: None,
        }
    }
}
