//! Pipeline execution
//!
//! Runs stages in topological order, skipping fresh ones, stopping at the
//! first failure. External programs are launched through [`ToolRunner`] so
//! the pipeline can be driven without the vendor toolchain installed.

use crate::deploy::DeploymentScript;
use crate::error::{BuildError, BuildResult};
use crate::freshness::{Freshness, StaleReason, StampStore};
use crate::stage::{Stage, StageCommand, StageGraph, ToolInvocation};
use crate::staging::stage_links;
use crate::validator::{validate_report, BuildStatus};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Directory for per-stage logs, relative to the workspace
pub const LOG_DIR: &str = "output_files/logs";

/// Captured result of one external program
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Exit code; `None` if terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// Successful output with the given stdout
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit code and stderr
    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Launches external toolchain programs
pub trait ToolRunner {
    /// Run `invocation` with `workdir` as the working directory.
    ///
    /// An `Err` means the program could not be started; a non-zero exit is
    /// reported through [`ToolOutput::exit_code`].
    fn run(&self, invocation: &ToolInvocation, workdir: &Path) -> std::io::Result<ToolOutput>;
}

impl<R: ToolRunner + ?Sized> ToolRunner for &R {
    fn run(&self, invocation: &ToolInvocation, workdir: &Path) -> std::io::Result<ToolOutput> {
        (**self).run(invocation, workdir)
    }
}

/// Runs programs as child processes with captured output
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ToolRunner for ProcessRunner {
    fn run(&self, invocation: &ToolInvocation, workdir: &Path) -> std::io::Result<ToolOutput> {
        let output = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?
            .wait_with_output()?;

        Ok(ToolOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// What happened to a stage during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageAction {
    Ran,
    Skipped,
}

/// Per-stage record of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub name: String,
    pub action: StageAction,
    /// Why the stage ran; `None` when skipped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<PathBuf>,
    pub duration_ms: u64,
}

/// Planned action for a stage, without running anything
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStage {
    pub name: String,
    pub freshness: Freshness,
}

/// Result of a completed pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub stages: Vec<StageReport>,
    pub status: BuildStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeploymentScript>,
    pub total_ms: u64,
}

impl PipelineOutcome {
    /// Names of stages that actually ran
    pub fn ran(&self) -> Vec<&str> {
        self.stages_with(StageAction::Ran)
    }

    /// Names of stages that were skipped as fresh
    pub fn skipped(&self) -> Vec<&str> {
        self.stages_with(StageAction::Skipped)
    }

    fn stages_with(&self, action: StageAction) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|s| s.action == action)
            .map(|s| s.name.as_str())
            .collect()
    }
}

/// Executes a stage graph inside one workspace
pub struct PipelineExecutor<R = ProcessRunner> {
    workdir: PathBuf,
    runner: R,
    force: bool,
}

impl PipelineExecutor<ProcessRunner> {
    /// Create an executor that launches real processes
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            runner: ProcessRunner,
            force: false,
        }
    }
}

impl<R: ToolRunner> PipelineExecutor<R> {
    /// Replace the tool runner
    pub fn with_runner<T: ToolRunner>(self, runner: T) -> PipelineExecutor<T> {
        PipelineExecutor {
            workdir: self.workdir,
            runner,
            force: self.force,
        }
    }

    /// Treat every stage as stale
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Workspace directory
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Access the runner
    pub fn runner(&self) -> &R {
        &self.runner
    }

    fn freshness(&self, stamps: &StampStore, stage: &Stage) -> BuildResult<Freshness> {
        if self.force {
            return Ok(Freshness::Stale(StaleReason::Forced));
        }
        stamps.freshness(stage, &self.workdir)
    }

    /// Report what a run would do, in execution order
    pub fn plan(&self, graph: &StageGraph) -> BuildResult<Vec<PlannedStage>> {
        let stamps = StampStore::load(&self.workdir);
        graph
            .topological_order()?
            .into_iter()
            .map(|stage| {
                Ok(PlannedStage {
                    name: stage.name.clone(),
                    freshness: self.freshness(&stamps, stage)?,
                })
            })
            .collect()
    }

    /// Run the pipeline.
    ///
    /// Stops at the first failing stage. The validation report is judged as
    /// soon as its stage has run or been skipped; a failed timing verdict is
    /// reported in the outcome and does not stop later stages.
    pub fn run(&self, graph: &StageGraph) -> BuildResult<PipelineOutcome> {
        let validation = graph
            .validation()
            .cloned()
            .ok_or_else(|| BuildError::InvalidGraph("no validation stage designated".to_string()))?;
        let order = graph.topological_order()?;

        let started = Instant::now();
        let mut stamps = StampStore::load(&self.workdir);
        let mut reports = Vec::with_capacity(order.len());
        let mut status = None;
        let mut deployment = None;

        for stage in order {
            let report = match self.freshness(&stamps, stage)? {
                Freshness::Fresh => {
                    tracing::info!(stage = %stage.name, "stage is up to date");
                    StageReport {
                        name: stage.name.clone(),
                        action: StageAction::Skipped,
                        reason: None,
                        log: None,
                        duration_ms: 0,
                    }
                }
                Freshness::Stale(reason) => {
                    tracing::info!(stage = %stage.name, %reason, "running stage");
                    match self.run_stage(stage) {
                        Ok((log, elapsed)) => {
                            stamps.record(
                                &stage.name,
                                crate::freshness::stage_fingerprint(stage, &self.workdir)?,
                            );
                            stamps.save()?;
                            StageReport {
                                name: stage.name.clone(),
                                action: StageAction::Ran,
                                reason: Some(reason.to_string()),
                                log: Some(log),
                                duration_ms: millis(elapsed),
                            }
                        }
                        Err(err) => {
                            stamps.mark_failed(&stage.name);
                            stamps.save()?;
                            tracing::error!(stage = %stage.name, error = %err, "stage failed");
                            return Err(err);
                        }
                    }
                }
            };
            reports.push(report);

            if stage.name == validation.stage {
                let judged = validate_report(
                    &self.workdir.join(&validation.report),
                    &validation.success,
                    &validation.failure,
                )?;
                if judged.succeeded {
                    tracing::info!(report = %judged.report_path.display(), "{}", judged.summary());
                } else {
                    tracing::warn!(report = %judged.report_path.display(), "{}", judged.summary());
                }
                status = Some(judged);
            }

            if let StageCommand::DeployScript {
                bitstream,
                script,
                flash_tool,
            } = &stage.command
            {
                deployment = Some(self.deployment_script(bitstream, script, flash_tool));
            }
        }

        let status = status.ok_or_else(|| {
            BuildError::InvalidGraph(format!(
                "validation stage '{}' is not in the graph",
                validation.stage
            ))
        })?;

        Ok(PipelineOutcome {
            stages: reports,
            status,
            deployment,
            total_ms: millis(started.elapsed()),
        })
    }

    fn deployment_script(&self, bitstream: &Path, script: &Path, flash_tool: &str) -> DeploymentScript {
        DeploymentScript::new(
            self.workdir.join(script),
            self.workdir.join(bitstream),
            flash_tool,
        )
    }

    /// Run one stale stage; returns the log path and elapsed time
    fn run_stage(&self, stage: &Stage) -> BuildResult<(PathBuf, Duration)> {
        for input in &stage.inputs {
            let path = self.workdir.join(input);
            if !path.exists() {
                return Err(BuildError::missing_file(
                    path,
                    format!("input of stage '{}'", stage.name),
                ));
            }
        }

        let started = Instant::now();
        let log = self.workdir.join(LOG_DIR).join(format!("{}.log", stage.name));

        match &stage.command {
            StageCommand::Tool(invocation) => {
                tracing::debug!(stage = %stage.name, command = %invocation, "launching");
                let output = self
                    .runner
                    .run(invocation, &self.workdir)
                    .map_err(|e| BuildError::StageSpawn {
                        stage: stage.name.clone(),
                        program: invocation.program.clone(),
                        error: e,
                    })?;

                write_log(&log, invocation, &output)?;

                if !output.succeeded() {
                    return Err(BuildError::StageFailed {
                        stage: stage.name.clone(),
                        exit_code: output.exit_code,
                        log,
                    });
                }
            }
            StageCommand::Link { links } => {
                let created = stage_links(&self.workdir, links)?;
                if !created.is_empty() {
                    tracing::info!(stage = %stage.name, created = created.len(), "staged workspace files");
                }
                let listing: String = links
                    .iter()
                    .map(|l| format!("{} -> {}\n", l.dest.display(), l.source.display()))
                    .collect();
                let invocation = ToolInvocation::new("link")
                    .args(created.iter().map(|p| p.display().to_string()));
                write_log(&log, &invocation, &ToolOutput::success(listing))?;
            }
            StageCommand::DeployScript {
                bitstream,
                script,
                flash_tool,
            } => {
                let deployment = self.deployment_script(bitstream, script, flash_tool);
                deployment.write()?;
                let output = ToolOutput::success(deployment.render());
                write_log(&log, &ToolInvocation::new("write").arg(script.display().to_string()), &output)?;
            }
        }

        for output in &stage.outputs {
            if !self.workdir.join(output).exists() {
                return Err(BuildError::MissingOutput {
                    stage: stage.name.clone(),
                    path: output.clone(),
                });
            }
        }

        Ok((log, started.elapsed()))
    }
}

fn write_log(log: &Path, invocation: &ToolInvocation, output: &ToolOutput) -> BuildResult<()> {
    if let Some(parent) = log.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
    }
    let exit = output
        .exit_code
        .map_or_else(|| "signal".to_string(), |c| c.to_string());
    let text = format!(
        "$ {}\n--- stdout ---\n{}\n--- stderr ---\n{}\n--- exit: {} ---\n",
        invocation, output.stdout, output.stderr, exit
    );
    fs::write(log, text).map_err(|e| BuildError::io(log, e))
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
