//! Build orchestration for one target
use crate::catalog::Catalog;
use crate::context::TargetContext;
use crate::deploy::DeploymentScript;
use crate::descriptor::ProjectDescriptor;
use crate::error::{BuildError, BuildResult};
use crate::executor::{PipelineExecutor, PlannedStage, ProcessRunner, StageReport, ToolRunner};
use crate::stage::StageGraph;
use crate::staging::{local_links, vendor_links, vendor_root, StagedLink};
use crate::validator::BuildStatus;
use crate::variant::{PlatformVariant, CONFIG_DIR, OUTPUT_DIR};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Result of a completed target build
#[derive(Debug, Clone, Serialize)]
pub struct BuildOutcome {
    pub target: String,
    pub variant: PlatformVariant,
    pub workspace: PathBuf,
    /// Whether the descriptor file was (re)written
    pub descriptor_written: bool,
    pub executed: Vec<String>,
    pub skipped: Vec<String>,
    pub stages: Vec<StageReport>,
    pub status: BuildStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeploymentScript>,
    pub total_ms: u64,
}

/// Drives one target from configuration to validated bitstream
pub struct Builder<R = ProcessRunner> {
    context: TargetContext,
    runner: R,
    force: bool,
    vendor_root: Option<PathBuf>,
}

impl Builder<ProcessRunner> {
    /// Create a builder that launches the real toolchain
    pub fn new(context: TargetContext) -> Self {
        Self {
            context,
            runner: ProcessRunner,
            force: false,
            vendor_root: None,
        }
    }
}

impl<R: ToolRunner> Builder<R> {
    /// Replace the tool runner
    pub fn with_runner<T: ToolRunner>(self, runner: T) -> Builder<T> {
        Builder {
            context: self.context,
            runner,
            force: self.force,
            vendor_root: self.vendor_root,
        }
    }

    /// Rerun every stage regardless of freshness
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Use this vendor release root instead of reading the environment
    pub fn with_vendor_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.vendor_root = Some(root.into());
        self
    }

    pub fn context(&self) -> &TargetContext {
        &self.context
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Canonical artifact list for the target
    pub fn catalog(&self) -> Catalog {
        Catalog::build(self.context.sources())
    }

    /// Descriptor for the target
    pub fn descriptor(&self) -> BuildResult<ProjectDescriptor> {
        ProjectDescriptor::generate(&self.catalog(), self.context.options())
    }

    /// Stage graph for the target
    pub fn graph(&self, catalog: &Catalog, links: &[StagedLink]) -> BuildResult<StageGraph> {
        let mut params = self.context.pipeline_params(self.synthesis_inputs(catalog));
        params.links = links.to_vec();
        self.context.variant().pipeline(&params)
    }

    /// Current freshness of every stage, in execution order.
    ///
    /// The vendor root is only needed when the target stages vendor files.
    pub fn plan(&self) -> BuildResult<Vec<PlannedStage>> {
        let links = if self.context.vendor_files().is_empty() {
            local_links(self.context.project_root(), self.context.local_files())
        } else {
            self.links()?
        };
        let graph = self.graph(&self.catalog(), &links)?;
        self.executor().plan(&graph)
    }

    /// Vendor and local files to link into the workspace.
    ///
    /// Fails if the vendor root is unset or a vendor file is missing.
    pub fn links(&self) -> BuildResult<Vec<StagedLink>> {
        let ctx = &self.context;
        let root = match &self.vendor_root {
            Some(root) => root.clone(),
            None => vendor_root(ctx.vendor_env())?,
        };
        let mut links = vendor_links(&root, ctx.vendor_files())?;
        links.extend(local_links(ctx.project_root(), ctx.local_files()));
        Ok(links)
    }

    /// Run the whole build
    pub fn build(&self) -> BuildResult<BuildOutcome> {
        let ctx = &self.context;
        let workdir = ctx.workdir();
        tracing::info!(name = ctx.name(), variant = %ctx.variant(), workspace = %workdir.display(), "building target");

        // Preflight: nothing below may launch a process or touch the
        // workspace until every required external input is known to exist.
        let links = self.links()?;
        if let Some(param) = &ctx.options().parameter_file {
            let on_disk = ctx.project_root().join(param);
            if !on_disk.is_file() {
                return Err(BuildError::missing_file(on_disk, "build parameter file"));
            }
        }

        for dir in [OUTPUT_DIR, CONFIG_DIR] {
            let path = workdir.join(dir);
            fs::create_dir_all(&path).map_err(|e| BuildError::io(&path, e))?;
        }

        let catalog = self.catalog();
        let descriptor = ProjectDescriptor::generate(&catalog, ctx.options())?;
        let descriptor_path = workdir.join(ctx.descriptor_path());
        let descriptor_written = descriptor.write_if_changed(&descriptor_path)?;
        if descriptor_written {
            tracing::info!(path = %descriptor_path.display(), "wrote project descriptor");
        }

        let graph = self.graph(&catalog, &links)?;
        graph.validate(&self.available_inputs(&catalog, &links))?;

        let outcome = self.executor().run(&graph)?;
        write_errinfo(&ctx.errinfo_path(), &outcome.status)?;

        Ok(BuildOutcome {
            target: ctx.name().to_string(),
            variant: ctx.variant(),
            workspace: workdir.to_path_buf(),
            descriptor_written,
            executed: outcome.ran().into_iter().map(String::from).collect(),
            skipped: outcome.skipped().into_iter().map(String::from).collect(),
            stages: outcome.stages,
            status: outcome.status,
            deployment: outcome.deployment,
            total_ms: outcome.total_ms,
        })
    }

    fn executor(&self) -> PipelineExecutor<&R> {
        PipelineExecutor::new(self.context.workdir())
            .with_runner(&self.runner)
            .with_force(self.force)
    }

    /// Synthesis inputs besides the descriptor, relative to the workspace
    fn synthesis_inputs(&self, catalog: &Catalog) -> BTreeSet<PathBuf> {
        let options = self.context.options();
        let settings = options
            .parameter_file
            .iter()
            .chain(options.base_settings.iter());
        catalog
            .artifacts()
            .iter()
            .map(|a| &a.path)
            .chain(settings)
            .map(|path| options.relative(path))
            .collect()
    }

    /// Paths that exist before any stage runs
    fn available_inputs(&self, catalog: &Catalog, links: &[StagedLink]) -> BTreeSet<PathBuf> {
        let mut available = self.synthesis_inputs(catalog);
        available.insert(self.context.descriptor_path());
        available.extend(links.iter().map(|l| l.source.clone()));
        available
    }
}

fn write_errinfo(path: &Path, status: &BuildStatus) -> BuildResult<()> {
    fs::write(path, format!("{}\n", status.summary())).map_err(|e| BuildError::io(path, e))
}
