use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;

/// Hardware synthesis build driver.
///
/// Stages sources into a per-target workspace, writes the toolchain project
/// descriptor, runs the synthesis toolchain stage by stage with incremental
/// reuse, checks the timing report and emits a deployment script.
///
/// EXAMPLES:
///     synthflow build                     Build every target in synthflow.toml
///     synthflow build -t fpga --force     Rebuild one target from scratch
///     synthflow stages -t fpga            Show stage order and freshness
///     synthflow descriptor -t fpga        Print the generated descriptor
///     synthflow validate fpga.sta.rpt     Check a timing report
///
/// ENVIRONMENT VARIABLES:
///     AAL_QA_HW             Vendor release root (name configurable per target)
///     SYNTHFLOW_FLASH_TOOL  Override the programming tool for all targets
///     SYNTHFLOW_SEED        Override the incremental compilation seed
///     RUST_LOG              Log filter (e.g. synthflow_build=debug)
#[derive(Parser)]
#[command(name = "synthflow")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output (info-level logs)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build one or more targets
    ///
    /// Targets are built one after another. A fatal error in one target is
    /// reported and the remaining targets still run; the exit status is
    /// non-zero if any target failed.
    ///
    /// EXAMPLES:
    ///     synthflow build                   Build all targets
    ///     synthflow build -t bdx -t skx     Build two targets
    ///     synthflow build --json            Machine-readable results
    #[command(visible_alias = "b")]
    Build {
        /// Target to build (repeatable; default: all)
        #[arg(long = "target", short = 't')]
        targets: Vec<String>,
        /// Path to synthflow.toml (default: search upwards from the current directory)
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
        /// Rerun every stage regardless of freshness
        #[arg(long)]
        force: bool,
        /// JSON output
        #[arg(long, env = "SYNTHFLOW_JSON")]
        json: bool,
        /// Quiet output (errors only)
        #[arg(long, short = 'q')]
        quiet: bool,
    },

    /// Print the project descriptor for a target
    ///
    /// EXAMPLES:
    ///     synthflow descriptor -t fpga
    ///     synthflow descriptor -t fpga > fpga.qsf
    Descriptor {
        /// Target name
        #[arg(long = "target", short = 't')]
        target: String,
        /// Path to synthflow.toml
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Show the stage order and what a build would rerun
    ///
    /// EXAMPLES:
    ///     synthflow stages -t fpga
    Stages {
        /// Target name
        #[arg(long = "target", short = 't')]
        target: String,
        /// Path to synthflow.toml
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Check a timing report for success or failure markers
    ///
    /// Exits with status 0 only if the success marker is found.
    ///
    /// EXAMPLES:
    ///     synthflow validate output_files/fpga.sta.rpt
    ///     synthflow validate top.sta.rpt --success "Timing Analyzer was successful"
    Validate {
        /// Report file
        report: PathBuf,
        /// Text that marks a passing report
        #[arg(long)]
        success: Option<String>,
        /// Text that marks a failing report
        #[arg(long)]
        failure: Option<String>,
        /// JSON output
        #[arg(long, env = "SYNTHFLOW_JSON")]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Build {
            targets,
            config,
            force,
            json,
            quiet,
        } => {
            let args = commands::build::BuildArgs {
                targets,
                config,
                force,
                json,
                quiet,
            };
            commands::build::run(args)
        }
        Commands::Descriptor { target, config } => {
            commands::descriptor::run(&target, config.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Stages { target, config } => {
            commands::stages::run(&target, config.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Validate {
            report,
            success,
            failure,
            json,
        } => commands::validate::run(&report, success, failure, json),
    }
}
