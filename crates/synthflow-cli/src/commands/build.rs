//! Build command - run the pipeline for one or more targets

use anyhow::{bail, Result};
use colored::*;
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use synthflow_build::{BuildOutcome, Builder, TargetContext};

/// Build command arguments
#[derive(Default)]
pub struct BuildArgs {
    /// Targets to build; empty means all
    pub targets: Vec<String>,
    /// Explicit configuration file
    pub config: Option<PathBuf>,
    /// Ignore freshness
    pub force: bool,
    /// JSON output
    pub json: bool,
    /// Quiet output (errors only)
    pub quiet: bool,
}

/// Run the build command
pub fn run(args: BuildArgs) -> Result<ExitCode> {
    let config = super::load_config(args.config.as_deref())?;

    let names: Vec<String> = if args.targets.is_empty() {
        config
            .project
            .target_names()
            .into_iter()
            .map(String::from)
            .collect()
    } else {
        args.targets.clone()
    };
    if names.is_empty() {
        bail!("No targets defined in {}", config.config_path().display());
    }

    let mut results = Vec::with_capacity(names.len());
    let mut failed = 0usize;

    for name in &names {
        let result = TargetContext::from_config(&config, name).and_then(|ctx| {
            Builder::new(ctx).with_force(args.force).build()
        });

        match result {
            Ok(outcome) => {
                if !args.json && !args.quiet {
                    print_outcome(&outcome);
                }
                results.push(json!({ "target": name, "outcome": outcome }));
            }
            Err(e) => {
                failed += 1;
                tracing::error!(target_name = %name, "build failed");
                if !args.json {
                    eprintln!("{}: build failed: {}", name, e);
                }
                results.push(json!({ "target": name, "error": e.to_string() }));
            }
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else if !args.quiet && names.len() > 1 {
        println!(
            "{} of {} targets built",
            names.len() - failed,
            names.len()
        );
    }

    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_outcome(outcome: &BuildOutcome) {
    println!(
        "{} ({}): {} stage(s) run, {} up to date in {:.2}s",
        outcome.target,
        outcome.variant,
        outcome.executed.len(),
        outcome.skipped.len(),
        outcome.total_ms as f64 / 1000.0
    );
    let summary = outcome.status.summary();
    if outcome.status.succeeded {
        println!("  {}", summary.green());
    } else {
        println!("  {}", summary.red().bold());
    }
    if let Some(deployment) = &outcome.deployment {
        println!("  deploy: {}", deployment.script_path.display());
    }
}
