use anyhow::{Context, Result};
use colored::*;
use std::path::Path;
use std::process::ExitCode;
use synthflow_build::{validate_report, PlatformVariant};

/// Judge a timing report. The default success marker is the shorter
/// phrasing, which both platforms' analyzers print.
pub fn run(report: &Path, success: Option<String>, failure: Option<String>, json: bool) -> Result<ExitCode> {
    let success = success.unwrap_or_else(|| PlatformVariant::Bdx.success_marker().to_string());
    let failure = failure.unwrap_or_else(|| PlatformVariant::Bdx.failure_marker().to_string());

    let status = validate_report(report, &success, &failure)
        .with_context(|| format!("Failed to validate {}", report.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else if status.succeeded {
        println!("{}", status.summary().green());
    } else {
        println!("{}", status.summary().red());
    }

    Ok(if status.succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
