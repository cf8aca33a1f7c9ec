//! Timing report validation
use crate::error::{BuildError, BuildResult};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Which stage's report decides the build status, and how to read it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationSpec {
    /// Stage that produces the report
    pub stage: String,
    /// Report path, relative to the workspace
    pub report: PathBuf,
    /// Text that marks a passing report
    pub success: String,
    /// Text that marks a failing report
    pub failure: String,
}

impl ValidationSpec {
    pub fn new(
        stage: impl Into<String>,
        report: impl Into<PathBuf>,
        success: impl Into<String>,
        failure: impl Into<String>,
    ) -> Self {
        Self {
            stage: stage.into(),
            report: report.into(),
            success: success.into(),
            failure: failure.into(),
        }
    }
}

/// How a report was judged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Success,
    Failure,
    /// Neither marker was present; treated as a failure
    Ambiguous,
}

/// Result of reading a timing report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildStatus {
    pub report_path: PathBuf,
    pub succeeded: bool,
    pub message: String,
    pub verdict: Verdict,
}

impl BuildStatus {
    /// One-line human summary
    pub fn summary(&self) -> String {
        let label = match self.verdict {
            Verdict::Success => "PASSED",
            Verdict::Failure => "FAILED",
            Verdict::Ambiguous => "UNKNOWN",
        };
        format!("timing {}: {}", label, self.message)
    }
}

/// Judge report text.
///
/// The success marker wins when both are present; the toolchain prints
/// per-corner failures before its final success line. The matched line is
/// reported verbatim, indentation included.
pub fn classify(text: &str, report_path: &Path, success: &str, failure: &str) -> BuildStatus {
    let first_line_with = |marker: &str| {
        text.lines()
            .find(|line| line.contains(marker))
            .map(str::to_string)
    };

    let (verdict, message) = if let Some(line) = first_line_with(success) {
        (Verdict::Success, line)
    } else if let Some(line) = first_line_with(failure) {
        (Verdict::Failure, line)
    } else {
        (
            Verdict::Ambiguous,
            format!(
                "timing pattern not found (expected '{}' or '{}')",
                success, failure
            ),
        )
    };

    BuildStatus {
        report_path: report_path.to_path_buf(),
        succeeded: verdict == Verdict::Success,
        message,
        verdict,
    }
}

/// Read a timing report and judge it
pub fn validate_report(report_path: &Path, success: &str, failure: &str) -> BuildResult<BuildStatus> {
    if !report_path.is_file() {
        return Err(BuildError::missing_file(report_path, "timing report"));
    }
    let bytes = fs::read(report_path).map_err(|e| BuildError::io(report_path, e))?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(classify(&text, report_path, success, failure))
}
