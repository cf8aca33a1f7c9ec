/// Build pipeline error types
use std::path::PathBuf;
use thiserror::Error;

pub type BuildResult<T> = Result<T, BuildError>;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Missing required file {path}: {purpose}")]
    MissingRequiredFile { path: PathBuf, purpose: String },

    #[error("Missing environment variable {name}: {purpose}")]
    MissingEnvironment { name: String, purpose: String },

    #[error("Stage '{stage}' failed with {}; see {}", exit_description(.exit_code), .log.display())]
    StageFailed {
        stage: String,
        exit_code: Option<i32>,
        log: PathBuf,
    },

    #[error("Failed to launch '{program}' for stage '{stage}': {error}")]
    StageSpawn {
        stage: String,
        program: String,
        error: std::io::Error,
    },

    #[error("Circular dependency detected: {0}")]
    CircularDependency(String),

    #[error("Duplicate stage name: {0}")]
    DuplicateStage(String),

    #[error("Output {path} is declared by both '{first}' and '{second}'")]
    DuplicateOutput {
        path: PathBuf,
        first: String,
        second: String,
    },

    #[error("Input {input} of stage '{stage}' is neither a catalog artifact nor produced by an earlier stage")]
    UnmaterializedInput { stage: String, input: PathBuf },

    #[error("Stage '{stage}' completed but did not produce {path}")]
    MissingOutput { stage: String, path: PathBuf },

    #[error("Invalid stage graph: {0}")]
    InvalidGraph(String),

    #[error("Stamp file error at {path}: {error}")]
    Stamp {
        path: PathBuf,
        error: serde_json::Error,
    },

    #[error("I/O error at {path}: {error}")]
    IoError {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] synthflow_config::ConfigError),
}

fn exit_description(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {}", code),
        None => "no exit status (terminated by signal)".to_string(),
    }
}

impl BuildError {
    /// Create a missing file error
    pub fn missing_file(path: impl Into<PathBuf>, purpose: impl Into<String>) -> Self {
        Self::MissingRequiredFile {
            path: path.into(),
            purpose: purpose.into(),
        }
    }

    /// Create a missing environment error
    pub fn missing_env(name: impl Into<String>, purpose: impl Into<String>) -> Self {
        Self::MissingEnvironment {
            name: name.into(),
            purpose: purpose.into(),
        }
    }

    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::IoError {
            path: path.into(),
            error,
        }
    }

    /// Whether this error happened before any external process was launched
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            Self::MissingRequiredFile { .. } | Self::MissingEnvironment { .. } | Self::Config(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_failed_message_names_stage_and_log() {
        let err = BuildError::StageFailed {
            stage: "fit".to_string(),
            exit_code: Some(3),
            log: PathBuf::from("output_files/logs/fit.log"),
        };
        let msg = err.to_string();
        assert!(msg.contains("'fit'"));
        assert!(msg.contains("exit status 3"));
        assert!(msg.contains("output_files/logs/fit.log"));
    }

    #[test]
    fn test_signal_termination_message() {
        let err = BuildError::StageFailed {
            stage: "map".to_string(),
            exit_code: None,
            log: PathBuf::from("map.log"),
        };
        assert!(err.to_string().contains("terminated by signal"));
    }

    #[test]
    fn test_preflight_classification() {
        assert!(BuildError::missing_file("a.mif", "ROM image").is_preflight());
        assert!(BuildError::missing_env("AAL_QA_HW", "vendor root").is_preflight());
        assert!(!BuildError::InvalidGraph("x".to_string()).is_preflight());
    }
}
