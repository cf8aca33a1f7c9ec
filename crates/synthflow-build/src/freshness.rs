//! Stage freshness: timestamp comparison backed by content stamps
//!
//! A stage is fresh when all of its outputs exist and none of its inputs is
//! newer than the oldest output. When timestamps say fresh, a recorded stamp
//! (hash of the command plus input contents) is compared as well, so an
//! edited invocation or a content change with a preserved timestamp still
//! triggers a rerun. Stages without a recorded stamp rely on timestamps alone;
//! a stage whose last run failed is stale until it succeeds.

use crate::error::{BuildError, BuildResult};
use crate::stage::Stage;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Stamp file location, relative to the workspace
pub const STAMP_FILE: &str = "output_files/.synthflow-stamps.json";

/// Recorded in place of a fingerprint when a stage fails; never a valid hash
const FAILED_STAMP: &str = "failed";

/// Why a stage has to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    /// Stage declares no outputs, so it always runs
    NoOutputs,
    /// An input does not exist yet
    MissingInput(PathBuf),
    /// An output does not exist
    MissingOutput(PathBuf),
    /// An input was modified after the oldest output
    NewerInput { input: PathBuf, output: PathBuf },
    /// Command or input contents differ from the recorded stamp
    StampMismatch,
    /// The previous run of this stage failed
    PreviousFailure,
    /// Caller asked for a full rebuild
    Forced,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoOutputs => write!(f, "declares no outputs"),
            Self::MissingInput(path) => write!(f, "input {} is missing", path.display()),
            Self::MissingOutput(path) => write!(f, "output {} is missing", path.display()),
            Self::NewerInput { input, output } => write!(
                f,
                "{} is newer than {}",
                input.display(),
                output.display()
            ),
            Self::StampMismatch => write!(f, "command or input contents changed"),
            Self::PreviousFailure => write!(f, "previous run failed"),
            Self::Forced => write!(f, "forced rebuild"),
        }
    }
}

/// Freshness of one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale(StaleReason),
}

impl Freshness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh)
    }
}

/// Compare declared inputs and outputs on disk
pub fn check_timestamps(stage: &Stage, workdir: &Path) -> BuildResult<Freshness> {
    if stage.outputs.is_empty() {
        return Ok(Freshness::Stale(StaleReason::NoOutputs));
    }

    let mut oldest: Option<(SystemTime, &PathBuf)> = None;
    for output in &stage.outputs {
        let Some(modified) = modified_time(&workdir.join(output))? else {
            return Ok(Freshness::Stale(StaleReason::MissingOutput(output.clone())));
        };
        if oldest.map_or(true, |(time, _)| modified < time) {
            oldest = Some((modified, output));
        }
    }

    let Some((oldest_time, oldest_output)) = oldest else {
        return Ok(Freshness::Stale(StaleReason::NoOutputs));
    };

    for input in &stage.inputs {
        match modified_time(&workdir.join(input))? {
            None => return Ok(Freshness::Stale(StaleReason::MissingInput(input.clone()))),
            Some(modified) if modified > oldest_time => {
                return Ok(Freshness::Stale(StaleReason::NewerInput {
                    input: input.clone(),
                    output: oldest_output.clone(),
                }))
            }
            Some(_) => {}
        }
    }

    Ok(Freshness::Fresh)
}

fn modified_time(path: &Path) -> BuildResult<Option<SystemTime>> {
    match fs::metadata(path) {
        Ok(metadata) => metadata
            .modified()
            .map(Some)
            .map_err(|e| BuildError::io(path, e)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(BuildError::io(path, e)),
    }
}

/// Hash of the stage command plus every input's path and contents
pub fn stage_fingerprint(stage: &Stage, workdir: &Path) -> BuildResult<String> {
    let mut hasher = Sha256::new();
    hasher.update(stage.command.fingerprint().as_bytes());

    for input in &stage.inputs {
        let path = workdir.join(input);
        hasher.update(b"\0");
        hasher.update(input.to_string_lossy().as_bytes());
        hasher.update(b"\0");
        if path.is_file() {
            let content = fs::read(&path).map_err(|e| BuildError::io(&path, e))?;
            hasher.update(&content);
        }
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StampFile {
    stages: BTreeMap<String, String>,
}

/// Persistent per-stage fingerprints
#[derive(Debug)]
pub struct StampStore {
    path: PathBuf,
    stamps: BTreeMap<String, String>,
    dirty: bool,
}

impl StampStore {
    /// Load the stamp file for a workspace. A missing or unreadable file
    /// yields an empty store.
    pub fn load(workdir: &Path) -> Self {
        let path = workdir.join(STAMP_FILE);
        let stamps = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<StampFile>(&content) {
                Ok(file) => file.stages,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt stamp file");
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };

        Self {
            path,
            stamps,
            dirty: false,
        }
    }

    /// Recorded fingerprint for a stage
    pub fn get(&self, stage: &str) -> Option<&str> {
        self.stamps.get(stage).map(String::as_str)
    }

    /// Record a stage's fingerprint
    pub fn record(&mut self, stage: &str, fingerprint: String) {
        if self.stamps.get(stage) != Some(&fingerprint) {
            self.stamps.insert(stage.to_string(), fingerprint);
            self.dirty = true;
        }
    }

    /// Mark a stage as failed so it reruns even if its outputs look current
    pub fn mark_failed(&mut self, stage: &str) {
        self.record(stage, FAILED_STAMP.to_string());
    }

    /// Write the store back if anything changed
    pub fn save(&mut self) -> BuildResult<()> {
        if !self.dirty {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }

        let file = StampFile {
            stages: self.stamps.clone(),
        };
        let json = serde_json::to_string_pretty(&file).map_err(|e| BuildError::Stamp {
            path: self.path.clone(),
            error: e,
        })?;
        fs::write(&self.path, json).map_err(|e| BuildError::io(&self.path, e))?;
        self.dirty = false;
        Ok(())
    }

    /// Full freshness decision for a stage
    pub fn freshness(&self, stage: &Stage, workdir: &Path) -> BuildResult<Freshness> {
        let by_time = check_timestamps(stage, workdir)?;
        if !by_time.is_fresh() {
            return Ok(by_time);
        }

        match self.get(&stage.name) {
            Some(FAILED_STAMP) => Ok(Freshness::Stale(StaleReason::PreviousFailure)),
            Some(recorded) if recorded != stage_fingerprint(stage, workdir)? => {
                Ok(Freshness::Stale(StaleReason::StampMismatch))
            }
            _ => Ok(Freshness::Fresh),
        }
    }
}
