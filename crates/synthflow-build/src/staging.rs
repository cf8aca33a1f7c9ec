//! Workspace staging
//!
//! Makes externally supplied files visible inside the workspace by linking
//! them under their file name. The links run as an ordinary pipeline stage;
//! every write is preceded by an existence check, so staging an already
//! staged workspace changes nothing.

use crate::error::{BuildError, BuildResult};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs as unix_fs;

/// A file to make visible in the workspace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct StagedLink {
    /// File being linked to
    pub source: PathBuf,
    /// Link path, relative to the workspace
    pub dest: PathBuf,
}

impl StagedLink {
    /// Link `source` into the workspace under its own file name
    pub fn by_file_name(source: impl Into<PathBuf>) -> Option<Self> {
        let source = source.into();
        let dest = PathBuf::from(source.file_name()?);
        Some(Self { source, dest })
    }
}

/// Resolve the vendor release root from the environment
pub fn vendor_root(env_name: &str) -> BuildResult<PathBuf> {
    match std::env::var_os(env_name) {
        Some(value) if !value.is_empty() => Ok(PathBuf::from(value)),
        _ => Err(BuildError::missing_env(env_name, "vendor release root")),
    }
}

/// Links for required vendor files; every one must exist
pub fn vendor_links(root: &Path, files: &[PathBuf]) -> BuildResult<Vec<StagedLink>> {
    files
        .iter()
        .map(|file| {
            let source = root.join(file);
            if !source.is_file() {
                return Err(BuildError::missing_file(source, "vendor release file"));
            }
            StagedLink::by_file_name(&source)
                .ok_or_else(|| BuildError::missing_file(source.clone(), "vendor release file"))
        })
        .collect()
}

/// Links for optional project files; absent ones are left out
pub fn local_links(project_root: &Path, files: &[PathBuf]) -> Vec<StagedLink> {
    files
        .iter()
        .map(|file| project_root.join(file))
        .filter(|source| {
            let present = source.exists();
            if !present {
                tracing::debug!(file = %source.display(), "optional file not present, not staging");
            }
            present
        })
        .filter_map(StagedLink::by_file_name)
        .collect()
}

/// Create each link unless something already occupies its path. Returns
/// the workspace-relative paths that were created.
pub fn stage_links(workdir: &Path, links: &[StagedLink]) -> BuildResult<Vec<PathBuf>> {
    let mut created = Vec::new();

    for link in links {
        let dest = workdir.join(&link.dest);

        // symlink_metadata so that a dangling link still counts as present
        if fs::symlink_metadata(&dest).is_ok() {
            tracing::debug!(path = %dest.display(), "already staged");
            continue;
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
        }

        let source = fs::canonicalize(&link.source).unwrap_or_else(|_| link.source.clone());
        link_file(&source, &dest)?;
        tracing::debug!(source = %source.display(), path = %dest.display(), "staged");
        created.push(link.dest.clone());
    }

    Ok(created)
}

#[cfg(unix)]
fn link_file(source: &Path, dest: &Path) -> BuildResult<()> {
    unix_fs::symlink(source, dest).map_err(|e| BuildError::io(dest, e))
}

#[cfg(not(unix))]
fn link_file(source: &Path, dest: &Path) -> BuildResult<()> {
    fs::copy(source, dest)
        .map(|_| ())
        .map_err(|e| BuildError::io(dest, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_vendor_links_require_files() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("rom.mif"), "").unwrap();

        let links = vendor_links(temp.path(), &[PathBuf::from("rom.mif")]).unwrap();
        assert_eq!(links[0].dest, PathBuf::from("rom.mif"));

        let err = vendor_links(temp.path(), &[PathBuf::from("lib/missing.mif")]).unwrap_err();
        match err {
            BuildError::MissingRequiredFile { path, .. } => {
                assert!(path.ends_with("lib/missing.mif"))
            }
            other => panic!("expected MissingRequiredFile, got {}", other),
        }
    }

    #[test]
    fn test_local_links_skip_absent() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("sys_cfg_pkg.svh"), "").unwrap();

        let links = local_links(
            temp.path(),
            &[PathBuf::from("sys_cfg_pkg.svh"), PathBuf::from("absent.svh")],
        );
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].dest, PathBuf::from("sys_cfg_pkg.svh"));
    }

    #[test]
    fn test_stage_links_idempotent() {
        let project = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();
        fs::write(project.path().join("a.mif"), "data").unwrap();
        let links = vec![StagedLink::by_file_name(project.path().join("a.mif")).unwrap()];

        let first = stage_links(workspace.path(), &links).unwrap();
        assert_eq!(first, vec![PathBuf::from("a.mif")]);
        assert_eq!(
            fs::read_to_string(workspace.path().join("a.mif")).unwrap(),
            "data"
        );

        let second = stage_links(workspace.path(), &links).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn test_existing_file_is_not_replaced() {
        let project = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();
        fs::write(project.path().join("cfg.svh"), "upstream").unwrap();
        fs::write(workspace.path().join("cfg.svh"), "local edit").unwrap();

        let links = vec![StagedLink::by_file_name(project.path().join("cfg.svh")).unwrap()];
        let created = stage_links(workspace.path(), &links).unwrap();
        assert!(created.is_empty());
        assert_eq!(
            fs::read_to_string(workspace.path().join("cfg.svh")).unwrap(),
            "local edit"
        );
    }

    #[test]
    fn test_vendor_root_missing_env() {
        let err = vendor_root("SYNTHFLOW_TEST_SURELY_UNSET_ROOT").unwrap_err();
        assert!(matches!(err, BuildError::MissingEnvironment { .. }));
    }
}
