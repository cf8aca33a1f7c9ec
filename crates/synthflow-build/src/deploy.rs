//! Deployment script emission
use crate::error::{BuildError, BuildResult};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Executable script that programs a device with a bitstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentScript {
    pub script_path: PathBuf,
    pub bitstream_path: PathBuf,
    pub flash_tool: String,
}

impl DeploymentScript {
    pub fn new(
        script_path: impl Into<PathBuf>,
        bitstream_path: impl Into<PathBuf>,
        flash_tool: impl Into<String>,
    ) -> Self {
        Self {
            script_path: script_path.into(),
            bitstream_path: bitstream_path.into(),
            flash_tool: flash_tool.into(),
        }
    }

    /// Script contents
    pub fn render(&self) -> String {
        format!(
            "#!/bin/sh\n{} --bitstream={}\n",
            self.flash_tool,
            self.bitstream_path.display()
        )
    }

    /// Write the script and make it executable.
    /// Rewriting with identical contents leaves the file untouched.
    pub fn write(&self) -> BuildResult<()> {
        let contents = self.render();

        if let Some(parent) = self.script_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
            }
        }

        let unchanged = fs::read_to_string(&self.script_path)
            .map(|existing| existing == contents)
            .unwrap_or(false);
        if !unchanged {
            fs::write(&self.script_path, contents)
                .map_err(|e| BuildError::io(&self.script_path, e))?;
        }

        set_executable(&self.script_path)
    }
}

#[cfg(unix)]
fn set_executable(path: &Path) -> BuildResult<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = fs::metadata(path)
        .map_err(|e| BuildError::io(path, e))?
        .permissions();
    if perms.mode() & 0o777 != 0o755 {
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).map_err(|e| BuildError::io(path, e))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> BuildResult<()> {
    Ok(())
}
