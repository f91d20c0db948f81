//! Installer/resolver collaborator

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::tool::{run_checked, ToolError};

use super::LOCK_FILE;

/// Default installer executable
pub const DEFAULT_INSTALLER: &str = "poetry";

/// Re-locks and synchronizes a project after its manifest changed
pub trait Installer {
    /// Refresh the lock file without upgrading unrelated packages
    fn lock(&self, project_dir: &Path) -> Result<(), ToolError>;

    /// Make the environment match the lock file
    fn sync(&self, project_dir: &Path) -> Result<(), ToolError>;

    /// Whether the project has a lock file to update
    fn is_locked(&self, project_dir: &Path) -> bool {
        project_dir.join(LOCK_FILE).is_file()
    }
}

/// Drives `poetry`
#[derive(Debug, Clone)]
pub struct PoetryInstaller {
    program: PathBuf,
    quiet: bool,
}

impl Default for PoetryInstaller {
    fn default() -> Self {
        Self::new(DEFAULT_INSTALLER)
    }
}

impl PoetryInstaller {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            quiet: true,
        }
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    fn command(&self, project_dir: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command.current_dir(project_dir);
        command
    }
}

impl Installer for PoetryInstaller {
    fn lock(&self, project_dir: &Path) -> Result<(), ToolError> {
        let mut command = self.command(project_dir);
        command.args(["lock", "--no-update"]);
        run_checked(&mut command, self.quiet)
    }

    fn sync(&self, project_dir: &Path) -> Result<(), ToolError> {
        let mut command = self.command(project_dir);
        command.args(["install", "--sync", "--all-extras", "--only", "main"]);
        run_checked(&mut command, self.quiet)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_is_locked() {
        let dir = TempDir::new().unwrap();
        let installer = PoetryInstaller::default();
        assert!(!installer.is_locked(dir.path()));
        fs::write(dir.path().join(LOCK_FILE), "").unwrap();
        assert!(installer.is_locked(dir.path()));
    }

    #[test]
    fn test_runs_in_project_dir() {
        let dir = TempDir::new().unwrap();
        // `true` accepts any arguments
        assert!(PoetryInstaller::new("true").lock(dir.path()).is_ok());
        assert!(PoetryInstaller::new("true").sync(dir.path()).is_ok());
        assert!(matches!(
            PoetryInstaller::new("false").lock(dir.path()),
            Err(ToolError::ExternalToolFailed { .. })
        ));
    }
}
