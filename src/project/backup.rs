//! Backup scope guard for project settings files

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error};

use super::{ProjectError, LOCK_FILE, PYPROJECT_FILE};

/// Copies `pyproject.toml` and `poetry.lock` to `.bak` files and puts them
/// back when dropped.
///
/// Call [`SettingsBackup::commit`] to keep the current files instead.
#[derive(Debug)]
pub struct SettingsBackup {
    /// (original, backup) pairs
    files: Vec<(PathBuf, PathBuf)>,
    active: bool,
}

impl SettingsBackup {
    /// Back up whichever settings files exist in `project_dir`
    pub fn acquire(project_dir: &Path) -> Result<Self, ProjectError> {
        let mut files = Vec::new();
        for name in [PYPROJECT_FILE, LOCK_FILE] {
            let original = project_dir.join(name);
            if !original.is_file() {
                continue;
            }
            let backup = original.with_extension("bak");
            fs::copy(&original, &backup).map_err(|source| ProjectError::Io {
                path: backup.clone(),
                source,
            })?;
            debug!(file = %original.display(), "backed up");
            files.push((original, backup));
        }
        Ok(Self {
            files,
            active: true,
        })
    }

    /// Files that were backed up
    pub fn originals(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|(original, _)| original.as_path())
    }

    /// Restore the originals now
    pub fn restore(mut self) -> Result<(), ProjectError> {
        self.active = false;
        restore_files(&self.files)
    }

    /// Keep the current files and discard the backups
    pub fn commit(mut self) -> Result<(), ProjectError> {
        self.active = false;
        for (_, backup) in &self.files {
            fs::remove_file(backup).map_err(|source| ProjectError::Io {
                path: backup.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

fn restore_files(files: &[(PathBuf, PathBuf)]) -> Result<(), ProjectError> {
    for (original, backup) in files {
        fs::rename(backup, original).map_err(|source| ProjectError::Io {
            path: original.clone(),
            source,
        })?;
        debug!(file = %original.display(), "restored");
    }
    Ok(())
}

impl Drop for SettingsBackup {
    fn drop(&mut self) {
        if self.active {
            if let Err(e) = restore_files(&self.files) {
                error!("failed to restore project settings: {}", e);
            }
        }
    }
}
