//! engine::snapshot
//!
//! Per-attempt workspace backup and restore. A bad repair attempt is
//! reverted by overwriting the working tree from a prior recursive copy;
//! there is no mirroring crate in this dependency stack, so the documented
//! "preferred incremental primitive with a recursive-copy fallback" collapses
//! to the recursive copy directly, since there is no such primitive here.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::artifacts::ArtifactPaths;

/// Directories excluded from both capture and restore: version-control
/// metadata, third-party packages, framework build output, and the tool's
/// own artifact directory.
const EXCLUDED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "dist",
    "build",
    ".next",
    "out",
    "coverage",
    ".lighthouseci",
    crate::core::artifacts::ARTIFACT_DIR,
];

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to create backup directory '{path}': {source}")]
    CreateDirFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to read directory '{path}': {source}")]
    ReadDirFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to copy '{from}' to '{to}': {source}")]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to remove '{path}' while restoring: {source}")]
    RemoveFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A captured copy of the working tree for one repair attempt.
#[derive(Debug)]
pub struct WorkspaceSnapshot {
    pub attempt: u32,
    backup_dir: PathBuf,
}

impl WorkspaceSnapshot {
    /// Copy `cwd` into `<artifact-dir>/backup-attempt-<attempt>/`, skipping
    /// [`EXCLUDED_DIRS`].
    pub fn capture(
        cwd: &Path,
        paths: &ArtifactPaths,
        attempt: u32,
    ) -> Result<Self, SnapshotError> {
        let backup_dir = paths.backup_dir(attempt);
        fs::create_dir_all(&backup_dir).map_err(|e| SnapshotError::CreateDirFailed {
            path: backup_dir.clone(),
            source: e,
        })?;

        copy_dir_filtered(cwd, &backup_dir)?;

        Ok(WorkspaceSnapshot {
            attempt,
            backup_dir,
        })
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Overwrite `cwd` from this snapshot, leaving [`EXCLUDED_DIRS`] inside
    /// `cwd` untouched.
    pub fn restore(&self, cwd: &Path) -> Result<(), SnapshotError> {
        remove_tree_filtered(cwd)?;
        copy_dir_filtered(&self.backup_dir, cwd)
    }
}

/// Recursively copy `src` into `dst`, skipping entries named in
/// [`EXCLUDED_DIRS`] at every depth.
fn copy_dir_filtered(src: &Path, dst: &Path) -> Result<(), SnapshotError> {
    let entries = fs::read_dir(src).map_err(|e| SnapshotError::ReadDirFailed {
        path: src.to_path_buf(),
        source: e,
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| SnapshotError::ReadDirFailed {
            path: src.to_path_buf(),
            source: e,
        })?;
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if EXCLUDED_DIRS.contains(&name_str.as_ref()) {
            continue;
        }

        let from = entry.path();
        let to = dst.join(&name);
        let file_type = entry.file_type().map_err(|e| SnapshotError::ReadDirFailed {
            path: from.clone(),
            source: e,
        })?;

        if file_type.is_dir() {
            fs::create_dir_all(&to).map_err(|e| SnapshotError::CreateDirFailed {
                path: to.clone(),
                source: e,
            })?;
            copy_dir_filtered(&from, &to)?;
        } else if file_type.is_file() {
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent).map_err(|e| SnapshotError::CreateDirFailed {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
            }
            fs::copy(&from, &to).map_err(|e| SnapshotError::CopyFailed {
                from: from.clone(),
                to: to.clone(),
                source: e,
            })?;
        }
        // Symlinks are neither followed nor copied; the repair loop only
        // ever mutates ordinary source files.
    }

    Ok(())
}

/// Remove every entry directly under `root` except [`EXCLUDED_DIRS`], so a
/// subsequent `copy_dir_filtered` call fully replaces the tracked content
/// without disturbing vendor/build/artifact directories.
fn remove_tree_filtered(root: &Path) -> Result<(), SnapshotError> {
    let entries = fs::read_dir(root).map_err(|e| SnapshotError::ReadDirFailed {
        path: root.to_path_buf(),
        source: e,
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| SnapshotError::ReadDirFailed {
            path: root.to_path_buf(),
            source: e,
        })?;
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        if EXCLUDED_DIRS.contains(&name_str.as_ref()) {
            continue;
        }

        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| SnapshotError::ReadDirFailed {
            path: path.clone(),
            source: e,
        })?;

        let result = if file_type.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        result.map_err(|e| SnapshotError::RemoveFailed {
            path: path.clone(),
            source: e,
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(path: &Path, contents: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn capture_then_restore_reverts_a_mutation() {
        let cwd = TempDir::new().unwrap();
        write(&cwd.path().join("src/a.ts"), "original");
        write(&cwd.path().join("node_modules/pkg/index.js"), "vendor");

        let paths = ArtifactPaths::new(cwd.path());
        let snapshot = WorkspaceSnapshot::capture(cwd.path(), &paths, 1).unwrap();

        write(&cwd.path().join("src/a.ts"), "mutated by a bad patch");
        fs::remove_file(cwd.path().join("node_modules/pkg/index.js")).unwrap();

        snapshot.restore(cwd.path()).unwrap();

        assert_eq!(
            fs::read_to_string(cwd.path().join("src/a.ts")).unwrap(),
            "original"
        );
        assert!(!cwd.path().join("node_modules/pkg/index.js").exists());
    }

    #[test]
    fn excluded_directories_are_not_captured() {
        let cwd = TempDir::new().unwrap();
        write(&cwd.path().join("src/a.ts"), "x");
        write(&cwd.path().join(".git/HEAD"), "ref: refs/heads/main");

        let paths = ArtifactPaths::new(cwd.path());
        let snapshot = WorkspaceSnapshot::capture(cwd.path(), &paths, 1).unwrap();

        assert!(!snapshot.backup_dir().join(".git").exists());
        assert!(snapshot.backup_dir().join("src/a.ts").exists());
    }

    #[test]
    fn restore_removes_files_added_after_capture() {
        let cwd = TempDir::new().unwrap();
        write(&cwd.path().join("src/a.ts"), "original");

        let paths = ArtifactPaths::new(cwd.path());
        let snapshot = WorkspaceSnapshot::capture(cwd.path(), &paths, 1).unwrap();

        write(&cwd.path().join("src/b.ts"), "added by a patch");
        snapshot.restore(cwd.path()).unwrap();

        assert!(!cwd.path().join("src/b.ts").exists());
    }
}
