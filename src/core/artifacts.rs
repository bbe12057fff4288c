//! core::artifacts
//!
//! Layout of and access to `<cwd>/.quick-gate/`, the directory every
//! subcommand reads its input from and writes its output artifacts to.
//!
//! # Locking
//!
//! Only one `quick-gate` invocation may be mutating a given workspace's
//! artifact directory at a time (the repair loop snapshots and restores
//! the working tree, which is not safe to interleave). [`ArtifactLock`]
//! guards this with an OS-level exclusive file lock, released on drop.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use thiserror::Error;

pub const ARTIFACT_DIR: &str = ".quick-gate";
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("could not create artifact directory '{path}': {source}")]
    CreateDirFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not write artifact '{path}': {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("could not read artifact '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("artifact '{path}' failed schema validation: {message}")]
    ValidationFailed { path: PathBuf, message: String },

    #[error("could not serialize artifact '{path}': {source}")]
    SerializeFailed {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("could not parse artifact '{path}': {source}")]
    ParseFailed {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("timed out waiting for artifact lock at '{path}'")]
    LockTimeout { path: PathBuf },

    #[error("lock error at '{path}': {message}")]
    LockError { path: PathBuf, message: String },
}

/// Path helpers rooted at `<cwd>/.quick-gate/`.
#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    root: PathBuf,
}

impl ArtifactPaths {
    pub fn new(cwd: &Path) -> Self {
        ArtifactPaths {
            root: cwd.join(ARTIFACT_DIR),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ensure_exists(&self) -> Result<(), ArtifactError> {
        fs::create_dir_all(&self.root).map_err(|e| ArtifactError::CreateDirFailed {
            path: self.root.clone(),
            source: e,
        })
    }

    pub fn failures_json(&self) -> PathBuf {
        self.root.join("failures.json")
    }

    pub fn run_metadata_json(&self) -> PathBuf {
        self.root.join("run-metadata.json")
    }

    pub fn agent_brief_json(&self) -> PathBuf {
        self.root.join("agent-brief.json")
    }

    pub fn agent_brief_md(&self) -> PathBuf {
        self.root.join("agent-brief.md")
    }

    pub fn repair_report_json(&self) -> PathBuf {
        self.root.join("repair-report.json")
    }

    pub fn escalation_json(&self) -> PathBuf {
        self.root.join("escalation.json")
    }

    pub fn backup_dir(&self, attempt: u32) -> PathBuf {
        self.root.join(format!("backup-attempt-{attempt}"))
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join("lock")
    }
}

/// Serialize `value` as pretty JSON and write it to `path`, failing the
/// write rather than leaving a malformed artifact on disk.
pub fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), ArtifactError> {
    let contents =
        serde_json::to_string_pretty(value).map_err(|e| ArtifactError::SerializeFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| ArtifactError::CreateDirFailed {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    fs::write(path, contents).map_err(|e| ArtifactError::WriteFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Validate and write `failures.json`. Schema-validation failures are
/// fatal - the artifact is never written if the invariants from the
/// documented contract don't hold.
pub fn write_failures_report(
    path: &Path,
    report: &crate::core::types::FailuresReport,
) -> Result<(), ArtifactError> {
    crate::core::types::validate_failures_report(report).map_err(|message| {
        ArtifactError::ValidationFailed {
            path: path.to_path_buf(),
            message,
        }
    })?;
    write_json(path, report)
}

/// Validate and write `agent-brief.json`. See [`write_failures_report`].
pub fn write_agent_brief(
    path: &Path,
    brief: &crate::core::types::AgentBrief,
) -> Result<(), ArtifactError> {
    crate::core::types::validate_agent_brief(brief).map_err(|message| {
        ArtifactError::ValidationFailed {
            path: path.to_path_buf(),
            message,
        }
    })?;
    write_json(path, brief)
}

/// Read and parse `path` as JSON.
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let contents = fs::read_to_string(path).map_err(|e| ArtifactError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::from_str(&contents).map_err(|e| ArtifactError::ParseFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Exclusive lock over a workspace's `.quick-gate/` directory. Released
/// automatically on drop (RAII).
#[derive(Debug)]
pub struct ArtifactLock {
    path: PathBuf,
    file: Option<File>,
}

impl ArtifactLock {
    /// Block (polling every 100ms) until the lock is acquired or `timeout`
    /// elapses.
    pub fn acquire(paths: &ArtifactPaths, timeout: Duration) -> Result<Self, ArtifactError> {
        paths.ensure_exists()?;
        let path = paths.lock_path();
        let deadline = Instant::now() + timeout;

        loop {
            match Self::try_acquire_internal(&path) {
                Ok(lock) => return Ok(lock),
                Err(ArtifactError::LockError { .. }) => {
                    if Instant::now() >= deadline {
                        return Err(ArtifactError::LockTimeout { path });
                    }
                    thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn try_acquire_internal(path: &Path) -> Result<Self, ArtifactError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| ArtifactError::LockError {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(ArtifactLock {
                path: path.to_path_buf(),
                file: Some(file),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(ArtifactError::LockError {
                path: path.to_path_buf(),
                message: "would block".to_string(),
            }),
            Err(e) => Err(ArtifactError::LockError {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ArtifactLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{FailuresReport, Mode};
    use tempfile::TempDir;

    #[test]
    fn paths_are_rooted_under_quick_gate_dir() {
        let temp = TempDir::new().unwrap();
        let paths = ArtifactPaths::new(temp.path());
        assert_eq!(paths.root(), temp.path().join(".quick-gate"));
        assert!(paths.failures_json().ends_with("failures.json"));
        assert!(paths.backup_dir(2).ends_with("backup-attempt-2"));
    }

    #[test]
    fn write_then_read_json_roundtrips() {
        let temp = TempDir::new().unwrap();
        let paths = ArtifactPaths::new(temp.path());
        paths.ensure_exists().unwrap();

        let report = FailuresReport::new(
            "r1".into(),
            Mode::Canary,
            "2026-01-01T00:00:00Z".into(),
            None,
            None,
            vec![],
            vec![],
            vec![],
        );
        write_json(&paths.failures_json(), &report).unwrap();

        let loaded: FailuresReport = read_json(&paths.failures_json()).unwrap();
        assert_eq!(loaded.run_id, "r1");
        assert!(loaded.is_pass());
    }

    #[test]
    fn write_failures_report_rejects_pass_status_with_findings() {
        let temp = TempDir::new().unwrap();
        let paths = ArtifactPaths::new(temp.path());
        paths.ensure_exists().unwrap();

        let mut report = FailuresReport::new(
            "r1".into(),
            Mode::Canary,
            "2026-01-01T00:00:00Z".into(),
            None,
            None,
            vec![],
            vec![],
            vec![crate::core::types::Finding::new(
                "f1",
                crate::core::types::Gate::Lint,
                "bad",
            )],
        );
        // Corrupt the derived invariant directly to exercise the guard.
        report.status = crate::core::types::GateStatus::Pass;

        let err = write_failures_report(&paths.failures_json(), &report).unwrap_err();
        assert!(matches!(err, ArtifactError::ValidationFailed { .. }));
        assert!(!paths.failures_json().exists());
    }

    #[test]
    fn lock_prevents_concurrent_acquire() {
        let temp = TempDir::new().unwrap();
        let paths = ArtifactPaths::new(temp.path());

        let first = ArtifactLock::acquire(&paths, Duration::from_millis(200)).unwrap();
        let second = ArtifactLock::acquire(&paths, Duration::from_millis(200));
        assert!(second.is_err());
        drop(first);

        assert!(ArtifactLock::acquire(&paths, Duration::from_millis(200)).is_ok());
    }
}
