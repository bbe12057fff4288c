//! engine::vcs
//!
//! The version-control collaborator: repo/branch
//! metadata for `FailuresReport`, and the numstat-style per-file line-delta
//! sampling the repair loop uses to measure how much an attempt touched.
//!
//! Shelled rather than linked - `git` is invoked through
//! [`crate::core::command`], the single doorway for process spawning, the
//! same as every gate command and model call. A repo with no `.git` (or no
//! `git` binary on PATH) degrades gracefully: metadata fields are `None`
//! and diff maps are empty rather than the call failing outright.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::core::command;

const VCS_TIMEOUT: Duration = Duration::from_secs(30);

/// Repository identity, best-effort.
#[derive(Debug, Clone, Default)]
pub struct RepoMetadata {
    pub repo: Option<String>,
    pub branch: Option<String>,
}

/// Best-effort repo/branch metadata for a [`crate::core::types::FailuresReport`].
/// Never errors - any git failure just yields `None` fields.
pub fn repo_metadata(cwd: &Path) -> RepoMetadata {
    if !is_git_repo(cwd) {
        return RepoMetadata::default();
    }

    let branch = run_git(cwd, "rev-parse --abbrev-ref HEAD")
        .filter(|s| !s.is_empty() && s != "HEAD");

    let repo = run_git(cwd, "remote get-url origin")
        .map(|url| repo_name_from_url(&url))
        .or_else(|| {
            cwd.file_name()
                .map(|n| n.to_string_lossy().into_owned())
        });

    RepoMetadata { repo, branch }
}

fn is_git_repo(cwd: &Path) -> bool {
    cwd.join(".git").exists()
}

fn run_git(cwd: &Path, args: &str) -> Option<String> {
    let outcome = command::run(&format!("git {args}"), cwd, VCS_TIMEOUT).ok()?;
    if !outcome.succeeded() {
        return None;
    }
    let trimmed = outcome.stdout.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn repo_name_from_url(url: &str) -> String {
    let without_suffix = url.strip_suffix(".git").unwrap_or(url);
    without_suffix
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(without_suffix)
        .to_string()
}

/// Per-file added+removed line counts versus the working tree's committed
/// baseline (`git diff --numstat HEAD`), excluding `exclude_dirs` at the
/// top path component. Returns an empty map if the repo is absent, has no
/// commits yet, or the command fails - diffing degrades, it never errors
/// the caller.
pub fn diff_numstat(cwd: &Path, exclude_dirs: &[&str]) -> BTreeMap<String, u64> {
    if !is_git_repo(cwd) {
        return BTreeMap::new();
    }

    let mut map = BTreeMap::new();
    for source in ["diff --numstat HEAD", "diff --numstat --cached"] {
        if let Some(output) = run_git(cwd, source) {
            merge_numstat(&mut map, &output, exclude_dirs);
        }
    }

    // Untracked files count as a full add of their current line count -
    // a patch that creates a new file should still count against budget.
    if let Some(output) = run_git(cwd, "ls-files --others --exclude-standard") {
        for path in output.lines() {
            if is_excluded(path, exclude_dirs) {
                continue;
            }
            let full_path = cwd.join(path);
            if let Ok(contents) = std::fs::read_to_string(&full_path) {
                let lines = contents.lines().count() as u64;
                *map.entry(path.to_string()).or_insert(0) += lines;
            }
        }
    }

    map
}

fn merge_numstat(map: &mut BTreeMap<String, u64>, numstat_output: &str, exclude_dirs: &[&str]) {
    for line in numstat_output.lines() {
        let mut parts = line.splitn(3, '\t');
        let added = parts.next().unwrap_or("0");
        let removed = parts.next().unwrap_or("0");
        let Some(path) = parts.next() else { continue };

        if is_excluded(path, exclude_dirs) {
            continue;
        }

        // Binary files report `-` instead of a count; treat as zero delta
        // rather than failing the whole sample.
        let added: u64 = added.parse().unwrap_or(0);
        let removed: u64 = removed.parse().unwrap_or(0);
        *map.entry(path.to_string()).or_insert(0) += added + removed;
    }
}

fn is_excluded(path: &str, exclude_dirs: &[&str]) -> bool {
    let first_component = path.split('/').next().unwrap_or(path);
    exclude_dirs.contains(&first_component)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::TempDir;

    fn init_repo(dir: &Path) {
        Command::new("git").arg("init").arg("-q").current_dir(dir).status().unwrap();
        Command::new("git")
            .args(["config", "user.email", "test@example.com"])
            .current_dir(dir)
            .status()
            .unwrap();
        Command::new("git")
            .args(["config", "user.name", "test"])
            .current_dir(dir)
            .status()
            .unwrap();
    }

    #[test]
    fn no_git_repo_yields_empty_metadata() {
        let temp = TempDir::new().unwrap();
        let meta = repo_metadata(temp.path());
        assert!(meta.repo.is_none());
        assert!(meta.branch.is_none());
    }

    #[test]
    fn no_git_repo_yields_empty_diff_map() {
        let temp = TempDir::new().unwrap();
        let map = diff_numstat(temp.path(), &[]);
        assert!(map.is_empty());
    }

    #[test]
    fn repo_name_from_url_strips_git_suffix() {
        assert_eq!(
            repo_name_from_url("https://github.com/acme/widgets.git"),
            "widgets"
        );
        assert_eq!(repo_name_from_url("git@github.com:acme/widgets.git"), "widgets");
    }

    #[test]
    fn diff_numstat_picks_up_modified_tracked_file() {
        let temp = TempDir::new().unwrap();
        init_repo(temp.path());
        std::fs::write(temp.path().join("a.ts"), "one\ntwo\n").unwrap();
        Command::new("git").args(["add", "."]).current_dir(temp.path()).status().unwrap();
        Command::new("git")
            .args(["commit", "-q", "-m", "init"])
            .current_dir(temp.path())
            .status()
            .unwrap();

        std::fs::write(temp.path().join("a.ts"), "one\ntwo\nthree\n").unwrap();
        let map = diff_numstat(temp.path(), &[]);
        assert_eq!(map.get("a.ts"), Some(&1));
    }

    #[test]
    fn diff_numstat_excludes_configured_dirs() {
        let temp = TempDir::new().unwrap();
        init_repo(temp.path());
        std::fs::create_dir_all(temp.path().join("node_modules")).unwrap();
        std::fs::write(temp.path().join("node_modules/pkg.js"), "x\n").unwrap();

        let map = diff_numstat(temp.path(), &["node_modules"]);
        assert!(map.is_empty());
    }
}