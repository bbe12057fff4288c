//! engine::prefixer
//!
//! The deterministic pre-fixer: a rule table keyed on which gates
//! are currently failing. Rule 1, the only rule required by this version,
//! applies a lint autofix limited to the **problem** class on a scoped
//! file set. Other failing gates get a `requires_manual_or_model_patch`
//! placeholder action - deterministic fixes for typecheck/build/lighthouse
//! are out of scope in v1.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::core::command::{self, CommandError};
use crate::core::config::Config;
use crate::core::types::{Action, Finding, Gate};
use crate::ui::output::{self, Verbosity};

const MAX_SCOPED_FILES: usize = 20;
const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs", "vue", "svelte"];
const EXCLUDED_DIRS: &[&str] = &["dist", "build", "node_modules", "coverage", ".next", "out", "vendor"];
const PREFIX_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error)]
pub enum PrefixError {
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Outcome of one pre-fixer invocation.
#[derive(Debug)]
pub struct PrefixOutcome {
    /// Whether a rule actually mutated the working tree. Only `true` here
    /// triggers the repair loop's immediate rerun.
    pub acted: bool,
    pub action: Action,
}

/// Run the pre-fixer rule table against the gates represented by
/// `findings`.
pub fn run_prefixer(
    findings: &[Finding],
    changed_files: &[String],
    cwd: &Path,
    config: &Config,
    verbosity: Verbosity,
) -> Result<PrefixOutcome, PrefixError> {
    let failing_gates: HashSet<Gate> = findings.iter().map(|f| f.gate).collect();

    if failing_gates.contains(&Gate::Lint) {
        let scoped = scoped_file_set(changed_files, findings);
        if scoped.is_empty() {
            return Ok(PrefixOutcome {
                acted: false,
                action: Action::new("requires_manual_or_model_patch")
                    .with_reason("lint_failing_with_no_scoped_source_files"),
            });
        }
        return run_lint_autofix(&scoped, cwd, config, verbosity);
    }

    Ok(PrefixOutcome {
        acted: false,
        action: Action::new("requires_manual_or_model_patch").with_reason(
            "no deterministic rule for failing gate(s): ".to_string()
                + &failing_gates
                    .iter()
                    .map(|g| g.as_str())
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect::<Vec<_>>()
                    .join(","),
        ),
    })
}

fn run_lint_autofix(
    scoped: &[String],
    cwd: &Path,
    config: &Config,
    verbosity: Verbosity,
) -> Result<PrefixOutcome, PrefixError> {
    let lint_base = config
        .command_override(Gate::Lint)
        .map(str::to_string)
        .unwrap_or_else(|| "npx eslint".to_string());

    let file_args = scoped.join(" ");
    let command_line = format!("{lint_base} --fix --fix-type problem {file_args}");

    output::debug(format!("prefixer: running `{command_line}`"), verbosity);
    let outcome = command::run(&command_line, cwd, PREFIX_TIMEOUT)?;
    output::debug(
        format!("prefixer: exit {:?}", outcome.exit_code),
        verbosity,
    );

    let action = Action::new("deterministic_lint_autofix")
        .with_command(command_line, outcome.exit_code.unwrap_or(-1));

    Ok(PrefixOutcome { acted: true, action })
}

/// The scoped file set for rule 1: `changed_files ∪ finding.files`,
/// filtered to source-code extensions, outside build/vendor/coverage
/// directories, not a minified artifact, relative, with no parent-
/// directory traversal, capped at 20 entries (insertion order preserved).
fn scoped_file_set(changed_files: &[String], findings: &[Finding]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut scoped = Vec::new();

    for file in changed_files.iter().chain(findings.iter().flat_map(|f| f.files.iter())) {
        if scoped.len() >= MAX_SCOPED_FILES {
            break;
        }
        if !seen.insert(file.clone()) {
            continue;
        }
        if is_eligible(file) {
            scoped.push(file.clone());
        }
    }

    scoped
}

fn is_eligible(path: &str) -> bool {
    if Path::new(path).is_absolute() {
        return false;
    }
    if path.split('/').any(|c| c == "..") {
        return false;
    }
    if path.split('/').any(|c| EXCLUDED_DIRS.contains(&c)) {
        return false;
    }
    let Some(file_name) = path.rsplit('/').next() else {
        return false;
    };
    if file_name.contains(".min.") {
        return false;
    }
    let Some(ext) = file_name.rsplit('.').next() else {
        return false;
    };
    SOURCE_EXTENSIONS.contains(&ext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::GateStatus;
    use tempfile::TempDir;

    fn lint_finding(files: &[&str]) -> Finding {
        let mut f = Finding::new("lint1", Gate::Lint, "bad");
        f.files = files.iter().map(|s| s.to_string()).collect();
        f.status = "fail";
        let _ = GateStatus::Fail;
        f
    }

    #[test]
    fn scoped_file_set_filters_non_source_and_excluded_dirs() {
        let files = scoped_file_set(
            &[
                "src/a.ts".to_string(),
                "dist/bundle.js".to_string(),
                "README.md".to_string(),
                "src/util.min.js".to_string(),
                "../outside.ts".to_string(),
                "/abs/path.ts".to_string(),
            ],
            &[],
        );
        assert_eq!(files, vec!["src/a.ts".to_string()]);
    }

    #[test]
    fn scoped_file_set_caps_at_twenty() {
        let changed: Vec<String> = (0..30).map(|i| format!("src/f{i}.ts")).collect();
        let files = scoped_file_set(&changed, &[]);
        assert_eq!(files.len(), 20);
    }

    #[test]
    fn scoped_file_set_merges_changed_and_finding_files_deduplicated() {
        let findings = vec![lint_finding(&["src/a.ts", "src/b.ts"])];
        let files = scoped_file_set(&["src/a.ts".to_string()], &findings);
        assert_eq!(files, vec!["src/a.ts".to_string(), "src/b.ts".to_string()]);
    }

    #[test]
    fn no_lint_failure_yields_placeholder_action_without_acting() {
        let mut f = Finding::new("tc1", Gate::Typecheck, "bad");
        f.files = vec!["src/a.ts".to_string()];
        let config = Config::default();
        let temp = TempDir::new().unwrap();
        let outcome = run_prefixer(&[f], &[], temp.path(), &config, Verbosity::Quiet).unwrap();
        assert!(!outcome.acted);
        assert_eq!(outcome.action.strategy, "requires_manual_or_model_patch");
    }

    #[test]
    fn lint_failure_with_no_eligible_files_yields_placeholder() {
        let findings = vec![lint_finding(&["README.md"])];
        let config = Config::default();
        let temp = TempDir::new().unwrap();
        let outcome = run_prefixer(&findings, &[], temp.path(), &config, Verbosity::Quiet).unwrap();
        assert!(!outcome.acted);
        assert_eq!(outcome.action.strategy, "requires_manual_or_model_patch");
    }

    #[test]
    fn lint_failure_runs_autofix_command() {
        let findings = vec![lint_finding(&["src/a.ts"])];
        let mut config = Config::default();
        config.file.commands.lint = Some("true".to_string());
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("src")).unwrap();
        std::fs::write(temp.path().join("src/a.ts"), "x").unwrap();

        let outcome = run_prefixer(&findings, &[], temp.path(), &config, Verbosity::Quiet).unwrap();
        assert!(outcome.acted);
        assert_eq!(outcome.action.strategy, "deterministic_lint_autofix");
        assert_eq!(outcome.action.exit_code, Some(0));
        assert!(outcome.action.command.as_deref().unwrap().contains("src/a.ts"));
    }
}
