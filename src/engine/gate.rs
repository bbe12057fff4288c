//! engine::gate
//!
//! Resolves each of the four gates (lint, typecheck, build, lighthouse) to
//! a concrete shell command, runs it through [`crate::core::command`], and
//! normalizes the result into [`Finding`]s.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;

use crate::core::command::{self, CommandError};
use crate::core::config::Config;
use crate::core::types::{
    CommandTrace, Finding, FindingRaw, Gate, GateResult, GateStatus, Mode, Severity,
};
use crate::engine::lighthouse;
use crate::ui::output::{self, Verbosity};

const EXCERPT_LINES: usize = 30;
/// No policy-configurable timeout is specified for gate commands; this
/// is a generous backstop so a hung process doesn't block forever.
const GATE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Error)]
pub enum GateError {
    #[error("no project manifest (package.json) found in '{0}'")]
    MissingManifest(std::path::PathBuf),

    #[error("failed to parse project manifest: {0}")]
    InvalidManifest(String),

    #[error(transparent)]
    Command(#[from] CommandError),
}

#[derive(Debug, Deserialize, Default)]
struct PackageManifest {
    #[serde(default)]
    scripts: BTreeMap<String, String>,
}

/// Outcome of running the full gate plan for one invocation.
#[derive(Debug)]
pub struct GateRunOutcome {
    pub gates: Vec<GateResult>,
    pub findings: Vec<Finding>,
    pub traces: Vec<CommandTrace>,
    /// Resolved command strings, keyed by gate name, for `RunMetadata`.
    pub gate_commands: Vec<(String, String)>,
}

/// Run the gate plan for `mode` against `cwd` with `changed_files` in scope.
///
/// Always runs lint, typecheck, lighthouse; build only when `mode=full`.
pub fn run_gates(
    mode: Mode,
    cwd: &Path,
    config: &Config,
    _changed_files: &[String],
    verbosity: Verbosity,
) -> Result<GateRunOutcome, GateError> {
    let manifest = read_manifest(cwd)?;

    let mut gates = Vec::new();
    let mut findings = Vec::new();
    let mut traces = Vec::new();
    let mut gate_commands = Vec::new();

    for gate in [Gate::Lint, Gate::Typecheck, Gate::Build, Gate::Lighthouse] {
        if gate == Gate::Build && !mode.runs_build() {
            gates.push(GateResult::skipped(gate));
            continue;
        }

        let resolved = resolve_command(gate, config, &manifest);
        let Some(command_line) = resolved else {
            findings.push(missing_command_finding(gate));
            gates.push(GateResult {
                name: gate,
                status: GateStatus::Fail,
                duration_ms: 0,
            });
            continue;
        };

        gate_commands.push((gate.as_str().to_string(), command_line.clone()));
        output::debug(
            format!("gate {}: running `{}`", gate.as_str(), command_line),
            verbosity,
        );

        let start = Instant::now();
        let outcome = command::run(&command_line, cwd, GATE_TIMEOUT)?;
        let duration_ms = start.elapsed().as_millis() as u64;

        output::debug(
            format!(
                "gate {}: exit {:?} in {}ms",
                gate.as_str(),
                outcome.exit_code,
                duration_ms
            ),
            verbosity,
        );

        traces.push(CommandTrace {
            command: outcome.command.clone(),
            cwd: cwd.display().to_string(),
            started_at: Utc::now().to_rfc3339(),
            duration_ms,
            exit_code: outcome.exit_code,
            timed_out: outcome.timed_out,
            stdout: outcome.stdout.clone(),
            stderr: outcome.stderr.clone(),
        });

        if outcome.succeeded() {
            gates.push(GateResult {
                name: gate,
                status: GateStatus::Pass,
                duration_ms,
            });
            continue;
        }

        let mut gate_findings = if gate == Gate::Lighthouse {
            lighthouse::extract_lighthouse_findings(cwd, config).unwrap_or_default()
        } else {
            Vec::new()
        };

        if gate_findings.is_empty() {
            gate_findings.push(if gate == Gate::Lighthouse {
                lighthouse::fallback_finding(&command_line, &outcome.stdout, &outcome.stderr)
            } else {
                exit_code_finding(gate, &command_line, &outcome)
            });
        }

        findings.extend(gate_findings);
        gates.push(GateResult {
            name: gate,
            status: GateStatus::Fail,
            duration_ms,
        });
    }

    Ok(GateRunOutcome {
        gates,
        findings,
        traces,
        gate_commands,
    })
}

fn read_manifest(cwd: &Path) -> Result<PackageManifest, GateError> {
    let path = cwd.join("package.json");
    if !path.exists() {
        return Err(GateError::MissingManifest(cwd.to_path_buf()));
    }
    let contents =
        std::fs::read_to_string(&path).map_err(|e| GateError::InvalidManifest(e.to_string()))?;
    serde_json::from_str(&contents).map_err(|e| GateError::InvalidManifest(e.to_string()))
}

/// Command resolution order: config override, then a declared
/// project script, then well-known fallbacks.
fn resolve_command(gate: Gate, config: &Config, manifest: &PackageManifest) -> Option<String> {
    if let Some(over) = config.command_override(gate) {
        return Some(over.to_string());
    }

    if manifest.scripts.contains_key(gate.as_str()) {
        return Some(format!("npm run {}", gate.as_str()));
    }

    match gate {
        Gate::Typecheck => Some("npx tsc --noEmit".to_string()),
        Gate::Lighthouse => Some("npx lhci autorun".to_string()),
        Gate::Lint | Gate::Build => None,
    }
}

fn missing_command_finding(gate: Gate) -> Finding {
    Finding::new(
        format!("{}_missing_command", gate.as_str()),
        gate,
        format!(
            "no command resolved for gate '{}' (no config override, no npm script, no fallback)",
            gate.as_str()
        ),
    )
    .with_severity(Severity::High)
}

fn exit_code_finding(gate: Gate, command_line: &str, outcome: &command::CommandOutcome) -> Finding {
    let mut finding = Finding::new(
        format!("{}_exit_code", gate.as_str()),
        gate,
        format!(
            "`{}` exited {}",
            command_line,
            outcome
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "timed out".to_string())
        ),
    );
    finding.raw = FindingRaw {
        stdout_excerpt: Some(excerpt(&outcome.stdout)),
        stderr_excerpt: Some(excerpt(&outcome.stderr)),
        threshold_source: None,
    };
    finding
}

fn excerpt(text: &str) -> String {
    text.lines().take(EXCERPT_LINES).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_manifest_is_fatal() {
        let temp = TempDir::new().unwrap();
        let config = Config::default();
        let result = run_gates(Mode::Canary, temp.path(), &config, &[], Verbosity::Quiet);
        assert!(matches!(result, Err(GateError::MissingManifest(_))));
    }

    #[test]
    fn resolve_command_prefers_config_override() {
        let mut config = Config::default();
        config.file.commands.lint = Some("custom lint command".to_string());
        let manifest = PackageManifest::default();
        assert_eq!(
            resolve_command(Gate::Lint, &config, &manifest),
            Some("custom lint command".to_string())
        );
    }

    #[test]
    fn resolve_command_falls_back_to_npm_script() {
        let config = Config::default();
        let mut manifest = PackageManifest::default();
        manifest
            .scripts
            .insert("lint".to_string(), "eslint .".to_string());
        assert_eq!(
            resolve_command(Gate::Lint, &config, &manifest),
            Some("npm run lint".to_string())
        );
    }

    #[test]
    fn typecheck_falls_back_to_tsc() {
        let config = Config::default();
        let manifest = PackageManifest::default();
        assert_eq!(
            resolve_command(Gate::Typecheck, &config, &manifest),
            Some("npx tsc --noEmit".to_string())
        );
    }

    #[test]
    fn lint_with_no_resolution_is_none() {
        let config = Config::default();
        let manifest = PackageManifest::default();
        assert_eq!(resolve_command(Gate::Lint, &config, &manifest), None);
    }

    #[test]
    fn canary_mode_skips_build() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("package.json"),
            r#"{"scripts": {"lint": "echo ok", "typecheck": "echo ok"}}"#,
        )
        .unwrap();
        let config = Config::default();
        let outcome =
            run_gates(Mode::Canary, temp.path(), &config, &[], Verbosity::Quiet).unwrap();
        let build = outcome.gates.iter().find(|g| g.name == Gate::Build).unwrap();
        assert_eq!(build.status, GateStatus::Skipped);
    }
}
