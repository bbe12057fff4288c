//! engine::repair
//!
//! The bounded repair loop: the core state machine of this crate.
//! Each attempt snapshots the workspace, runs the deterministic pre-fixer,
//! then - unless that alone cleared every finding - the hint and patch
//! model adapters, reruns the gates, and decides whether to keep going,
//! roll back, or escalate. Exactly one of [`crate::core::types::RepairReport`]
//! / [`crate::core::types::Escalation`] is ever produced.

use std::path::Path;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::core::artifacts::{self, ArtifactError, ArtifactPaths};
use crate::core::command::CommandError;
use crate::core::config::{Config, ModelPolicy};
use crate::core::types::{
    Action, AttemptRecord, Escalation, FailuresReport, Finding, GateStatus, ReasonCode,
    RepairReport,
};
use crate::ui::output::{self, Verbosity};

use super::adapters::context::gather;
use super::adapters::{invoke_hint, invoke_patch};
use super::gate::{self, GateError};
use super::plan::{apply_edit_plan, PlanError};
use super::prefixer::{self, PrefixError};
use super::snapshot::{SnapshotError, WorkspaceSnapshot};
use super::vcs;

const DIFF_EXCLUDE_DIRS: &[&str] = &[
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
pub enum RepairError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Which terminal artifact the loop produced.
#[derive(Debug)]
pub enum RepairOutcome {
    Repaired(RepairReport),
    Escalated(Escalation),
}

impl RepairOutcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, RepairOutcome::Repaired(_))
    }
}

/// Inputs threaded through the loop, gathered once by the CLI handler.
pub struct RepairInputs<'a> {
    pub report: FailuresReport,
    pub changed_files: Vec<String>,
    pub max_attempts: u32,
    pub deterministic_only: bool,
    pub cwd: &'a Path,
    pub config: &'a Config,
    pub verbosity: Verbosity,
}

/// Run the bounded repair loop to completion, writing whichever
/// terminal artifact (`repair-report.json` or `escalation.json`) the loop
/// produces, plus a refreshed `failures.json`/agent brief on every rerun.
pub fn run_repair(inputs: RepairInputs) -> Result<RepairOutcome, RepairError> {
    let RepairInputs {
        mut report,
        changed_files,
        max_attempts,
        deterministic_only,
        cwd,
        config,
        verbosity,
    } = inputs;

    let paths = ArtifactPaths::new(cwd);
    paths.ensure_exists()?;

    let started_at = Instant::now();
    let time_cap = Duration::from_millis(config.time_cap_ms());
    let abort_on_no_improvement = config.abort_on_no_improvement();

    let mut previous_count = report.findings.len();
    let mut no_improvement: u32 = 0;
    let mut attempts: Vec<AttemptRecord> = Vec::new();

    for attempt_number in 1..=max_attempts {
        // 1. Time-cap check.
        if started_at.elapsed() > time_cap {
            let escalation = Escalation::new(
                ReasonCode::UnknownBlocker,
                format!("time cap of {}ms exceeded before attempt {attempt_number}", time_cap.as_millis()),
            )
            .with_attempts(attempts.clone());
            return finish_escalation(&paths, escalation, verbosity);
        }

        output::debug(format!("repair: starting attempt {attempt_number}/{max_attempts}"), verbosity);

        // 2. Snapshot the workspace.
        let snapshot = WorkspaceSnapshot::capture(cwd, &paths, attempt_number)?;

        // 3. Pre-action diff.
        let before_diff = vcs::diff_numstat(cwd, DIFF_EXCLUDE_DIRS);

        let mut actions: Vec<Action> = Vec::new();
        let mut short_circuit_pass = false;

        // 4a. Deterministic pre-fixer.
        let prefix_outcome =
            prefixer::run_prefixer(&report.findings, &changed_files, cwd, config, verbosity)
                .map_err(|e| match e {
                    PrefixError::Command(c) => RepairError::Command(c),
                })?;
        actions.push(prefix_outcome.action.clone());

        if prefix_outcome.acted {
            let rerun = rerun_gates(cwd, config, &changed_files, &report, verbosity)?;
            actions.push(Action::new("deterministic_prefix_rerun").with_reason(format!(
                "refreshed findings: {}",
                rerun.findings.len()
            )));
            report = rerun;
            persist_refresh(&paths, &report)?;
            if report.findings.is_empty() {
                short_circuit_pass = true;
            }
        }

        // 4b-4e. Model-driven actions, skipped once the pre-fixer alone cleared
        // the findings set.
        let mut gathered_hints: Vec<String> = Vec::new();
        if !short_circuit_pass {
            if deterministic_only {
                actions.push(Action::new("deterministic_only_mode"));
            } else if !report.findings.iter().any(|f| f.gate.is_model_patchable()) {
                actions.push(
                    Action::new("skip_model_patch").with_reason("no_patchable_gate_in_findings"),
                );
            } else {
                let ctx = gather(cwd, &changed_files, &report.findings);
                let policy = ModelPolicy::from_env();

                let hint_result = invoke_hint(&ctx, &policy, cwd, verbosity);
                let mut hint_action = Action::new("hint_adapter");
                if let Some(reason) = &hint_result.reason {
                    hint_action = hint_action.with_reason(reason.clone());
                } else {
                    hint_action = hint_action.with_reason(format!("{} hints", hint_result.hints.hints.len()));
                }
                actions.push(hint_action);
                gathered_hints = hint_result
                    .hints
                    .hints
                    .iter()
                    .map(|h| format!("{}: {} ({})", h.finding_id, h.hint, h.confidence.as_str()))
                    .collect();

                let patch_result = invoke_patch(&ctx, &policy, cwd, verbosity);
                let mut patch_action = Action::new("patch_adapter");
                if let Some(reason) = &patch_result.reason {
                    patch_action = patch_action.with_reason(reason.clone());
                }
                if let Some(plan) = &patch_result.plan {
                    match apply_edit_plan(
                        plan,
                        cwd,
                        &ctx.allowed_files,
                        &merged_scope(&changed_files, &report.findings),
                        config.max_patch_lines(),
                    ) {
                        Ok(applied) => {
                            patch_action = patch_action.with_reason(format!(
                                "applied: score={}, patch_lines={}, files={}",
                                applied.score,
                                applied.patch_lines,
                                applied.touched_files.join(",")
                            ));
                        }
                        Err(err) => {
                            patch_action = patch_action.with_reason(plan_error_reason(&err));
                        }
                    }
                }
                actions.push(patch_action);
            }
        }

        // 5. Post-action diff and patch-budget check.
        let after_diff = vcs::diff_numstat(cwd, DIFF_EXCLUDE_DIRS);
        let patch_lines = patch_line_delta(&before_diff, &after_diff);

        if patch_lines > config.max_patch_lines() {
            snapshot.restore(cwd)?;
            let escalation = Escalation::new(
                ReasonCode::PatchBudgetExceeded,
                format!(
                    "attempt {attempt_number} patch-line delta {patch_lines} exceeded maxPatchLines={}",
                    config.max_patch_lines()
                ),
            )
            .with_evidence(vec![format!("patch_lines={patch_lines}")])
            .with_attempts(attempts.clone());
            return finish_escalation(&paths, escalation, verbosity);
        }

        // 6. Short-circuit branch.
        if short_circuit_pass {
            attempts.push(AttemptRecord {
                attempt: attempt_number,
                patch_lines,
                before_findings: previous_count,
                after_findings: 0,
                improved: true,
                worsened: false,
                status: GateStatus::Pass,
                actions,
            });
            let report = RepairReport::new(attempts);
            write_repair_report(&paths, &report)?;
            output::success("repair: passed via deterministic pre-fix", verbosity);
            return Ok(RepairOutcome::Repaired(report));
        }

        // 7. Rerun gates.
        let mut rerun = rerun_gates(cwd, config, &changed_files, &report, verbosity)?;
        rerun.inferred_hints = gathered_hints;
        report = rerun;
        persist_refresh(&paths, &report)?;

        // 8. Compare.
        let current_count = report.findings.len();
        let improved = current_count < previous_count;
        let worsened = current_count > previous_count;
        let status = report.status;

        attempts.push(AttemptRecord {
            attempt: attempt_number,
            patch_lines,
            before_findings: previous_count,
            after_findings: current_count,
            improved,
            worsened,
            status,
            actions,
        });

        // 9. Rerun pass -> terminate.
        if status == GateStatus::Pass {
            let report = RepairReport::new(attempts);
            write_repair_report(&paths, &report)?;
            output::success("repair: passed", verbosity);
            return Ok(RepairOutcome::Repaired(report));
        }

        // 10. Worsened -> rollback.
        if worsened {
            snapshot.restore(cwd)?;
            output::debug(format!("repair: attempt {attempt_number} worsened findings, rolled back"), verbosity);
        }

        // 11. Bookkeeping.
        if improved {
            no_improvement = 0;
        } else {
            no_improvement += 1;
        }
        previous_count = current_count;

        // 12. No-improvement trip.
        if no_improvement >= abort_on_no_improvement {
            let escalation = Escalation::new(
                ReasonCode::NoImprovement,
                format!("{no_improvement} consecutive attempts without improvement"),
            )
            .with_attempts(attempts.clone());
            return finish_escalation(&paths, escalation, verbosity);
        }

        // 13. Loop or exhaust - the `for` bound handles exhaustion.
    }

    let escalation = Escalation::new(ReasonCode::UnknownBlocker, "attempts exhausted".to_string())
        .with_attempts(attempts);
    finish_escalation(&paths, escalation, verbosity)
}

fn rerun_gates(
    cwd: &Path,
    config: &Config,
    changed_files: &[String],
    previous: &FailuresReport,
    verbosity: Verbosity,
) -> Result<FailuresReport, RepairError> {
    let outcome = gate::run_gates(previous.mode, cwd, config, changed_files, verbosity)?;
    Ok(FailuresReport::new(
        previous.run_id.clone(),
        previous.mode,
        previous.timestamp.clone(),
        previous.repo.clone(),
        previous.branch.clone(),
        changed_files.to_vec(),
        outcome.gates,
        outcome.findings,
    ))
}

fn persist_refresh(paths: &ArtifactPaths, report: &FailuresReport) -> Result<(), RepairError> {
    artifacts::write_failures_report(&paths.failures_json(), report)?;
    let brief = super::brief::build_brief(report);
    artifacts::write_agent_brief(&paths.agent_brief_json(), &brief)?;
    std::fs::write(paths.agent_brief_md(), super::brief::render_markdown(&brief))
        .map_err(|e| RepairError::Artifact(ArtifactError::WriteFailed {
            path: paths.agent_brief_md(),
            source: e,
        }))?;
    Ok(())
}

fn finish_escalation(
    paths: &ArtifactPaths,
    escalation: Escalation,
    verbosity: Verbosity,
) -> Result<RepairOutcome, RepairError> {
    // Exactly one of repair-report.json / escalation.json may exist at
    // return - drop a leftover pass artifact from a prior invocation before
    // writing this one.
    remove_if_exists(&paths.repair_report_json())?;
    artifacts::write_json(&paths.escalation_json(), &escalation)?;
    output::warn(format!("repair: escalated ({:?})", escalation.reason_code), verbosity);
    Ok(RepairOutcome::Escalated(escalation))
}

/// Write `repair-report.json`, first dropping a leftover `escalation.json`
/// from a prior invocation so the two terminal artifacts stay mutually
/// exclusive.
fn write_repair_report(paths: &ArtifactPaths, report: &RepairReport) -> Result<(), RepairError> {
    remove_if_exists(&paths.escalation_json())?;
    artifacts::write_json(&paths.repair_report_json(), report)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<(), RepairError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RepairError::Artifact(ArtifactError::WriteFailed {
            path: path.to_path_buf(),
            source: e,
        })),
    }
}

fn patch_line_delta(
    before: &std::collections::BTreeMap<String, u64>,
    after: &std::collections::BTreeMap<String, u64>,
) -> u32 {
    let mut keys: std::collections::BTreeSet<&String> = before.keys().collect();
    keys.extend(after.keys());

    keys.into_iter()
        .map(|k| {
            let b = *before.get(k).unwrap_or(&0) as i64;
            let a = *after.get(k).unwrap_or(&0) as i64;
            (a - b).unsigned_abs()
        })
        .sum::<u64>() as u32
}

fn merged_scope(changed_files: &[String], findings: &[Finding]) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    let mut merged = Vec::new();
    for file in changed_files.iter().chain(findings.iter().flat_map(|f| f.files.iter())) {
        if seen.insert(file.clone()) {
            merged.push(file.clone());
        }
    }
    merged
}

fn plan_error_reason(err: &PlanError) -> String {
    err.reason_tag()
}
