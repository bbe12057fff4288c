//! cli::commands
//!
//! One handler per subcommand. Each handler is a thin translation
//! from parsed arguments to engine calls: it resolves inputs, acquires the
//! artifact lock, delegates to `engine`/`core`, and maps the result to a
//! process exit code. No gate invocation, workspace mutation, or model
//! call happens here directly.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context as _, Result};
use chrono::Utc;
use uuid::Uuid;

use crate::core::artifacts::{self, ArtifactLock, ArtifactPaths};
use crate::core::changed_files;
use crate::core::config::Config;
use crate::core::types::{FailuresReport, Mode, RunMetadata};
use crate::engine::repair::{self, RepairInputs, RepairOutcome};
use crate::engine::{self, Context};
use crate::ui::output;

use super::args::Command;

const LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Dispatch a parsed subcommand. Returns the process exit code.
pub fn dispatch(command: Command, ctx: &Context) -> Result<i32> {
    match command {
        Command::Run { mode, changed_files } => run(ctx, mode.into(), &changed_files),
        Command::Summarize { input } => summarize(ctx, &input),
        Command::Repair {
            input,
            max_attempts,
            deterministic_only,
        } => repair_command(ctx, &input, max_attempts, deterministic_only),
    }
}

fn run(ctx: &Context, mode: Mode, changed_files_path: &Path) -> Result<i32> {
    let verbosity = ctx.verbosity();
    let load_result = Config::load(&ctx.cwd).context("loading quick-gate.config.json")?;
    let config = load_result.config;

    let changed_files = changed_files::read(changed_files_path)
        .with_context(|| format!("reading changed-files list at {}", changed_files_path.display()))?;

    let paths = ArtifactPaths::new(&ctx.cwd);
    let _lock = ArtifactLock::acquire(&paths, LOCK_TIMEOUT).context("acquiring .quick-gate lock")?;

    let started_at = Utc::now();
    let outcome = engine::run_gates(mode, &ctx.cwd, &config, &changed_files, verbosity)
        .context("running quality gates")?;
    let finished_at = Utc::now();

    let repo_meta = engine::vcs::repo_metadata(&ctx.cwd);
    let run_id = Uuid::new_v4().to_string();

    let report = FailuresReport::new(
        run_id.clone(),
        mode,
        started_at.to_rfc3339(),
        repo_meta.repo.clone(),
        repo_meta.branch.clone(),
        changed_files,
        outcome.gates,
        outcome.findings,
    );

    let metadata = RunMetadata {
        run_id,
        started_at: started_at.to_rfc3339(),
        finished_at: finished_at.to_rfc3339(),
        duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
        mode,
        gate_commands: outcome.gate_commands,
        repo: repo_meta.repo,
        branch: repo_meta.branch,
    };

    artifacts::write_failures_report(&paths.failures_json(), &report).context("writing failures.json")?;
    artifacts::write_json(&paths.run_metadata_json(), &metadata).context("writing run-metadata.json")?;

    let pass = report.status == crate::core::types::GateStatus::Pass;
    if pass {
        output::success("quick-gate run: all gates passed", verbosity);
        Ok(0)
    } else {
        output::warn(
            format!("quick-gate run: {} finding(s)", report.findings.len()),
            verbosity,
        );
        Ok(1)
    }
}

fn summarize(ctx: &Context, input: &Path) -> Result<i32> {
    let verbosity = ctx.verbosity();
    let report: FailuresReport =
        artifacts::read_json(input).with_context(|| format!("reading {}", input.display()))?;

    let brief = engine::build_brief(&report);
    let markdown = engine::render_markdown(&brief);

    let paths = ArtifactPaths::new(&ctx.cwd);
    paths.ensure_exists().context("creating .quick-gate directory")?;
    artifacts::write_agent_brief(&paths.agent_brief_json(), &brief).context("writing agent-brief.json")?;
    std::fs::write(paths.agent_brief_md(), markdown).context("writing agent-brief.md")?;

    output::success("quick-gate summarize: wrote agent-brief.json and agent-brief.md", verbosity);
    Ok(0)
}

fn repair_command(
    ctx: &Context,
    input: &Path,
    max_attempts_override: Option<u32>,
    deterministic_only: bool,
) -> Result<i32> {
    let verbosity = ctx.verbosity();
    let load_result = Config::load(&ctx.cwd).context("loading quick-gate.config.json")?;
    let config = load_result.config;

    let report: FailuresReport =
        artifacts::read_json(input).with_context(|| format!("reading {}", input.display()))?;
    let changed_files = report.changed_files.clone();
    let max_attempts = max_attempts_override.unwrap_or_else(|| config.max_attempts());

    let paths = ArtifactPaths::new(&ctx.cwd);
    let _lock = ArtifactLock::acquire(&paths, LOCK_TIMEOUT).context("acquiring .quick-gate lock")?;

    let outcome = repair::run_repair(RepairInputs {
        report,
        changed_files,
        max_attempts,
        deterministic_only,
        cwd: &ctx.cwd,
        config: &config,
        verbosity,
    })
    .context("running repair loop")?;

    match outcome {
        RepairOutcome::Repaired(_) => {
            output::success("quick-gate repair: passed", verbosity);
            Ok(0)
        }
        RepairOutcome::Escalated(escalation) => {
            output::warn(format!("quick-gate repair: escalated ({:?})", escalation.reason_code), verbosity);
            Ok(2)
        }
    }
}
