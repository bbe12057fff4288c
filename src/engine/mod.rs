//! engine
//!
//! Orchestrates the quality-gate lifecycle: Gate -> Pre-fix -> Model adapters
//! -> Apply -> Rerun -> Decide.
//!
//! # Architecture
//!
//! 1. **Gate** ([`gate`]) - resolve each gate to a command, run it, extract findings
//! 2. **Lighthouse** ([`lighthouse`]) - structured extraction of the audit artifact
//! 3. **Snapshot** ([`snapshot`]) - per-attempt workspace backup/restore
//! 4. **Plan** ([`plan`]) - edit-plan validation and atomic application
//! 5. **Prefixer** ([`prefixer`]) - deterministic low-risk auto-fixes
//! 6. **Repair** ([`repair`]) - the bounded repair-loop state machine
//!
//! # Command Lifecycle
//!
//! ```text
//! run --mode <mode> --changed-files <path>
//!   -> gate::run_gates()        writes failures.json + run-metadata.json
//! repair --input failures.json
//!   -> repair::run()            reads failures.json, loops, writes
//!                                repair-report.json OR escalation.json
//! ```
//!
//! The engine never reads `failures.json` state implicitly between steps;
//! every component takes its inputs as explicit parameters.

pub mod adapters;
pub mod brief;
pub mod gate;
pub mod lighthouse;
pub mod plan;
pub mod prefixer;
pub mod repair;
pub mod snapshot;
pub mod vcs;

pub use brief::{build_brief, render_markdown};
pub use gate::{run_gates, GateError, GateRunOutcome};
pub use lighthouse::{extract_lighthouse_findings, LighthouseError};
pub use plan::{apply_edit_plan, validate_edit_plan, PlanError};
pub use prefixer::{run_prefixer, PrefixError, PrefixOutcome};
pub use repair::{run_repair, RepairError, RepairOutcome};
pub use snapshot::{SnapshotError, WorkspaceSnapshot};

use std::path::PathBuf;

/// Execution context shared by every subcommand handler: the resolved
/// working directory and the global `--debug`/`--quiet` flags.
#[derive(Debug, Clone)]
pub struct Context {
    pub cwd: PathBuf,
    pub debug: bool,
    pub quiet: bool,
}

impl Context {
    pub fn verbosity(&self) -> crate::ui::output::Verbosity {
        crate::ui::output::Verbosity::from_flags(self.quiet, self.debug)
    }
}
