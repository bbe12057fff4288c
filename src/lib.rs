//! quick-gate - a quality-gate orchestrator and bounded auto-repair loop
//! for front-end web projects.
//!
//! `quick-gate` runs a project's lint, typecheck, build, and Lighthouse
//! checks, normalizes every failure into a structured `Finding`, and
//! optionally drives a bounded repair loop that combines a deterministic
//! pre-fixer with model-generated edit plans to fix what it safely can.
//!
//! # Architecture
//!
//! - [`cli`] - command-line interface layer (parses args, delegates to engine)
//! - [`engine`] - orchestrates Gate -> Pre-fix -> Model adapters -> Apply -> Rerun -> Decide
//! - [`core`] - domain types, configuration, command execution, artifacts
//! - [`ui`] - user-facing output conventions
//!
//! # Correctness invariants
//!
//! 1. `FailuresReport.status = pass` if and only if `findings` is empty.
//! 2. Exactly one of `repair-report.json` / `escalation.json` exists when
//!    `repair` returns.
//! 3. The working tree is mutated only by the edit-plan applier, the
//!    deterministic pre-fixer, and snapshot restore - all from the repair
//!    loop's own thread of control.

pub mod cli;
pub mod core;
pub mod engine;
pub mod ui;
