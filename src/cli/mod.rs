//! cli
//!
//! Command-line interface layer.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Delegate to command handlers
//! - Does NOT run gates, mutate the workspace, or call a model directly
//!
//! # Architecture
//!
//! The CLI layer is thin. It parses arguments via clap and dispatches to
//! [`commands`], which delegates to [`crate::engine`] and [`crate::core`]
//! for everything that touches the filesystem or spawns a process.

pub mod args;
pub mod commands;

pub use args::Cli;

use anyhow::Result;

use crate::engine::Context;

/// Run the CLI application against an already-parsed [`Cli`]. Returns the
/// process exit code: 0 pass, 1 usage/fail, 2 escalation.
pub fn run(cli: Cli) -> Result<i32> {
    let cwd = cli.resolved_cwd()?;
    let ctx = Context {
        cwd,
        debug: resolve_debug(cli.debug),
        quiet: cli.quiet,
    };

    commands::dispatch(cli.command, &ctx)
}

/// `--debug` and `QUICK_GATE_DEBUG` are equivalent; either one enables it.
fn resolve_debug(flag: bool) -> bool {
    flag || crate::core::config::env_flag("QUICK_GATE_DEBUG")
}
