//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all subcommands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--cwd <path>`: Run as if quick-gate was started in that directory
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::core::types::Mode;

/// quick-gate - quality-gate orchestrator and bounded auto-repair loop for
/// front-end web projects.
#[derive(Parser, Debug)]
#[command(name = "quick-gate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Run as if quick-gate was started in this directory
    #[arg(long, global = true)]
    pub cwd: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Resolve `--cwd`, falling back to the process's current directory.
    pub fn resolved_cwd(&self) -> std::io::Result<PathBuf> {
        match &self.cwd {
            Some(path) => Ok(path.clone()),
            None => std::env::current_dir(),
        }
    }
}

/// Run mode as accepted on the command line (mirrors [`Mode`]).
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Canary,
    Full,
}

impl From<ModeArg> for Mode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Canary => Mode::Canary,
            ModeArg::Full => Mode::Full,
        }
    }
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the quality gates and write `failures.json` / `run-metadata.json`.
    Run {
        /// Which gate plan to run: `canary` skips the build gate, `full` runs everything.
        #[arg(long, value_enum)]
        mode: ModeArg,

        /// Path to a changed-files list (plain text, one path per line, or a JSON array).
        #[arg(long)]
        changed_files: PathBuf,
    },

    /// Project a `FailuresReport` into the agent brief (JSON + Markdown).
    Summarize {
        /// Path to a `failures.json`-shaped artifact to summarize.
        #[arg(long)]
        input: PathBuf,
    },

    /// Run the bounded auto-repair loop against a `failures.json`.
    Repair {
        /// Path to a `failures.json`-shaped artifact to repair.
        #[arg(long)]
        input: PathBuf,

        /// Override the configured maximum number of repair attempts.
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Run only the deterministic pre-fixer; never invoke model adapters.
        #[arg(long)]
        deterministic_only: bool,
    },
}
