//! quick-gate CLI entry point.
//!
//! Thin shim over [`quick_gate::cli`]: parse arguments, map clap's help/
//! version/usage-error paths to the exit codes this crate documents,
//! and otherwise hand off to [`quick_gate::cli::run`] for the real exit
//! code (0 pass, 1 usage/fail, 2 escalation).

use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use quick_gate::cli::Cli;
use quick_gate::ui::output;

fn main() -> ExitCode {
    // No-args prints usage and exits 0, same as `--help` - clap's
    // default for a required subcommand would otherwise exit non-zero.
    if std::env::args_os().count() <= 1 {
        Cli::command().print_help().ok();
        println!();
        return ExitCode::from(0);
    }

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            use clap::error::ErrorKind;
            print!("{err}");
            return match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::from(0),
                _ => ExitCode::from(1),
            };
        }
    };

    match quick_gate::cli::run(cli) {
        Ok(code) => ExitCode::from(code as u8),
        Err(err) => {
            output::error(format!("{err:#}"));
            ExitCode::from(1)
        }
    }
}
