//! core::command
//!
//! Shell command execution.
//!
//! This module is the **single doorway** to `std::process::Command` in
//! quick-gate. Every gate command, pre-fix script, and model-adapter shell
//! call flows through [`run`]. No other module should spawn a process
//! directly. This keeps timeout handling, exit-code capture, and stdout/
//! stderr truncation consistent everywhere a subprocess is needed.
//!
//! # Timeout
//!
//! There is no cross-platform "wait with timeout" in `std::process`, so
//! this polls `try_wait()` on a short interval until the process exits or
//! the deadline passes, then kills it. This avoids pulling in a process
//! crate for what is, in practice, a handful of polls per invocation.

use std::io::{Read, Write};
use std::path::Path;
use std::process::{Command as StdCommand, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Errors from running a shell command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to spawn '{command}': {source}")]
    SpawnFailed {
        command: String,
        source: std::io::Error,
    },

    #[error("failed to read output of '{command}': {source}")]
    IoError {
        command: String,
        source: std::io::Error,
    },
}

/// Outcome of running a command to completion or timeout.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    /// The command line that was run, as given.
    pub command: String,
    /// Process exit code. `None` if the process was killed for timing out.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
    pub timed_out: bool,
}

impl CommandOutcome {
    /// A gate command is considered passing when it exited zero and didn't
    /// time out. Lighthouse's extractor layer treats a non-zero exit as a
    /// signal in its own right rather than a bare failure; see
    /// `engine::lighthouse`.
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }
}

/// Run `command_line` through the platform shell in `cwd`, enforcing
/// `timeout`.
///
/// The command is interpreted by `sh -c` (`cmd /C` on Windows) so that
/// config-supplied strings like `"npm run lint --silent"` behave the way a
/// user typing them at a terminal would expect, including pipes and
/// globbing.
pub fn run(command_line: &str, cwd: &Path, timeout: Duration) -> Result<CommandOutcome, CommandError> {
    run_with_stdin(command_line, cwd, timeout, None)
}

/// Like [`run`], but pipes `stdin` (when given) to the child's standard
/// input before polling for completion. The model adapters are the only
/// current caller - a local model runner takes its prompt on stdin rather
/// than as a command-line argument.
pub fn run_with_stdin(
    command_line: &str,
    cwd: &Path,
    timeout: Duration,
    stdin: Option<&str>,
) -> Result<CommandOutcome, CommandError> {
    let start = Instant::now();

    let mut cmd = shell_command(command_line);
    cmd.current_dir(cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

    let mut child = cmd.spawn().map_err(|e| CommandError::SpawnFailed {
        command: command_line.to_string(),
        source: e,
    })?;

    if let Some(input) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            let _ = pipe.write_all(input.as_bytes());
        }
    }

    // Drain stdout/stderr on their own threads as the child runs, not after
    // `try_wait` reports exit. A chatty gate (`eslint`, `tsc`, `next build`)
    // fills the OS pipe buffer (~64 KB) well before finishing; reading only
    // after the poll loop would deadlock the child against that full buffer
    // and we'd kill a command that was actually going to succeed.
    let stdout_reader = child.stdout.take().map(|mut out| {
        std::thread::spawn(move || {
            let mut buf = String::new();
            let _ = out.read_to_string(&mut buf);
            buf
        })
    });
    let stderr_reader = child.stderr.take().map(|mut err| {
        std::thread::spawn(move || {
            let mut buf = String::new();
            let _ = err.read_to_string(&mut buf);
            buf
        })
    });

    let mut timed_out = false;
    let exit_code = loop {
        if let Some(status) = child.try_wait().map_err(|e| CommandError::IoError {
            command: command_line.to_string(),
            source: e,
        })? {
            break status.code();
        }

        if start.elapsed() >= timeout {
            timed_out = true;
            let _ = child.kill();
            let _ = child.wait();
            break None;
        }

        std::thread::sleep(POLL_INTERVAL);
    };

    let stdout = stdout_reader.map(|h| h.join().unwrap_or_default()).unwrap_or_default();
    let stderr = stderr_reader.map(|h| h.join().unwrap_or_default()).unwrap_or_default();

    Ok(CommandOutcome {
        command: command_line.to_string(),
        exit_code,
        stdout,
        stderr,
        duration: start.elapsed(),
        timed_out,
    })
}

#[cfg(unix)]
fn shell_command(command_line: &str) -> StdCommand {
    let mut cmd = StdCommand::new("sh");
    cmd.arg("-c").arg(command_line);
    cmd
}

#[cfg(windows)]
fn shell_command(command_line: &str) -> StdCommand {
    let mut cmd = StdCommand::new("cmd");
    cmd.arg("/C").arg(command_line);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn captures_stdout_and_exit_code() {
        let temp = TempDir::new().unwrap();
        let outcome = run("echo hello", temp.path(), Duration::from_secs(5)).unwrap();
        assert!(outcome.succeeded());
        assert_eq!(outcome.stdout.trim(), "hello");
        assert_eq!(outcome.exit_code, Some(0));
        assert!(!outcome.timed_out);
    }

    #[test]
    fn nonzero_exit_is_not_success() {
        let temp = TempDir::new().unwrap();
        let outcome = run("exit 1", temp.path(), Duration::from_secs(5)).unwrap();
        assert!(!outcome.succeeded());
        assert_eq!(outcome.exit_code, Some(1));
    }

    #[test]
    fn stdin_is_piped_to_child() {
        let temp = TempDir::new().unwrap();
        let outcome = run_with_stdin("cat", temp.path(), Duration::from_secs(5), Some("hi there"))
            .unwrap();
        assert!(outcome.succeeded());
        assert_eq!(outcome.stdout.trim(), "hi there");
    }

    #[test]
    fn timeout_kills_process() {
        let temp = TempDir::new().unwrap();
        let outcome = run("sleep 5", temp.path(), Duration::from_millis(100)).unwrap();
        assert!(outcome.timed_out);
        assert!(outcome.exit_code.is_none());
        assert!(!outcome.succeeded());
    }
}
