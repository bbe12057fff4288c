//! engine::adapters
//!
//! Hint model adapter and patch model adapter: opaque callers that
//! take a failure context, invoke a local model, and return a parsed hint
//! list or a candidate edit plan. Both share [`context::gather`] and the
//! liberal JSON boundary parser in this module.

pub mod context;
pub mod hint;
pub mod patch;

pub use hint::{invoke_hint, HintAdapterResult};
pub use patch::{invoke_patch, PatchAdapterResult};

use std::path::Path;
use std::time::Duration;

use crate::core::command::{self, CommandError};
use crate::ui::output::{self, Verbosity};

/// In-attempt action reasons an adapter call can surface. Never
/// terminal to the loop - recorded on the action, nothing more.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterFailureReason {
    MissingModel,
    ModelCommandTimeout,
    ModelCommandFailed,
}

impl AdapterFailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdapterFailureReason::MissingModel => "missing_model",
            AdapterFailureReason::ModelCommandTimeout => "model_command_timeout",
            AdapterFailureReason::ModelCommandFailed => "model_command_failed",
        }
    }
}

/// Shell out to the local model runner addressed by `model`, or - when a
/// mock response is configured - return it verbatim without spawning
/// anything (the documented `QUICK_GATE_MOCK_OLLAMA_*` test hook).
pub(super) fn invoke_model(
    model: &str,
    prompt: &str,
    mock: Option<&str>,
    cwd: &Path,
    timeout: Duration,
    verbosity: Verbosity,
) -> Result<String, AdapterFailureReason> {
    if let Some(mocked) = mock {
        return Ok(mocked.to_string());
    }

    let command_line = format!("ollama run {model}");
    output::debug(format!("model: running `{command_line}`"), verbosity);

    let result = command::run_with_stdin(&command_line, cwd, timeout, Some(prompt));

    match &result {
        Ok(outcome) => output::debug(
            format!(
                "model: exit {:?} timed_out={}",
                outcome.exit_code, outcome.timed_out
            ),
            verbosity,
        ),
        Err(err) => output::debug(format!("model: spawn failed: {err}"), verbosity),
    }

    match result {
        Ok(outcome) if outcome.timed_out => Err(AdapterFailureReason::ModelCommandTimeout),
        Ok(outcome) if outcome.exit_code == Some(0) => Ok(outcome.stdout),
        Ok(_) => Err(AdapterFailureReason::ModelCommandFailed),
        Err(CommandError::SpawnFailed { .. }) => Err(AdapterFailureReason::MissingModel),
        Err(CommandError::IoError { .. }) => Err(AdapterFailureReason::ModelCommandFailed),
    }
}

/// Liberal JSON parse: try the full text first, then the
/// brace-balanced substring between the first `{` and the last `}`.
pub(super) fn parse_liberal_json<T: serde::de::DeserializeOwned>(text: &str) -> Option<T> {
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, serde::Deserialize, PartialEq)]
    struct Sample {
        a: i32,
    }

    #[test]
    fn parse_liberal_json_accepts_clean_json() {
        let parsed: Option<Sample> = parse_liberal_json(r#"{"a": 1}"#);
        assert_eq!(parsed, Some(Sample { a: 1 }));
    }

    #[test]
    fn parse_liberal_json_extracts_from_surrounding_prose() {
        let parsed: Option<Sample> =
            parse_liberal_json("Sure, here you go:\n```json\n{\"a\": 2}\n```\nhope that helps!");
        assert_eq!(parsed, Some(Sample { a: 2 }));
    }

    #[test]
    fn parse_liberal_json_rejects_no_braces() {
        let parsed: Option<Sample> = parse_liberal_json("no json here");
        assert!(parsed.is_none());
    }

    #[test]
    fn invoke_model_returns_mock_verbatim_without_spawning() {
        let result = invoke_model(
            "does-not-exist:1b",
            "prompt",
            Some("mocked output"),
            Path::new("/tmp"),
            Duration::from_secs(1),
            Verbosity::Quiet,
        );
        assert_eq!(result, Ok("mocked output".to_string()));
    }
}
