//! core::config
//!
//! Configuration loading and the resolved, immutable policy the rest of
//! the crate runs against.
//!
//! # Overview
//!
//! Configuration comes from two places:
//! - **File**: `quick-gate.config.json` in the working directory, covering
//!   gate command overrides, repair-loop budgets, and Lighthouse
//!   thresholds.
//! - **Environment**: model selection and debug/mock hooks, read once per
//!   invocation into [`ModelPolicy`] rather than consulted ambiently.
//!
//! Missing config files are not an error; defaults apply. A config file
//! that fails to parse as JSON is.
//!
//! # Example
//!
//! ```no_run
//! use quick_gate::core::config::Config;
//! use std::path::Path;
//!
//! let result = Config::load(Path::new("/path/to/project")).unwrap();
//! let config = result.config;
//! println!("max attempts: {}", config.max_attempts());
//! ```

pub mod schema;

pub use schema::ConfigFile;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "quick-gate.config.json";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Result of loading configuration.
#[derive(Debug)]
pub struct ConfigLoadResult {
    pub config: Config,
    /// Path the config file was loaded from, if one existed.
    pub loaded_from: Option<PathBuf>,
}

/// Resolved configuration for a single invocation.
///
/// Wraps the parsed [`ConfigFile`] with precedence-aware accessors so
/// callers never need to reach into `commands`/`policy`/`lighthouse`
/// directly.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub file: ConfigFile,
    loaded_from: Option<PathBuf>,
}

impl Config {
    /// Load `quick-gate.config.json` from `cwd`, or fall back to defaults
    /// if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but isn't valid JSON.
    pub fn load(cwd: &Path) -> Result<ConfigLoadResult, ConfigError> {
        let path = cwd.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(ConfigLoadResult {
                config: Config {
                    file: ConfigFile::default(),
                    loaded_from: None,
                },
                loaded_from: None,
            });
        }

        let contents = fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
            path: path.clone(),
            source: e,
        })?;

        let file: ConfigFile =
            serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
                path: path.clone(),
                message: e.to_string(),
            })?;

        Ok(ConfigLoadResult {
            config: Config {
                file,
                loaded_from: Some(path.clone()),
            },
            loaded_from: Some(path),
        })
    }

    /// Write `file` to `quick-gate.config.json` under `cwd`, atomically
    /// (temp file then rename).
    pub fn write(cwd: &Path, file: &ConfigFile) -> Result<PathBuf, ConfigError> {
        let path = cwd.join(CONFIG_FILE_NAME);
        let contents = serde_json::to_string_pretty(file)
            .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let temp_path = path.with_extension("json.tmp");
        let mut temp = fs::File::create(&temp_path).map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;
        temp.write_all(contents.as_bytes())
            .map_err(|e| ConfigError::WriteError {
                path: temp_path.clone(),
                source: e,
            })?;
        temp.sync_all().map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;
        fs::rename(&temp_path, &path).map_err(|e| ConfigError::WriteError {
            path: path.clone(),
            source: e,
        })?;

        Ok(path)
    }

    /// Path the config was loaded from, if any.
    pub fn loaded_from(&self) -> Option<&Path> {
        self.loaded_from.as_deref()
    }

    // -------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------

    pub fn command_override(&self, gate: crate::core::types::Gate) -> Option<&str> {
        use crate::core::types::Gate;
        match gate {
            Gate::Lint => self.file.commands.lint.as_deref(),
            Gate::Typecheck => self.file.commands.typecheck.as_deref(),
            Gate::Build => self.file.commands.build.as_deref(),
            Gate::Lighthouse => self.file.commands.lighthouse.as_deref(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.file.policy.max_attempts
    }

    pub fn max_patch_lines(&self) -> u32 {
        self.file.policy.max_patch_lines
    }

    pub fn abort_on_no_improvement(&self) -> u32 {
        self.file.policy.abort_on_no_improvement
    }

    pub fn time_cap_ms(&self) -> u64 {
        self.file.policy.time_cap_ms
    }

    pub fn lighthouse_threshold(&self, category: &str) -> f64 {
        self.file.threshold_for(category)
    }
}

/// Model selection and debug/mock hooks, read once per invocation from
/// the environment rather than consulted ambiently mid-run.
///
/// Grounded in the documented `QUICK_GATE_*` variables; defaults match
/// those a fresh checkout would see with no environment configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPolicy {
    pub hint_model: String,
    pub patch_model: String,
    pub allow_hint_only_patch: bool,
    pub model_timeout_ms: u64,
    pub mock_hint_response: Option<String>,
    pub mock_patch_response: Option<String>,
    pub debug: bool,
}

impl ModelPolicy {
    pub const DEFAULT_HINT_MODEL: &'static str = "qwen2.5:1.5b";
    pub const DEFAULT_PATCH_MODEL: &'static str = "mistral:7b";
    pub const DEFAULT_MODEL_TIMEOUT_MS: u64 = 60_000;

    /// Read the model policy from the process environment.
    pub fn from_env() -> Self {
        ModelPolicy {
            hint_model: std::env::var("QUICK_GATE_HINT_MODEL")
                .unwrap_or_else(|_| Self::DEFAULT_HINT_MODEL.to_string()),
            patch_model: std::env::var("QUICK_GATE_PATCH_MODEL")
                .unwrap_or_else(|_| Self::DEFAULT_PATCH_MODEL.to_string()),
            allow_hint_only_patch: env_flag("QUICK_GATE_ALLOW_HINT_ONLY_PATCH"),
            model_timeout_ms: std::env::var("QUICK_GATE_MODEL_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(Self::DEFAULT_MODEL_TIMEOUT_MS),
            mock_hint_response: std::env::var("QUICK_GATE_MOCK_OLLAMA_HINT").ok(),
            mock_patch_response: std::env::var("QUICK_GATE_MOCK_OLLAMA_PATCH").ok(),
            debug: env_flag("QUICK_GATE_DEBUG"),
        }
    }
}

pub(crate) fn env_flag(name: &str) -> bool {
    matches!(
        std::env::var(name).ok().as_deref(),
        Some("1") | Some("true") | Some("TRUE") | Some("yes")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_missing_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let result = Config::load(temp.path()).unwrap();
        assert!(result.loaded_from.is_none());
        assert_eq!(result.config.max_attempts(), 3);
    }

    #[test]
    fn load_parses_existing_file() {
        let temp = TempDir::new().unwrap();
        fs::write(
            temp.path().join(CONFIG_FILE_NAME),
            r#"{ "policy": { "maxAttempts": 5 } }"#,
        )
        .unwrap();

        let result = Config::load(temp.path()).unwrap();
        assert!(result.loaded_from.is_some());
        assert_eq!(result.config.max_attempts(), 5);
    }

    #[test]
    fn load_rejects_invalid_json() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join(CONFIG_FILE_NAME), "{ not json").unwrap();
        assert!(Config::load(temp.path()).is_err());
    }

    #[test]
    fn write_then_load_roundtrips() {
        let temp = TempDir::new().unwrap();
        let mut file = ConfigFile::default();
        file.commands.lint = Some("npm run lint".to_string());

        let path = Config::write(temp.path(), &file).unwrap();
        assert!(path.exists());

        let result = Config::load(temp.path()).unwrap();
        assert_eq!(
            result.config.command_override(crate::core::types::Gate::Lint),
            Some("npm run lint")
        );
    }

    #[test]
    fn model_policy_defaults_without_env() {
        for var in [
            "QUICK_GATE_HINT_MODEL",
            "QUICK_GATE_PATCH_MODEL",
            "QUICK_GATE_ALLOW_HINT_ONLY_PATCH",
            "QUICK_GATE_MODEL_TIMEOUT_MS",
            "QUICK_GATE_MOCK_OLLAMA_HINT",
            "QUICK_GATE_MOCK_OLLAMA_PATCH",
            "QUICK_GATE_DEBUG",
        ] {
            std::env::remove_var(var);
        }

        let policy = ModelPolicy::from_env();
        assert_eq!(policy.hint_model, ModelPolicy::DEFAULT_HINT_MODEL);
        assert_eq!(policy.patch_model, ModelPolicy::DEFAULT_PATCH_MODEL);
        assert!(!policy.allow_hint_only_patch);
        assert_eq!(policy.model_timeout_ms, ModelPolicy::DEFAULT_MODEL_TIMEOUT_MS);
        assert!(!policy.debug);
    }
}
