//! core::config::schema
//!
//! On-disk shape of `quick-gate.config.json`.
//!
//! # Example
//!
//! ```json
//! {
//!   "commands": { "lint": "npm run lint --silent" },
//!   "policy": { "maxAttempts": 5 },
//!   "lighthouse": { "thresholds": { "performance": 0.9 } }
//! }
//! ```
//!
//! Unknown top-level keys are preserved (round-tripped through `extra`)
//! rather than rejected, so a config written by a newer `quick-gate` still
//! loads under an older one without losing a field a human hand-edited.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_MAX_PATCH_LINES: u32 = 150;
pub const DEFAULT_ABORT_ON_NO_IMPROVEMENT: u32 = 2;
pub const DEFAULT_TIME_CAP_MS: u64 = 20 * 60 * 1000;
pub const DEFAULT_LIGHTHOUSE_THRESHOLD: f64 = 0.8;

fn default_thresholds() -> BTreeMap<String, f64> {
    ["performance", "accessibility", "best-practices", "seo"]
        .iter()
        .map(|k| (k.to_string(), DEFAULT_LIGHTHOUSE_THRESHOLD))
        .collect()
}

/// Per-gate command overrides. A missing field falls back to the gate's
/// built-in default (see `engine::gate::resolve_command`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CommandsSection {
    pub lint: Option<String>,
    pub typecheck: Option<String>,
    pub build: Option<String>,
    pub lighthouse: Option<String>,
}

/// Repair-loop budget knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PolicySection {
    pub max_attempts: u32,
    pub max_patch_lines: u32,
    pub abort_on_no_improvement: u32,
    pub time_cap_ms: u64,
}

impl Default for PolicySection {
    fn default() -> Self {
        PolicySection {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_patch_lines: DEFAULT_MAX_PATCH_LINES,
            abort_on_no_improvement: DEFAULT_ABORT_ON_NO_IMPROVEMENT,
            time_cap_ms: DEFAULT_TIME_CAP_MS,
        }
    }
}

/// Lighthouse category thresholds, keyed by category name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LighthouseSection {
    pub thresholds: BTreeMap<String, f64>,
}

impl Default for LighthouseSection {
    fn default() -> Self {
        LighthouseSection {
            thresholds: default_thresholds(),
        }
    }
}

/// Parsed contents of `quick-gate.config.json`.
///
/// `extra` captures any top-level key this build of `quick-gate` doesn't
/// recognize, so writing the config back out doesn't silently drop it.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigFile {
    #[serde(default)]
    pub commands: CommandsSection,
    #[serde(default)]
    pub policy: PolicySection,
    #[serde(default)]
    pub lighthouse: LighthouseSection,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ConfigFile {
    /// Lighthouse threshold for `category`, falling back to the built-in
    /// default of 0.8 when the category isn't listed.
    pub fn threshold_for(&self, category: &str) -> f64 {
        self.lighthouse
            .thresholds
            .get(category)
            .copied()
            .unwrap_or(DEFAULT_LIGHTHOUSE_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ConfigFile::default();
        assert_eq!(config.policy.max_attempts, 3);
        assert_eq!(config.policy.max_patch_lines, 150);
        assert_eq!(config.policy.abort_on_no_improvement, 2);
        assert_eq!(config.policy.time_cap_ms, 20 * 60 * 1000);
        assert_eq!(config.threshold_for("performance"), 0.8);
        assert_eq!(config.threshold_for("unknown-category"), 0.8);
    }

    #[test]
    fn unknown_top_level_keys_preserved() {
        let raw = r#"{
            "commands": { "lint": "npm run lint" },
            "futureFeature": { "enabled": true }
        }"#;
        let config: ConfigFile = serde_json::from_str(raw).unwrap();
        assert_eq!(config.commands.lint.as_deref(), Some("npm run lint"));
        assert!(config.extra.contains_key("futureFeature"));

        let rewritten = serde_json::to_value(&config).unwrap();
        assert!(rewritten.get("futureFeature").is_some());
    }

    #[test]
    fn policy_overrides_are_camel_case() {
        let raw = r#"{ "policy": { "maxAttempts": 7, "timeCapMs": 1000 } }"#;
        let config: ConfigFile = serde_json::from_str(raw).unwrap();
        assert_eq!(config.policy.max_attempts, 7);
        assert_eq!(config.policy.time_cap_ms, 1000);
        assert_eq!(config.policy.max_patch_lines, DEFAULT_MAX_PATCH_LINES);
    }

    #[test]
    fn custom_lighthouse_thresholds() {
        let raw = r#"{ "lighthouse": { "thresholds": { "performance": 0.95 } } }"#;
        let config: ConfigFile = serde_json::from_str(raw).unwrap();
        assert_eq!(config.threshold_for("performance"), 0.95);
    }
}
