//! engine::lighthouse
//!
//! Parses the Lighthouse audit tool's assertion-results artifact into
//! per-route, per-metric [`Finding`]s with threshold attribution.

use std::path::Path;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::core::config::Config;
use crate::core::types::{Finding, FindingRaw, Gate, Severity, ThresholdSource};

/// Path the audit tool's fallback command is assumed to write its
/// assertion-results artifact to, relative to the working directory.
const ASSERTION_RESULTS_PATH: &str = ".lighthouseci/assertion-results.json";

#[derive(Debug, Error)]
pub enum LighthouseError {
    #[error("failed to read assertion-results artifact '{path}': {source}")]
    ReadError {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse assertion-results artifact: {0}")]
    ParseError(String),
}

#[derive(Debug, Deserialize)]
struct AssertionResult {
    passed: bool,
    url: String,
    assertion: String,
    #[serde(default)]
    #[serde(rename = "numericValue")]
    numeric_value: Option<f64>,
    #[serde(default)]
    expected: Option<serde_json::Value>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    level: Option<String>,
    #[serde(default)]
    #[serde(rename = "auditProperty")]
    audit_property: Option<String>,
}

/// Read and parse the assertion-results artifact at `cwd`, turning each
/// failing assertion into a `Finding`. A missing or unparsable artifact is
/// treated as "no structured findings" rather than an error, so the gate
/// runner's exit-code fallback applies.
pub fn extract_lighthouse_findings(
    cwd: &Path,
    config: &Config,
) -> Result<Vec<Finding>, LighthouseError> {
    let path = cwd.join(ASSERTION_RESULTS_PATH);
    if !path.exists() {
        return Ok(Vec::new());
    }

    let contents = std::fs::read_to_string(&path).map_err(|e| LighthouseError::ReadError {
        path: path.clone(),
        source: e,
    })?;

    let results: Vec<AssertionResult> =
        serde_json::from_str(&contents).map_err(|e| LighthouseError::ParseError(e.to_string()))?;

    Ok(results
        .into_iter()
        .filter(|r| !r.passed)
        .map(|r| finding_from_assertion(r, config))
        .collect())
}

fn finding_from_assertion(result: AssertionResult, config: &Config) -> Finding {
    let route = route_from_url(&result.url);
    let metric = result.assertion.clone();
    let threshold_source = attribute_threshold(&result, config);

    let actual = result
        .numeric_value
        .map(|v| v.to_string())
        .or_else(|| result.message.clone())
        .unwrap_or_else(|| "n/a".to_string());

    let threshold = match &threshold_source {
        ThresholdSource::AssertionExpected => result.expected.as_ref().map(value_to_string),
        ThresholdSource::ConfigCategory(name) => Some(config.lighthouse_threshold(name).to_string()),
        ThresholdSource::ConfigMetric(name) => Some(config.lighthouse_threshold(name).to_string()),
        ThresholdSource::Unknown => None,
    };

    let id = format!("lh_{}_{}", slug(&route), slug(&metric));

    let mut finding = Finding::new(
        id,
        Gate::Lighthouse,
        result
            .message
            .clone()
            .unwrap_or_else(|| format!("{} failed for {}", metric, route)),
    )
    .with_severity(Severity::High);

    finding.route = Some(route);
    finding.metric = Some(metric);
    finding.actual = Some(actual);
    finding.threshold = threshold;
    finding.raw = FindingRaw {
        stdout_excerpt: None,
        stderr_excerpt: None,
        threshold_source: Some(threshold_source.as_tag()),
    };
    let _ = result.level;
    let _ = result.audit_property;
    finding
}

/// Route attribution: the path component of `url`, query stripped, `/` if
/// the URL can't be parsed.
fn route_from_url(url: &str) -> String {
    let without_scheme = url.splitn(2, "://").nth(1).unwrap_or(url);
    let path_and_query = without_scheme.splitn(2, '/').nth(1).unwrap_or("");
    let path = path_and_query.split('?').next().unwrap_or("");
    if path.is_empty() {
        "/".to_string()
    } else {
        format!("/{path}")
    }
}

/// Threshold attribution, first match wins.
fn attribute_threshold(result: &AssertionResult, config: &Config) -> ThresholdSource {
    if result.expected.is_some() {
        return ThresholdSource::AssertionExpected;
    }

    if let Some(category) = result.assertion.strip_prefix("categories:") {
        if config.file.lighthouse.thresholds.contains_key(category) {
            return ThresholdSource::ConfigCategory(category.to_string());
        }
    }

    if config
        .file
        .lighthouse
        .thresholds
        .contains_key(&result.assertion)
    {
        return ThresholdSource::ConfigMetric(result.assertion.clone());
    }

    ThresholdSource::Unknown
}

fn slug(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_underscore = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_underscore = false;
        } else if !last_was_underscore {
            out.push('_');
            last_was_underscore = true;
        }
    }
    out.trim_matches('_').to_string()
}

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Fallback finding when the lighthouse gate exits non-zero but the
/// assertion-results artifact is missing or yields no findings.
///
/// The id is keyed on the fixed pair `(route="_exitcode_", metric="lighthouse")`
/// with a short hash of the command line appended, so it stays stable
/// across reruns of the same command rather than drifting with a
/// timestamp.
pub fn fallback_finding(command_line: &str, stdout: &str, stderr: &str) -> Finding {
    let mut hasher = Sha256::new();
    hasher.update(command_line.as_bytes());
    let digest = hasher.finalize();
    let suffix = hex::encode(&digest[..4]);

    let mut finding = Finding::new(
        format!("lh_{}_{}_{}", slug("_exitcode_"), slug("lighthouse"), suffix),
        Gate::Lighthouse,
        format!("`{command_line}` exited non-zero and produced no assertion results"),
    )
    .with_severity(Severity::High);

    finding.raw = FindingRaw {
        stdout_excerpt: Some(stdout.lines().take(30).collect::<Vec<_>>().join("\n")),
        stderr_excerpt: Some(stderr.lines().take(30).collect::<Vec<_>>().join("\n")),
        threshold_source: Some(ThresholdSource::Unknown.as_tag()),
    };
    finding
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_artifact_yields_no_findings() {
        let temp = TempDir::new().unwrap();
        let config = Config::default();
        let findings = extract_lighthouse_findings(temp.path(), &config).unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn route_from_url_strips_scheme_and_query() {
        assert_eq!(route_from_url("https://example.com/checkout?x=1"), "/checkout");
        assert_eq!(route_from_url("https://example.com"), "/");
        assert_eq!(route_from_url("not a url"), "/");
    }

    #[test]
    fn threshold_attribution_prefers_assertion_expected() {
        let result = AssertionResult {
            passed: false,
            url: "https://example.com/".to_string(),
            assertion: "categories:performance".to_string(),
            numeric_value: None,
            expected: Some(serde_json::json!(0.9)),
            message: None,
            level: None,
            audit_property: None,
        };
        let config = Config::default();
        assert_eq!(
            attribute_threshold(&result, &config),
            ThresholdSource::AssertionExpected
        );
    }

    #[test]
    fn threshold_attribution_falls_back_to_config_category() {
        let result = AssertionResult {
            passed: false,
            url: "https://example.com/".to_string(),
            assertion: "categories:performance".to_string(),
            numeric_value: None,
            expected: None,
            message: None,
            level: None,
            audit_property: None,
        };
        let config = Config::default();
        assert_eq!(
            attribute_threshold(&result, &config),
            ThresholdSource::ConfigCategory("performance".to_string())
        );
    }

    #[test]
    fn threshold_attribution_unknown_when_no_match() {
        let result = AssertionResult {
            passed: false,
            url: "https://example.com/".to_string(),
            assertion: "some-custom-metric".to_string(),
            numeric_value: None,
            expected: None,
            message: None,
            level: None,
            audit_property: None,
        };
        let config = Config::default();
        assert_eq!(attribute_threshold(&result, &config), ThresholdSource::Unknown);
    }

    #[test]
    fn fallback_finding_id_is_stable_across_calls() {
        let a = fallback_finding("npx lhci autorun", "out", "err");
        let b = fallback_finding("npx lhci autorun", "different stdout", "different stderr");
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn extract_parses_failing_assertions_from_disk() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(".lighthouseci")).unwrap();
        std::fs::write(
            temp.path().join(".lighthouseci/assertion-results.json"),
            r#"[
                {"passed": true, "url": "https://example.com/", "assertion": "categories:seo"},
                {"passed": false, "url": "https://example.com/checkout", "assertion": "categories:performance", "numericValue": 0.4}
            ]"#,
        )
        .unwrap();
        let config = Config::default();
        let findings = extract_lighthouse_findings(temp.path(), &config).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].route.as_deref(), Some("/checkout"));
        assert_eq!(
            findings[0].raw.threshold_source.as_deref(),
            Some("config_category:performance")
        );
    }
}
