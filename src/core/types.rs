//! core::types
//!
//! The structured finding model and the JSON-serializable artifacts that
//! flow between the gate runner, the repair loop, and disk.
//!
//! # Types
//!
//! - [`Finding`] - a single normalized gate failure
//! - [`GateResult`] - pass/fail/skipped outcome for one gate
//! - [`CommandTrace`] - verbatim record of one external command invocation
//! - [`FailuresReport`] - the canonical current-state document
//! - [`EditPlan`] / [`EditOp`] - a candidate set of line-range replacements
//! - [`HintList`] / [`Hint`] - model-produced repair hints
//! - [`AttemptRecord`] / [`Action`] - one repair-loop iteration
//! - [`RepairReport`] / [`Escalation`] - the two mutually exclusive terminal documents
//!
//! # Invariants
//!
//! `FailuresReport::status` is derived, never set directly: it is `Pass`
//! if and only if `findings` is empty. See [`FailuresReport::new`].

use serde::{Deserialize, Serialize};

/// Which deterministic check produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gate {
    Lint,
    Typecheck,
    Build,
    Lighthouse,
}

impl Gate {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gate::Lint => "lint",
            Gate::Typecheck => "typecheck",
            Gate::Build => "build",
            Gate::Lighthouse => "lighthouse",
        }
    }

    /// Gates a model-generated patch may plausibly fix; build and lighthouse
    /// failures never trigger the patch adapter.
    pub fn is_model_patchable(&self) -> bool {
        matches!(self, Gate::Lint | Gate::Typecheck)
    }
}

/// Run mode: canary skips the build gate, full runs everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Canary,
    Full,
}

impl Mode {
    pub fn runs_build(&self) -> bool {
        matches!(self, Mode::Full)
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "canary" => Ok(Mode::Canary),
            "full" => Ok(Mode::Full),
            other => Err(format!("invalid mode '{other}', expected canary or full")),
        }
    }
}

/// Pass/fail/skipped outcome of a single gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateStatus {
    Pass,
    Fail,
    Skipped,
}

/// One planned-gate outcome. Exactly one entry per planned gate per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateResult {
    pub name: Gate,
    pub status: GateStatus,
    pub duration_ms: u64,
}

impl GateResult {
    pub fn skipped(name: Gate) -> Self {
        Self {
            name,
            status: GateStatus::Skipped,
            duration_ms: 0,
        }
    }
}

/// Severity of a finding. The closed set is high/critical; gate runner
/// findings are currently always `high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Critical,
}

/// Where a Lighthouse threshold came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdSource {
    AssertionExpected,
    ConfigCategory(String),
    ConfigMetric(String),
    Unknown,
}

impl ThresholdSource {
    /// Serialized form used inside `raw.threshold_source`, matching the
    /// spec's `config_category:<name>` / `config_metric:<name>` tagging.
    pub fn as_tag(&self) -> String {
        match self {
            ThresholdSource::AssertionExpected => "assertion_expected".to_string(),
            ThresholdSource::ConfigCategory(name) => format!("config_category:{name}"),
            ThresholdSource::ConfigMetric(name) => format!("config_metric:{name}"),
            ThresholdSource::Unknown => "unknown".to_string(),
        }
    }
}

/// Raw trace excerpts and attribution metadata attached to a finding.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FindingRaw {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stdout_excerpt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr_excerpt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold_source: Option<String>,
}

/// A single normalized gate failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub gate: Gate,
    pub severity: Severity,
    pub summary: String,
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<String>,
    /// Always "fail" - findings are only ever emitted for failures.
    pub status: &'static str,
    pub raw: FindingRaw,
}

impl Finding {
    pub fn new(id: impl Into<String>, gate: Gate, summary: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            gate,
            severity: Severity::High,
            summary: summary.into(),
            files: Vec::new(),
            route: None,
            metric: None,
            actual: None,
            threshold: None,
            status: "fail",
            raw: FindingRaw::default(),
        }
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

/// Verbatim record of one external command invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandTrace {
    pub command: String,
    pub cwd: String,
    pub started_at: String,
    pub duration_ms: u64,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
}

/// The canonical current-state document produced by every gate run and
/// replaced on every rerun.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailuresReport {
    pub version: u32,
    pub run_id: String,
    pub mode: Mode,
    pub status: GateStatus,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub changed_files: Vec<String>,
    pub gates: Vec<GateResult>,
    pub findings: Vec<Finding>,
    pub inferred_hints: Vec<String>,
}

impl FailuresReport {
    /// `status` is derived from `findings`, never set independently -
    /// this is the invariant from the documented contract: `status=pass ⇔ findings=∅`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        run_id: String,
        mode: Mode,
        timestamp: String,
        repo: Option<String>,
        branch: Option<String>,
        changed_files: Vec<String>,
        gates: Vec<GateResult>,
        findings: Vec<Finding>,
    ) -> Self {
        let status = if findings.is_empty() {
            GateStatus::Pass
        } else {
            GateStatus::Fail
        };
        Self {
            version: 1,
            run_id,
            mode,
            status,
            timestamp,
            repo,
            branch,
            changed_files,
            gates,
            findings,
            inferred_hints: Vec::new(),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self.status, GateStatus::Pass)
    }
}

/// Validate a [`FailuresReport`] against the documented Failures schema
/// before it is written to disk. Returns the first violation found.
///
/// Checks the invariants from the testable-properties contract:
/// `status=pass ⇔ findings=∅`, and every Lighthouse finding carries a
/// `raw.threshold_source` drawn from the closed attribution tag set.
pub fn validate_failures_report(report: &FailuresReport) -> Result<(), String> {
    let should_pass = report.findings.is_empty();
    if report.is_pass() != should_pass {
        return Err(format!(
            "status={:?} but findings.is_empty()={should_pass}",
            report.status
        ));
    }

    for finding in &report.findings {
        if finding.gate == Gate::Lighthouse {
            match finding.raw.threshold_source.as_deref() {
                Some(tag)
                    if tag == "assertion_expected"
                        || tag == "unknown"
                        || tag.starts_with("config_category:")
                        || tag.starts_with("config_metric:") => {}
                other => {
                    return Err(format!(
                        "lighthouse finding '{}' has invalid threshold_source: {other:?}",
                        finding.id
                    ));
                }
            }
        }
    }

    Ok(())
}

/// Validate an [`AgentBrief`] before it is written to disk: the derived
/// per-gate counts must sum to exactly the number of findings they were
/// projected from (a brief is a pure projection, never independent state).
pub fn validate_agent_brief(brief: &AgentBrief) -> Result<(), String> {
    let counted: usize = brief.findings_by_gate.values().sum();
    let should_pass = counted == 0;
    if (brief.status == GateStatus::Pass) != should_pass {
        return Err(format!(
            "status={:?} but findings_by_gate totals {counted}",
            brief.status
        ));
    }
    Ok(())
}

/// One proposed line-range replacement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditOp {
    pub file: String,
    pub start_line: u32,
    pub end_line: u32,
    pub replacement: String,
}

/// A candidate set of edits produced by the patch adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditPlan {
    pub summary: String,
    pub edits: Vec<EditOp>,
}

/// Model confidence in a hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        }
    }
}

/// One model-produced repair hint, tied to an existing finding id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hint {
    pub finding_id: String,
    pub hint: String,
    pub confidence: Confidence,
}

/// Up to 6 hints returned by the hint adapter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HintList {
    pub hints: Vec<Hint>,
}

/// One action taken during a repair attempt, with a strategy tag and a
/// machine-readable reason (terminal within the action, non-terminal to
/// the loop - see "in-attempt action reasons").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub strategy: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl Action {
    pub fn new(strategy: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            reason: None,
            command: None,
            exit_code: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>, exit_code: i32) -> Self {
        self.command = Some(command.into());
        self.exit_code = Some(exit_code);
        self
    }
}

/// One repair-loop iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub patch_lines: u32,
    pub before_findings: usize,
    pub after_findings: usize,
    pub improved: bool,
    pub worsened: bool,
    pub status: GateStatus,
    pub actions: Vec<Action>,
}

/// Emitted iff the loop terminated with a passing rerun.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairReport {
    pub status: &'static str,
    pub attempts: Vec<AttemptRecord>,
}

impl RepairReport {
    pub fn new(attempts: Vec<AttemptRecord>) -> Self {
        Self {
            status: "pass",
            attempts,
        }
    }
}

/// Taxonomy of terminal escalation reason codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    NoImprovement,
    PatchBudgetExceeded,
    UnknownBlocker,
    ArchitecturalChangeRequired,
    FlakyEvaluator,
}

/// The loop's terminal "I cannot safely proceed" state.
/// Mutually exclusive with [`RepairReport`] - exactly one is ever written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Escalation {
    pub status: &'static str,
    pub reason_code: ReasonCode,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub evidence: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub attempts: Vec<AttemptRecord>,
}

impl Escalation {
    pub fn new(reason_code: ReasonCode, message: impl Into<String>) -> Self {
        Self {
            status: "escalated",
            reason_code,
            message: message.into(),
            evidence: Vec::new(),
            attempts: Vec::new(),
        }
    }

    pub fn with_evidence(mut self, evidence: Vec<String>) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn with_attempts(mut self, attempts: Vec<AttemptRecord>) -> Self {
        self.attempts = attempts;
        self
    }
}

/// Descriptive metadata written alongside `failures.json`; never read back
/// by the repair loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub duration_ms: u64,
    pub mode: Mode,
    pub gate_commands: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

/// A derived, human-and-agent-readable projection of a [`FailuresReport`].
/// Pure projection - no independent state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentBrief {
    pub run_id: String,
    pub mode: Mode,
    pub status: GateStatus,
    pub findings_by_gate: std::collections::BTreeMap<String, usize>,
    pub top_findings: Vec<Finding>,
    pub suggested_next_step: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_report_status_derives_from_findings() {
        let pass = FailuresReport::new(
            "r1".into(),
            Mode::Canary,
            "2026-01-01T00:00:00Z".into(),
            None,
            None,
            vec![],
            vec![],
            vec![],
        );
        assert!(pass.is_pass());

        let finding = Finding::new("f1", Gate::Lint, "bad thing");
        let fail = FailuresReport::new(
            "r2".into(),
            Mode::Canary,
            "2026-01-01T00:00:00Z".into(),
            None,
            None,
            vec![],
            vec![],
            vec![finding],
        );
        assert!(!fail.is_pass());
        assert_eq!(fail.status, GateStatus::Fail);
    }

    #[test]
    fn threshold_source_tags_match_spec() {
        assert_eq!(
            ThresholdSource::ConfigCategory("performance".into()).as_tag(),
            "config_category:performance"
        );
        assert_eq!(
            ThresholdSource::ConfigMetric("first-contentful-paint".into()).as_tag(),
            "config_metric:first-contentful-paint"
        );
        assert_eq!(ThresholdSource::Unknown.as_tag(), "unknown");
    }

    #[test]
    fn mode_from_str_rejects_unknown() {
        assert!("canary".parse::<Mode>().is_ok());
        assert!("full".parse::<Mode>().is_ok());
        assert!("staging".parse::<Mode>().is_err());
    }

    #[test]
    fn gate_model_patchable() {
        assert!(Gate::Lint.is_model_patchable());
        assert!(Gate::Typecheck.is_model_patchable());
        assert!(!Gate::Build.is_model_patchable());
        assert!(!Gate::Lighthouse.is_model_patchable());
    }
}
