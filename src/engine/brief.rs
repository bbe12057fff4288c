//! engine::brief
//!
//! The agent brief: a pure projection of a [`FailuresReport`]
//! into a shape an agent (or a human skimming a PR comment) can act on
//! without re-deriving anything from `findings[]` itself.

use std::collections::BTreeMap;

use crate::core::types::{AgentBrief, FailuresReport, Finding, Gate, GateStatus, Severity};

const MAX_TOP_FINDINGS: usize = 10;

/// Project `report` into an [`AgentBrief`]. Pure function, no I/O.
pub fn build_brief(report: &FailuresReport) -> AgentBrief {
    let findings_by_gate = count_by_gate(&report.findings);
    let top_findings = top_findings(&report.findings);
    let suggested_next_step = suggest_next_step(report);

    AgentBrief {
        run_id: report.run_id.clone(),
        mode: report.mode,
        status: report.status,
        findings_by_gate,
        top_findings,
        suggested_next_step,
    }
}

fn count_by_gate(findings: &[Finding]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for finding in findings {
        *counts.entry(finding.gate.as_str().to_string()).or_insert(0) += 1;
    }
    counts
}

/// Critical-severity findings first, original order preserved within each
/// severity tier (a stable sort), truncated to `MAX_TOP_FINDINGS`.
fn top_findings(findings: &[Finding]) -> Vec<Finding> {
    let mut ranked: Vec<&Finding> = findings.iter().collect();
    ranked.sort_by_key(|f| severity_rank(f.severity));
    ranked.into_iter().take(MAX_TOP_FINDINGS).cloned().collect()
}

fn severity_rank(severity: Severity) -> u8 {
    match severity {
        Severity::Critical => 0,
        Severity::High => 1,
    }
}

fn suggest_next_step(report: &FailuresReport) -> String {
    if report.status == GateStatus::Pass {
        return "All gates passed; no action needed.".to_string();
    }

    let patchable = report.findings.iter().any(|f| f.gate.is_model_patchable());
    let manual_only = report
        .findings
        .iter()
        .any(|f| matches!(f.gate, Gate::Build | Gate::Lighthouse));

    match (patchable, manual_only) {
        (true, true) => {
            "Run `quick-gate repair` to attempt automated fixes for lint/typecheck findings; \
             build and Lighthouse findings will need manual attention."
                .to_string()
        }
        (true, false) => "Run `quick-gate repair` to attempt automated fixes.".to_string(),
        (false, _) => {
            "No findings here are eligible for automated repair; review build/Lighthouse \
             output manually."
                .to_string()
        }
    }
}

/// Render a brief as the Markdown written to `agent-brief.md`.
pub fn render_markdown(brief: &AgentBrief) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Quick-Gate Run `{}`\n\n", brief.run_id));
    out.push_str(&format!(
        "**Mode:** {}  \n**Status:** {}\n\n",
        mode_label(brief.mode),
        status_label(brief.status)
    ));

    out.push_str("## Findings by gate\n\n");
    if brief.findings_by_gate.is_empty() {
        out.push_str("_No findings._\n\n");
    } else {
        out.push_str("| Gate | Count |\n|---|---|\n");
        for (gate, count) in &brief.findings_by_gate {
            out.push_str(&format!("| {gate} | {count} |\n"));
        }
        out.push('\n');
    }

    out.push_str("## Top findings\n\n");
    if brief.top_findings.is_empty() {
        out.push_str("_None._\n\n");
    } else {
        for finding in &brief.top_findings {
            out.push_str(&format!(
                "- **[{}]** `{}` - {}\n",
                finding.gate.as_str(),
                finding.id,
                finding.summary
            ));
        }
        out.push('\n');
    }

    out.push_str("## Suggested next step\n\n");
    out.push_str(&brief.suggested_next_step);
    out.push('\n');

    out
}

fn mode_label(mode: crate::core::types::Mode) -> &'static str {
    use crate::core::types::Mode;
    match mode {
        Mode::Canary => "canary",
        Mode::Full => "full",
    }
}

fn status_label(status: GateStatus) -> &'static str {
    match status {
        GateStatus::Pass => "pass",
        GateStatus::Fail => "fail",
        GateStatus::Skipped => "skipped",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{GateResult, Mode};

    fn report_with(findings: Vec<Finding>) -> FailuresReport {
        FailuresReport::new(
            "run-1".into(),
            Mode::Canary,
            "2026-01-01T00:00:00Z".into(),
            None,
            None,
            vec![],
            vec![GateResult::skipped(Gate::Build)],
            findings,
        )
    }

    #[test]
    fn passing_report_yields_pass_status_and_no_action_step() {
        let report = report_with(vec![]);
        let brief = build_brief(&report);
        assert_eq!(brief.status, GateStatus::Pass);
        assert!(brief.findings_by_gate.is_empty());
        assert!(brief.suggested_next_step.contains("no action"));
    }

    #[test]
    fn findings_by_gate_counts_each_gate_independently() {
        let findings = vec![
            Finding::new("l1", Gate::Lint, "a"),
            Finding::new("l2", Gate::Lint, "b"),
            Finding::new("t1", Gate::Typecheck, "c"),
        ];
        let brief = build_brief(&report_with(findings));
        assert_eq!(brief.findings_by_gate.get("lint"), Some(&2));
        assert_eq!(brief.findings_by_gate.get("typecheck"), Some(&1));
    }

    #[test]
    fn top_findings_rank_critical_before_high_and_truncate() {
        let mut findings: Vec<Finding> = (0..15).map(|i| Finding::new(format!("f{i}"), Gate::Lint, "x")).collect();
        findings[12] = findings[12].clone().with_severity(Severity::Critical);
        let brief = build_brief(&report_with(findings));
        assert_eq!(brief.top_findings.len(), MAX_TOP_FINDINGS);
        assert_eq!(brief.top_findings[0].id, "f12");
    }

    #[test]
    fn suggested_step_distinguishes_patchable_from_manual_only() {
        let patchable = report_with(vec![Finding::new("l1", Gate::Lint, "a")]);
        assert!(suggest_next_step(&patchable).contains("repair"));

        let manual_only = report_with(vec![Finding::new("b1", Gate::Build, "a")]);
        assert!(suggest_next_step(&manual_only).contains("manually"));

        let mixed = report_with(vec![
            Finding::new("l1", Gate::Lint, "a"),
            Finding::new("b1", Gate::Build, "b"),
        ]);
        assert!(suggest_next_step(&mixed).contains("repair"));
        assert!(suggest_next_step(&mixed).contains("manual"));
    }

    #[test]
    fn markdown_includes_run_id_and_next_step() {
        let brief = build_brief(&report_with(vec![Finding::new("l1", Gate::Lint, "oops")]));
        let markdown = render_markdown(&brief);
        assert!(markdown.contains("run-1"));
        assert!(markdown.contains("oops"));
        assert!(markdown.contains("Suggested next step"));
    }
}
