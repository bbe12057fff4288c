//! engine::adapters::context
//!
//! The context gatherer shared by the hint and patch adapters:
//! deduplicated file snippets, a reduced view of the current findings, and
//! the `allowed_files` scope set.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;

use crate::core::types::Finding;

const MAX_SNIPPETS: usize = 3;
const SNIPPET_LINES: usize = 40;
const MAX_ALLOWED_FILES: usize = 12;
const MAX_RAW_CONTEXT_CHARS: usize = 600;

/// First `SNIPPET_LINES` of a file touched by this attempt.
#[derive(Debug, Clone, Serialize)]
pub struct FileSnippet {
    pub path: String,
    pub content: String,
}

/// A finding reduced to what a model needs to propose a fix, per the documented contract.
#[derive(Debug, Clone, Serialize)]
pub struct ReducedFinding {
    pub id: String,
    pub gate: String,
    pub summary: String,
    pub files: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    pub raw_context: String,
}

/// Everything an adapter needs to build a prompt.
#[derive(Debug, Clone, Serialize)]
pub struct AdapterContext {
    pub file_snippets: Vec<FileSnippet>,
    pub findings: Vec<ReducedFinding>,
    pub allowed_files: Vec<String>,
}

/// Gather context for one adapter invocation.
///
/// `changed_files` and each finding's `files` are merged preserving
/// insertion order and deduplicated; that merged list backs both the
/// snippet selection and `allowed_files`.
pub fn gather(cwd: &Path, changed_files: &[String], findings: &[Finding]) -> AdapterContext {
    let merged = merged_file_list(changed_files, findings);

    let file_snippets = merged
        .iter()
        .filter_map(|path| read_snippet(cwd, path))
        .take(MAX_SNIPPETS)
        .collect();

    let reduced_findings = findings.iter().map(reduce_finding).collect();

    let allowed_files = merged.into_iter().take(MAX_ALLOWED_FILES).collect();

    AdapterContext {
        file_snippets,
        findings: reduced_findings,
        allowed_files,
    }
}

fn merged_file_list(changed_files: &[String], findings: &[Finding]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut merged = Vec::new();
    for file in changed_files.iter().chain(findings.iter().flat_map(|f| f.files.iter())) {
        if seen.insert(file.clone()) {
            merged.push(file.clone());
        }
    }
    merged
}

fn read_snippet(cwd: &Path, path: &str) -> Option<FileSnippet> {
    let full_path = cwd.join(path);
    let contents = std::fs::read_to_string(&full_path).ok()?;
    let snippet: String = contents.lines().take(SNIPPET_LINES).collect::<Vec<_>>().join("\n");
    Some(FileSnippet {
        path: path.to_string(),
        content: snippet,
    })
}

fn reduce_finding(finding: &Finding) -> ReducedFinding {
    let raw_context = finding
        .raw
        .stderr_excerpt
        .as_deref()
        .or(finding.raw.stdout_excerpt.as_deref())
        .unwrap_or("");
    let raw_context: String = raw_context.chars().take(MAX_RAW_CONTEXT_CHARS).collect();

    ReducedFinding {
        id: finding.id.clone(),
        gate: finding.gate.as_str().to_string(),
        summary: finding.summary.clone(),
        files: finding.files.clone(),
        metric: finding.metric.clone(),
        route: finding.route.clone(),
        raw_context,
    }
}
