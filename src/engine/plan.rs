//! engine::plan
//!
//! Edit-plan validator/applier. Takes a raw `EditPlan`
//! proposed by the patch model adapter and either applies it atomically to
//! the workspace or rejects it with one of the typed in-attempt reasons
//! from the documented contract.
//!
//! Validation is staged and each stage is terminal on failure - the first
//! rejection wins, in a fixed pipeline:
//!
//! 1. normalize (drop malformed edits, reject if none remain)
//! 2. sanitize paths (cwd-rooted absolutes -> relative, reject others)
//! 3. scope check against `allowed_files`
//! 4. predicted size vs `maxPatchLines`
//! 5. relevance score vs the 0.5 threshold
//! 6. apply (verify line ranges, splice, persist)

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::types::{EditOp, EditPlan};

/// Diff-score weights and threshold.
const RELEVANCE_THRESHOLD: f64 = 0.5;
const OVERLAP_WEIGHT: f64 = 0.7;
const LINE_SCORE_WEIGHT: f64 = 0.3;

/// Why a candidate edit plan was rejected before being applied. Mirrors
/// the in-attempt action reasons from the documented contract.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("edit plan had zero valid edits after normalization")]
    InvalidEditPlanJson,

    #[error("file(s) out of scope: {0:?}")]
    FileOutOfScope(Vec<String>),

    #[error("patch_budget_exceeded: predicted {predicted} lines > budget {budget}")]
    PatchBudgetExceeded { predicted: u32, budget: u32 },

    #[error("diff_score_too_low: {0:.2} < {RELEVANCE_THRESHOLD}")]
    DiffScoreTooLow(f64),

    #[error("apply_plan_failed: missing_file:{0}")]
    MissingFile(String),

    #[error("apply_plan_failed: invalid_line_range:{path}:{start}-{end}")]
    InvalidLineRange { path: String, start: u32, end: u32 },
}

impl PlanError {
    /// Stable machine-readable tag, matching the action-reason strings.
    pub fn reason_tag(&self) -> String {
        match self {
            PlanError::InvalidEditPlanJson => "invalid_edit_plan_json".to_string(),
            PlanError::FileOutOfScope(_) => "file_out_of_scope".to_string(),
            PlanError::PatchBudgetExceeded { .. } => "patch_budget_exceeded".to_string(),
            PlanError::DiffScoreTooLow(_) => "diff_score_too_low".to_string(),
            PlanError::MissingFile(p) => format!("missing_file:{p}"),
            PlanError::InvalidLineRange { path, start, end } => {
                format!("invalid_line_range:{path}:{start}-{end}")
            }
        }
    }
}

/// A normalized, in-scope, sized, and scored edit ready to apply.
struct NormalizedEdit {
    file: String,
    start_line: u32,
    end_line: u32,
    replacement: String,
}

/// Result of successfully applying a plan.
#[derive(Debug, Clone)]
pub struct AppliedPlan {
    pub score: f64,
    pub patch_lines: u32,
    pub touched_files: Vec<String>,
}

/// Stage 1: normalize raw edits. An edit is malformed when its file is
/// empty or `end_line < start_line < 1`; malformed edits are dropped
/// rather than failing the whole plan outright - only an empty result
/// set is terminal.
fn normalize(plan: &EditPlan) -> Result<Vec<NormalizedEdit>, PlanError> {
    let normalized: Vec<NormalizedEdit> = plan
        .edits
        .iter()
        .filter(|e| !e.file.trim().is_empty() && e.start_line >= 1 && e.end_line >= e.start_line)
        .map(|e| NormalizedEdit {
            file: e.file.clone(),
            start_line: e.start_line,
            end_line: e.end_line,
            replacement: e.replacement.clone(),
        })
        .collect();

    if normalized.is_empty() {
        return Err(PlanError::InvalidEditPlanJson);
    }
    Ok(normalized)
}

/// Stage 2: path sanitization. Absolute paths rooted at `cwd` are rewritten
/// relative; any other absolute path is out of scope (surfaced in stage 3,
/// since an un-rootable absolute path can never appear in `allowed_files`).
fn sanitize_paths(edits: &mut [NormalizedEdit], cwd: &Path) {
    for edit in edits.iter_mut() {
        let path = Path::new(&edit.file);
        if path.is_absolute() {
            if let Ok(rel) = path.strip_prefix(cwd) {
                edit.file = rel.to_string_lossy().into_owned();
            }
        }
    }
}

/// Stage 3: every edit's file must be in `allowed_files`.
fn check_scope(edits: &[NormalizedEdit], allowed_files: &[String]) -> Result<(), PlanError> {
    let allowed: BTreeSet<&str> = allowed_files.iter().map(String::as_str).collect();
    let offenders: Vec<String> = edits
        .iter()
        .map(|e| e.file.as_str())
        .filter(|f| !allowed.contains(f))
        .map(String::from)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    if offenders.is_empty() {
        Ok(())
    } else {
        Err(PlanError::FileOutOfScope(offenders))
    }
}

/// Predicted lines for one edit: the replaced range plus the replacement's
/// own line count.
fn predicted_lines(edit: &NormalizedEdit) -> u32 {
    let range = edit.end_line - edit.start_line + 1;
    let replacement_lines = count_lines(&edit.replacement);
    range + replacement_lines
}

fn count_lines(text: &str) -> u32 {
    if text.is_empty() {
        0
    } else {
        text.split('\n').count() as u32
    }
}

/// Stage 4: sum of predicted lines must not exceed `max_patch_lines`.
fn check_size(edits: &[NormalizedEdit], max_patch_lines: u32) -> Result<u32, PlanError> {
    let predicted: u32 = edits.iter().map(predicted_lines).sum();
    if predicted > max_patch_lines {
        Err(PlanError::PatchBudgetExceeded {
            predicted,
            budget: max_patch_lines,
        })
    } else {
        Ok(predicted)
    }
}

/// Stage 5: relevance score. `scope_files` is
/// `changed_files ∪ finding_files`.
fn relevance_score(edits: &[NormalizedEdit], scope_files: &[String], predicted: u32, max_patch_lines: u32) -> f64 {
    let touched: BTreeSet<&str> = edits.iter().map(|e| e.file.as_str()).collect();
    let scope: BTreeSet<&str> = scope_files.iter().map(String::as_str).collect();

    let overlap_ratio = if touched.is_empty() {
        0.0
    } else {
        touched.intersection(&scope).count() as f64 / touched.len() as f64
    };
    let line_score = if predicted <= max_patch_lines { 1.0 } else { 0.0 };

    round2(OVERLAP_WEIGHT * overlap_ratio + LINE_SCORE_WEIGHT * line_score)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Validate a raw edit plan through stages 1-5, without touching disk.
/// Returns the normalized edits plus the computed `(predicted_lines, score)`
/// so the caller can apply separately (the repair loop snapshots before
/// any apply, not before validation).
pub fn validate_edit_plan(
    plan: &EditPlan,
    cwd: &Path,
    allowed_files: &[String],
    scope_files: &[String],
    max_patch_lines: u32,
) -> Result<(Vec<EditOp>, f64), PlanError> {
    let mut edits = normalize(plan)?;
    sanitize_paths(&mut edits, cwd);
    check_scope(&edits, allowed_files)?;
    let predicted = check_size(&edits, max_patch_lines)?;
    let score = relevance_score(&edits, scope_files, predicted, max_patch_lines);
    if score < RELEVANCE_THRESHOLD {
        return Err(PlanError::DiffScoreTooLow(score));
    }

    let edit_ops = edits
        .into_iter()
        .map(|e| EditOp {
            file: e.file,
            start_line: e.start_line,
            end_line: e.end_line,
            replacement: e.replacement,
        })
        .collect();
    Ok((edit_ops, score))
}

/// Stage 6: apply a validated set of edits to the workspace at `cwd`,
/// atomically per file (read whole file, splice, write whole file).
///
/// A plan that fails partway leaves earlier edits applied - the repair
/// loop's snapshot is the sole recovery path.
pub fn apply_edits(edits: &[EditOp], cwd: &Path) -> Result<Vec<String>, PlanError> {
    let mut touched = Vec::with_capacity(edits.len());
    for edit in edits {
        let path = absolute(cwd, &edit.file);
        if !path.is_file() {
            return Err(PlanError::MissingFile(edit.file.clone()));
        }

        let contents = fs::read_to_string(&path).map_err(|_| PlanError::MissingFile(edit.file.clone()))?;
        let mut lines: Vec<&str> = contents.split('\n').collect();
        // split('\n') yields a trailing empty element for a trailing
        // newline; drop it so `line_count` matches what an editor shows.
        let had_trailing_newline = contents.ends_with('\n');
        if had_trailing_newline {
            lines.pop();
        }
        let line_count = lines.len() as u32;

        if edit.start_line < 1 || edit.end_line < edit.start_line || edit.end_line > line_count {
            return Err(PlanError::InvalidLineRange {
                path: edit.file.clone(),
                start: edit.start_line,
                end: edit.end_line,
            });
        }

        let start_idx = (edit.start_line - 1) as usize;
        let end_idx = edit.end_line as usize;
        let replacement_lines: Vec<&str> = if edit.replacement.is_empty() {
            Vec::new()
        } else {
            edit.replacement.split(['\n']).map(|l| l.trim_end_matches('\r')).collect()
        };

        let mut new_lines: Vec<&str> = Vec::with_capacity(lines.len());
        new_lines.extend_from_slice(&lines[..start_idx]);
        new_lines.extend_from_slice(&replacement_lines);
        new_lines.extend_from_slice(&lines[end_idx..]);

        let mut new_contents = new_lines.join("\n");
        if had_trailing_newline && !new_contents.is_empty() {
            new_contents.push('\n');
        }

        fs::write(&path, new_contents).map_err(|_| PlanError::MissingFile(edit.file.clone()))?;
        touched.push(edit.file.clone());
    }

    touched.sort();
    touched.dedup();
    Ok(touched)
}

/// Validate then apply in one call, returning the [`AppliedPlan`] summary
/// consumers persist in the attempt's action log.
pub fn apply_edit_plan(
    plan: &EditPlan,
    cwd: &Path,
    allowed_files: &[String],
    scope_files: &[String],
    max_patch_lines: u32,
) -> Result<AppliedPlan, PlanError> {
    let (edits, score) = validate_edit_plan(plan, cwd, allowed_files, scope_files, max_patch_lines)?;
    let predicted: u32 = edits
        .iter()
        .map(|e| {
            let range = e.end_line - e.start_line + 1;
            range + count_lines(&e.replacement)
        })
        .sum();
    let touched_files = apply_edits(&edits, cwd)?;

    Ok(AppliedPlan {
        score,
        patch_lines: predicted,
        touched_files,
    })
}

/// Resolve an edit's workspace-relative path against `cwd`.
fn absolute(cwd: &Path, rel: &str) -> PathBuf {
    cwd.join(rel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn edit(file: &str, start: u32, end: u32, replacement: &str) -> EditOp {
        EditOp {
            file: file.to_string(),
            start_line: start,
            end_line: end,
            replacement: replacement.to_string(),
        }
    }

    #[test]
    fn normalize_drops_malformed_and_errors_if_empty() {
        let plan = EditPlan {
            summary: "s".into(),
            edits: vec![edit("a.ts", 0, 5, "x")],
        };
        assert!(matches!(normalize(&plan), Err(PlanError::InvalidEditPlanJson)));
    }

    #[test]
    fn scope_check_rejects_out_of_scope_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.ts"), "one\ntwo\n").unwrap();
        let plan = EditPlan {
            summary: "s".into(),
            edits: vec![edit("README.md", 1, 1, "x")],
        };
        let result = validate_edit_plan(
            &plan,
            temp.path(),
            &["a.ts".to_string()],
            &["a.ts".to_string()],
            150,
        );
        assert!(matches!(result, Err(PlanError::FileOutOfScope(_))));
    }

    #[test]
    fn budget_exceeded_is_rejected() {
        let plan = EditPlan {
            summary: "s".into(),
            edits: vec![edit("a.ts", 1, 200, "x")],
        };
        let result = validate_edit_plan(
            &plan,
            Path::new("/tmp"),
            &["a.ts".to_string()],
            &["a.ts".to_string()],
            150,
        );
        assert!(matches!(result, Err(PlanError::PatchBudgetExceeded { .. })));
    }

    #[test]
    fn low_relevance_is_rejected() {
        // Touched file in allowed_files (scope check passes) but not in
        // changed_files/finding_files (scope_files), so overlap is zero.
        let plan = EditPlan {
            summary: "s".into(),
            edits: vec![edit("unrelated.ts", 1, 1, "x")],
        };
        let result = validate_edit_plan(
            &plan,
            Path::new("/tmp"),
            &["unrelated.ts".to_string()],
            &["a.ts".to_string()],
            150,
        );
        assert!(matches!(result, Err(PlanError::DiffScoreTooLow(_))));
    }

    #[test]
    fn high_overlap_and_in_budget_passes() {
        let plan = EditPlan {
            summary: "s".into(),
            edits: vec![edit("a.ts", 1, 1, "x")],
        };
        let result = validate_edit_plan(
            &plan,
            Path::new("/tmp"),
            &["a.ts".to_string()],
            &["a.ts".to_string()],
            150,
        );
        assert!(result.is_ok());
        let (_, score) = result.unwrap();
        assert_eq!(score, 1.0);
    }

    #[test]
    fn apply_single_line_replace() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.ts"), "one\ntwo\nthree\n").unwrap();
        let edits = vec![edit("a.ts", 2, 2, "TWO")];
        let touched = apply_edits(&edits, temp.path()).unwrap();
        assert_eq!(touched, vec!["a.ts".to_string()]);
        let contents = std::fs::read_to_string(temp.path().join("a.ts")).unwrap();
        assert_eq!(contents, "one\nTWO\nthree\n");
    }

    #[test]
    fn apply_empty_replacement_deletes_line() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.ts"), "one\ntwo\nthree\n").unwrap();
        let edits = vec![edit("a.ts", 2, 2, "")];
        apply_edits(&edits, temp.path()).unwrap();
        let contents = std::fs::read_to_string(temp.path().join("a.ts")).unwrap();
        assert_eq!(contents, "one\nthree\n");
    }

    #[test]
    fn apply_missing_file_is_rejected() {
        let temp = TempDir::new().unwrap();
        let edits = vec![edit("missing.ts", 1, 1, "x")];
        let result = apply_edits(&edits, temp.path());
        assert_eq!(result, Err(PlanError::MissingFile("missing.ts".to_string())));
    }

    #[test]
    fn apply_invalid_range_is_rejected() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.ts"), "one\ntwo\n").unwrap();
        let edits = vec![edit("a.ts", 1, 10, "x")];
        let result = apply_edits(&edits, temp.path());
        assert!(matches!(result, Err(PlanError::InvalidLineRange { .. })));
    }

    #[test]
    fn absolute_path_rooted_at_cwd_is_rewritten_relative() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.ts"), "one\ntwo\n").unwrap();
        let abs_path = temp.path().join("a.ts").to_string_lossy().into_owned();
        let plan = EditPlan {
            summary: "s".into(),
            edits: vec![edit(&abs_path, 1, 1, "ONE")],
        };
        let (edits, _) = validate_edit_plan(
            &plan,
            temp.path(),
            &["a.ts".to_string()],
            &["a.ts".to_string()],
            150,
        )
        .unwrap();
        assert_eq!(edits[0].file, "a.ts");
    }

    #[test]
    fn reason_tags_match_spec_strings() {
        assert_eq!(PlanError::InvalidEditPlanJson.reason_tag(), "invalid_edit_plan_json");
        assert_eq!(
            PlanError::MissingFile("x.ts".into()).reason_tag(),
            "missing_file:x.ts"
        );
        assert_eq!(
            PlanError::InvalidLineRange {
                path: "x.ts".into(),
                start: 1,
                end: 5
            }
            .reason_tag(),
            "invalid_line_range:x.ts:1-5"
        );
    }
}