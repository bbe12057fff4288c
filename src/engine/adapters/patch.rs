//! engine::adapters::patch
//!
//! The patch model adapter: prompts the configured patch model for
//! `{summary, edits[]}`, retries once on unparsable output with a stricter
//! reminder prompt, and enforces the hint-only deny list before ever
//! invoking a model known to be too small to trust with direct edits.
//!
//! Validation of the parsed plan (scope, size, relevance, apply) is a
//! separate concern - see [`crate::engine::plan`].

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::core::config::ModelPolicy;
use crate::core::types::{EditOp, EditPlan};
use crate::ui::output::Verbosity;

use super::context::AdapterContext;
use super::{invoke_model, parse_liberal_json};

/// Models known to be hint-only: small enough that their edits are not
/// trustworthy without a human or a stronger model in the loop. Disabled
/// entirely by `QUICK_GATE_ALLOW_HINT_ONLY_PATCH=1`.
const HINT_ONLY_MODELS: &[&str] = &[
    "qwen2.5:1.5b",
    "qwen2.5:0.5b",
    "tinyllama",
    "tinyllama:1.1b",
    "phi3:mini",
    "gemma2:2b",
];

#[derive(Debug, Deserialize)]
struct RawEdit {
    #[serde(default)]
    file: Option<String>,
    #[serde(default)]
    start_line: Option<u32>,
    #[serde(default)]
    end_line: Option<u32>,
    #[serde(default)]
    replacement: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawEditPlan {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    edits: Vec<RawEdit>,
}

/// Outcome of one patch-adapter invocation. Success or failure is
/// reported but does not itself pass or fail the attempt.
#[derive(Debug, Clone)]
pub struct PatchAdapterResult {
    pub attempted: bool,
    pub plan: Option<EditPlan>,
    pub reason: Option<String>,
}

/// Invoke the patch model against `ctx`. Refuses deny-listed models
/// outright; otherwise prompts, and on unparsable output retries once
/// with a stricter reminder embedding `allowed_files`.
pub fn invoke_patch(
    ctx: &AdapterContext,
    policy: &ModelPolicy,
    cwd: &Path,
    verbosity: Verbosity,
) -> PatchAdapterResult {
    if is_hint_only(&policy.patch_model) && !policy.allow_hint_only_patch {
        return PatchAdapterResult {
            attempted: false,
            plan: None,
            reason: Some("patch_model_is_hint_only".to_string()),
        };
    }

    let timeout = Duration::from_millis(policy.model_timeout_ms);
    let prompt = build_prompt(ctx);

    let first = invoke_model(
        &policy.patch_model,
        &prompt,
        policy.mock_patch_response.as_deref(),
        cwd,
        timeout,
        verbosity,
    );

    let output = match first {
        Ok(output) => output,
        Err(reason) => {
            return PatchAdapterResult {
                attempted: true,
                plan: None,
                reason: Some(reason.as_str().to_string()),
            }
        }
    };

    if let Some(plan) = try_parse(&output) {
        return PatchAdapterResult {
            attempted: true,
            plan: Some(plan),
            reason: None,
        };
    }

    // One-shot JSON-repair retry: a stricter reminder prompt that
    // embeds the allowed-files list and an excerpt of the prior output.
    let retry_prompt = build_retry_prompt(ctx, &output);
    let retry = invoke_model(
        &policy.patch_model,
        &retry_prompt,
        policy.mock_patch_response.as_deref(),
        cwd,
        timeout,
        verbosity,
    );

    match retry {
        Ok(output) => match try_parse(&output) {
            Some(plan) => PatchAdapterResult {
                attempted: true,
                plan: Some(plan),
                reason: None,
            },
            None => PatchAdapterResult {
                attempted: true,
                plan: None,
                reason: Some("invalid_edit_plan_json".to_string()),
            },
        },
        Err(reason) => PatchAdapterResult {
            attempted: true,
            plan: None,
            reason: Some(reason.as_str().to_string()),
        },
    }
}

fn is_hint_only(model: &str) -> bool {
    HINT_ONLY_MODELS.contains(&model)
}

fn try_parse(output: &str) -> Option<EditPlan> {
    let raw: RawEditPlan = parse_liberal_json(output)?;
    let edits: Vec<EditOp> = raw
        .edits
        .into_iter()
        .filter_map(|e| {
            Some(EditOp {
                file: e.file?,
                start_line: e.start_line?,
                end_line: e.end_line?,
                replacement: e.replacement.unwrap_or_default(),
            })
        })
        .collect();

    if edits.is_empty() {
        return None;
    }

    Some(EditPlan {
        summary: raw.summary,
        edits,
    })
}

fn build_prompt(ctx: &AdapterContext) -> String {
    let context_json = serde_json::to_string_pretty(ctx).unwrap_or_default();
    format!(
        "You are a build-repair assistant. Given the following failing checks \
         and file context, propose a minimal edit plan that fixes as many \
         findings as possible without touching files outside allowed_files.\n\n\
         Context:\n{context_json}\n\n\
         Respond with strict JSON only, no prose, matching exactly this shape:\n\
         {{\"summary\": \"<one line>\", \"edits\": [{{\"file\": \"<path from allowed_files>\", \
         \"start_line\": <int>, \"end_line\": <int>, \"replacement\": \"<new text, may be empty>\"}}]}}"
    )
}

fn build_retry_prompt(ctx: &AdapterContext, prior_output: &str) -> String {
    let excerpt: String = prior_output.chars().take(500).collect();
    format!(
        "Your previous response could not be parsed as JSON. Respond with \
         STRICT JSON ONLY - no markdown fences, no prose before or after.\n\n\
         allowed_files: {:?}\n\n\
         Your previous (invalid) response was:\n{excerpt}\n\n\
         Respond again with exactly this shape:\n\
         {{\"summary\": \"<one line>\", \"edits\": [{{\"file\": \"<path from allowed_files>\", \
         \"start_line\": <int>, \"end_line\": <int>, \"replacement\": \"<new text, may be empty>\"}}]}}",
        ctx.allowed_files
    )
}
