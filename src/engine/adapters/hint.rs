//! engine::adapters::hint
//!
//! The hint model adapter: prompts the configured hint model for
//! strict JSON `{hints:[{finding_id, hint, confidence}]}`, accepts at most
//! 6 hints, and never fails the calling attempt - a timeout, non-zero
//! exit, or unparsable response just yields no hints plus a reason.

use std::path::Path;

use serde::Deserialize;

use crate::core::config::ModelPolicy;
use crate::core::types::{Confidence, Hint, HintList};
use crate::ui::output::Verbosity;

use super::context::AdapterContext;
use super::{invoke_model, parse_liberal_json};

const MAX_HINTS: usize = 6;

#[derive(Debug, Deserialize)]
struct RawHint {
    finding_id: String,
    hint: String,
    confidence: Confidence,
}

#[derive(Debug, Deserialize)]
struct RawHintList {
    #[serde(default)]
    hints: Vec<RawHint>,
}

/// Outcome of one hint-adapter invocation. Never itself fails the loop's
/// attempt.
#[derive(Debug, Clone)]
pub struct HintAdapterResult {
    pub attempted: bool,
    pub hints: HintList,
    pub reason: Option<String>,
}

/// Invoke the hint model against `ctx`, respecting `policy`'s model
/// identifier, timeout, and mock hook.
pub fn invoke_hint(
    ctx: &AdapterContext,
    policy: &ModelPolicy,
    cwd: &Path,
    verbosity: Verbosity,
) -> HintAdapterResult {
    let prompt = build_prompt(ctx);
    let timeout = std::time::Duration::from_millis(policy.model_timeout_ms);

    match invoke_model(
        &policy.hint_model,
        &prompt,
        policy.mock_hint_response.as_deref(),
        cwd,
        timeout,
        verbosity,
    ) {
        Ok(output) => {
            let parsed: Option<RawHintList> = parse_liberal_json(&output);
            let hints = match parsed {
                Some(raw) => raw
                    .hints
                    .into_iter()
                    .take(MAX_HINTS)
                    .map(|h| Hint {
                        finding_id: h.finding_id,
                        hint: h.hint,
                        confidence: h.confidence,
                    })
                    .collect(),
                None => Vec::new(),
            };
            HintAdapterResult {
                attempted: true,
                hints: HintList { hints },
                reason: None,
            }
        }
        Err(reason) => HintAdapterResult {
            attempted: true,
            hints: HintList::default(),
            reason: Some(reason.as_str().to_string()),
        },
    }
}

fn build_prompt(ctx: &AdapterContext) -> String {
    let context_json = serde_json::to_string_pretty(ctx).unwrap_or_default();
    format!(
        "You are a build-repair assistant. Given the following failing checks \
         and file context, propose short, targeted hints for how to fix each \
         finding.\n\n\
         Context:\n{context_json}\n\n\
         Respond with strict JSON only, no prose, matching exactly this shape:\n\
         {{\"hints\": [{{\"finding_id\": \"<id>\", \"hint\": \"<short fix suggestion>\", \
         \"confidence\": \"low\"|\"medium\"|\"high\"}}]}}\n\
         Return at most 6 hints, one per finding you're confident about."
    )
}
