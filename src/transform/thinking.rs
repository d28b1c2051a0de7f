//! Thinking-model rewrite.
//!
//! Clients select extended thinking with a synthetic model name such as
//! `claude-sonnet-thinking-2000`. The rewrite strips the directive from the
//! model name and turns the numeric suffix into a `thinking` budget, raising
//! the token limit so it always stays above that budget.
//!
//! # Rules
//! ```text
//! model must start with "claude-"             (ASCII case-insensitive)
//! directive = last "-thinking-" in the model  (ASCII case-insensitive)
//! model     = text before the directive
//! budget    = text after the directive, positive i32, else model rewrite only
//!
//! effective = min(budget, HARD_CAP - 1)
//! headroom  = max(1024, effective / 10)
//! limit     = max(effective + 1, min(HARD_CAP, effective + headroom))
//! ```
//!
//! The chosen token-limit field is always overwritten with `limit`, even when
//! the caller asked for more.

use std::borrow::Cow;

use crate::transform::body::{CompletionRequest, Thinking};

/// Upper bound on any token value the rewrite emits.
pub const HARD_CAP: u32 = 32_000;

/// Minimum room left above the thinking budget for the visible answer.
pub const MIN_HEADROOM: u32 = 1024;

const MODEL_PREFIX: &str = "claude-";
const THINKING_MARKER: &str = "-thinking-";

/// Outcome of [`apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformResult<'a> {
    /// The body to forward.
    pub body: Cow<'a, [u8]>,
    /// Whether `body` differs from the input.
    pub modified: bool,
}

impl<'a> TransformResult<'a> {
    /// Forward the input as-is.
    pub fn unchanged(body: &'a [u8]) -> Self {
        Self {
            body: Cow::Borrowed(body),
            modified: false,
        }
    }

    fn rewritten(body: Vec<u8>) -> Self {
        Self {
            body: Cow::Owned(body),
            modified: true,
        }
    }
}

/// A thinking directive parsed out of a model name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkingDirective<'a> {
    /// Model name with the directive removed.
    pub model: &'a str,
    /// Requested budget, if the suffix was a positive integer.
    pub budget: Option<u32>,
}

impl<'a> ThinkingDirective<'a> {
    /// Parse `claude-<variant>-thinking-<budget>`.
    pub fn parse(model: &'a str) -> Option<Self> {
        let prefix = model.get(..MODEL_PREFIX.len())?;
        if !prefix.eq_ignore_ascii_case(MODEL_PREFIX) {
            return None;
        }

        // ASCII lowercasing keeps byte offsets identical to `model`.
        let marker_at = model.to_ascii_lowercase().rfind(THINKING_MARKER)?;
        let budget = model[marker_at + THINKING_MARKER.len()..]
            .trim()
            .parse::<i32>()
            .ok()
            .and_then(|budget| u32::try_from(budget).ok())
            .filter(|budget| *budget > 0);

        Some(Self {
            model: &model[..marker_at],
            budget,
        })
    }
}

/// Token values derived from a requested thinking budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThinkingBudget {
    pub budget_tokens: u32,
    pub token_limit: u32,
}

impl ThinkingBudget {
    pub fn from_requested(requested: u32) -> Self {
        let budget_tokens = requested.min(HARD_CAP - 1);
        let headroom = MIN_HEADROOM.max(budget_tokens / 10);
        let desired = HARD_CAP.min(budget_tokens + headroom);

        Self {
            budget_tokens,
            token_limit: (budget_tokens + 1).max(desired),
        }
    }
}

/// Rewrite a request body carrying a thinking directive.
///
/// Never fails: anything that is not a JSON object with a matching `model`
/// string is returned unchanged with `modified == false`.
pub fn apply(body: &[u8]) -> TransformResult<'_> {
    match rewrite(body) {
        Some(rewritten) => TransformResult::rewritten(rewritten),
        None => TransformResult::unchanged(body),
    }
}

fn rewrite(body: &[u8]) -> Option<Vec<u8>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return None;
    }

    let mut request: CompletionRequest = serde_json::from_slice(body).ok()?;
    let original = request.model.take()?;
    let directive = ThinkingDirective::parse(&original)?;
    request.model = Some(directive.model.to_string());

    match directive.budget.map(ThinkingBudget::from_requested) {
        Some(budget) => {
            request.thinking = Some(Thinking::enabled(budget.budget_tokens));
            request.set_token_limit(budget.token_limit);
            tracing::debug!(
                original_model = %original,
                model = directive.model,
                budget_tokens = budget.budget_tokens,
                token_limit = budget.token_limit,
                "Applied thinking budget"
            );
        }
        None => {
            tracing::debug!(
                original_model = %original,
                model = directive.model,
                "Thinking suffix has no usable budget, rewriting model only"
            );
        }
    }

    serde_json::to_vec(&request).ok()
}
