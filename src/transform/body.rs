//! Typed view of a completion request body.
//!
//! Only the fields the rewrite reads or writes are typed; everything else is
//! carried through untouched in [`CompletionRequest::rest`]. Typed fields use
//! [`present`] so an explicit `null` is kept as a value instead of being
//! confused with an absent key.
//!
//! Serializing writes the typed fields first, then `rest` in document order.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A completion request as sent by the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub model: Option<String>,

    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub thinking: Option<Thinking>,

    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_tokens: Option<TokenLimit>,

    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_output_tokens: Option<TokenLimit>,

    /// Every other top-level field, in document order.
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// Which token-limit field a rewrite adjusts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenLimitField {
    MaxTokens,
    MaxOutputTokens,
}

impl CompletionRequest {
    /// `max_tokens` if the body has it, else `max_output_tokens` if the body
    /// has it, else `max_tokens`.
    pub fn token_limit_field(&self) -> TokenLimitField {
        if self.max_tokens.is_some() {
            TokenLimitField::MaxTokens
        } else if self.max_output_tokens.is_some() {
            TokenLimitField::MaxOutputTokens
        } else {
            TokenLimitField::MaxTokens
        }
    }

    /// Overwrite the preferred token-limit field.
    pub fn set_token_limit(&mut self, tokens: u32) {
        let limit = Some(TokenLimit::Tokens(u64::from(tokens)));
        match self.token_limit_field() {
            TokenLimitField::MaxTokens => self.max_tokens = limit,
            TokenLimitField::MaxOutputTokens => self.max_output_tokens = limit,
        }
    }
}

/// The `thinking` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Thinking {
    Enabled(EnabledThinking),
    /// Whatever the caller sent when it is not exactly an enabled budget.
    Passthrough(Value),
}

impl Thinking {
    pub fn enabled(budget_tokens: u32) -> Self {
        Thinking::Enabled(EnabledThinking {
            kind: ThinkingKind::Enabled,
            budget_tokens,
        })
    }

    pub fn budget_tokens(&self) -> Option<u32> {
        match self {
            Thinking::Enabled(enabled) => Some(enabled.budget_tokens),
            Thinking::Passthrough(_) => None,
        }
    }
}

/// `{"type": "enabled", "budget_tokens": N}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnabledThinking {
    #[serde(rename = "type")]
    pub kind: ThinkingKind,
    pub budget_tokens: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingKind {
    Enabled,
}

/// A `max_tokens` / `max_output_tokens` value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenLimit {
    Tokens(u64),
    Passthrough(Value),
}

impl TokenLimit {
    pub fn tokens(&self) -> Option<u64> {
        match self {
            TokenLimit::Tokens(tokens) => Some(*tokens),
            TokenLimit::Passthrough(_) => None,
        }
    }
}

/// Deserialize a field that is present in the document, `null` included.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}
