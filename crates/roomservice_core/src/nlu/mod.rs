//! Natural-language understanding providers.
//!
//! The engine consumes four capabilities: intent classification, order
//! extraction, reply interpretation and semantic search. Providers implement
//! [`NluProvider`]; the engine always calls them through an [`NluHandle`],
//! which bounds every call with a timeout and attaches the dialog's mode hint.

pub mod claude;
pub mod lexical;
pub mod scripted;

use async_trait::async_trait;
use roomservice_dialog::{ModeHint, PendingQuery};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::draft::OrderDraft;

pub use claude::ClaudeNlu;
pub use lexical::LexicalNlu;
pub use scripted::ScriptedNlu;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during provider calls
#[derive(Debug, Error, Clone)]
pub enum NluError {
    /// API key not found or invalid
    #[error("API key error: {0}")]
    ApiKey(String),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded: retry after {retry_after_ms}ms")]
    RateLimit { retry_after_ms: u64 },

    /// The call did not finish in time
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    /// Provider answered with something we could not use
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Provider-specific error
    #[error("{provider} error: {message}")]
    Provider { provider: String, message: String },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl NluError {
    /// Whether the same turn could succeed if the guest simply tried again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NluError::Http(_)
                | NluError::RateLimit { .. }
                | NluError::Timeout { .. }
                | NluError::InvalidResponse(_)
        )
    }
}

impl From<serde_json::Error> for NluError {
    fn from(e: serde_json::Error) -> Self {
        NluError::InvalidResponse(e.to_string())
    }
}

// =============================================================================
// Capability Types
// =============================================================================

/// What the guest is trying to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    NewOrder,
    GeneralInquiry,
    UnsupportedAction,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::NewOrder => "new_order",
            Intent::GeneralInquiry => "general_inquiry",
            Intent::UnsupportedAction => "unsupported_action",
            Intent::Unknown => "unknown",
        }
    }

    /// Lenient parse of provider output.
    pub fn parse_loose(value: &str) -> Intent {
        match value.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "new_order" | "neworder" | "order" => Intent::NewOrder,
            "general_inquiry" | "generalinquiry" | "inquiry" | "menu_inquiry" => {
                Intent::GeneralInquiry
            }
            "unsupported_action" | "unsupportedaction" | "unsupported" => {
                Intent::UnsupportedAction
            }
            _ => Intent::Unknown,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntentClassification {
    pub intent: Intent,
    pub confidence: f64,
}

impl IntentClassification {
    pub fn new(intent: Intent, confidence: f64) -> Self {
        Self {
            intent,
            confidence: clamp_confidence(confidence),
        }
    }
}

/// How a reply answers a pending query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyAction {
    Select,
    Remove,
    Unclear,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyInterpretation {
    pub action: ReplyAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_label: Option<String>,
    pub confidence: f64,
}

impl ReplyInterpretation {
    pub fn select(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            action: ReplyAction::Select,
            selected_label: Some(label.into()),
            confidence: clamp_confidence(confidence),
        }
    }

    pub fn remove(confidence: f64) -> Self {
        Self {
            action: ReplyAction::Remove,
            selected_label: None,
            confidence: clamp_confidence(confidence),
        }
    }

    pub fn unclear() -> Self {
        Self {
            action: ReplyAction::Unclear,
            selected_label: None,
            confidence: 0.0,
        }
    }
}

/// A label plus the descriptive text the provider ranks it by
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticCandidate {
    pub label: String,
    pub text: String,
}

impl SemanticCandidate {
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
        }
    }

    /// Candidate whose descriptive text is just its label.
    pub fn bare(label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            text: label.clone(),
            label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relatedness {
    pub label: String,
    pub score: f64,
}

impl Relatedness {
    pub fn new(label: impl Into<String>, score: f64) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// Dialog context passed with every provider call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NluHint {
    pub mode: ModeHint,
    /// Short rendering of recent context, may be empty
    pub summary: String,
}

impl NluHint {
    pub fn new(mode: ModeHint, summary: impl Into<String>) -> Self {
        Self {
            mode,
            summary: summary.into(),
        }
    }
}

// =============================================================================
// Provider Trait
// =============================================================================

/// Trait for NLU providers
///
/// Implementations must be thread-safe; one provider is shared by every
/// session.
#[async_trait]
pub trait NluProvider: Send + Sync {
    /// Get the provider name (e.g., "Claude", "Lexical")
    fn name(&self) -> &str;

    /// Check if the provider is configured and ready
    fn is_ready(&self) -> bool;

    async fn classify_intent(
        &self,
        text: &str,
        hint: &NluHint,
    ) -> Result<IntentClassification, NluError>;

    /// Turn free text into a draft. `Ok(None)` means nothing orderable was found.
    async fn extract_order(
        &self,
        text: &str,
        menu_context: &str,
        hint: &NluHint,
    ) -> Result<Option<OrderDraft>, NluError>;

    async fn interpret_reply(
        &self,
        query: &PendingQuery,
        text: &str,
        hint: &NluHint,
    ) -> Result<ReplyInterpretation, NluError>;

    /// Rank `candidates` by relatedness to `query`, best first.
    async fn semantic_search(
        &self,
        query: &str,
        candidates: &[SemanticCandidate],
        hint: &NluHint,
    ) -> Result<Vec<Relatedness>, NluError>;
}

/// A provider bound to a per-call timeout and the current dialog hint.
#[derive(Clone, Copy)]
pub struct NluHandle<'a> {
    provider: &'a dyn NluProvider,
    timeout: Duration,
    hint: &'a NluHint,
}

impl<'a> NluHandle<'a> {
    pub fn new(provider: &'a dyn NluProvider, timeout: Duration, hint: &'a NluHint) -> Self {
        Self {
            provider,
            timeout,
            hint,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    async fn bounded<T, F>(&self, operation: &str, call: F) -> Result<T, NluError>
    where
        F: std::future::Future<Output = Result<T, NluError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => {
                if let Err(e) = &result {
                    tracing::warn!(provider = self.provider.name(), operation, error = %e, "provider call failed");
                }
                result
            }
            Err(_) => {
                let after_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(provider = self.provider.name(), operation, after_ms, "provider call timed out");
                Err(NluError::Timeout {
                    operation: operation.to_string(),
                    after_ms,
                })
            }
        }
    }

    pub async fn classify_intent(&self, text: &str) -> Result<IntentClassification, NluError> {
        self.bounded(
            "classify_intent",
            self.provider.classify_intent(text, self.hint),
        )
        .await
    }

    pub async fn extract_order(
        &self,
        text: &str,
        menu_context: &str,
    ) -> Result<Option<OrderDraft>, NluError> {
        self.bounded(
            "extract_order",
            self.provider.extract_order(text, menu_context, self.hint),
        )
        .await
    }

    pub async fn interpret_reply(
        &self,
        query: &PendingQuery,
        text: &str,
    ) -> Result<ReplyInterpretation, NluError> {
        self.bounded(
            "interpret_reply",
            self.provider.interpret_reply(query, text, self.hint),
        )
        .await
    }

    pub async fn semantic_search(
        &self,
        query: &str,
        candidates: &[SemanticCandidate],
    ) -> Result<Vec<Relatedness>, NluError> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        self.bounded(
            "semantic_search",
            self.provider.semantic_search(query, candidates, self.hint),
        )
        .await
    }
}

// =============================================================================
// Utility Functions
// =============================================================================

pub(crate) fn clamp_confidence(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Pull the first JSON object out of model output that may wrap it in
/// prose or code fences.
pub fn parse_json_object(text: &str) -> Result<Value, NluError> {
    let start = text.find('{');
    let end = text.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if end > start => {
            let value: Value = serde_json::from_str(&text[start..=end])?;
            Ok(value)
        }
        _ => Err(NluError::InvalidResponse(format!(
            "no JSON object in response: {}",
            truncate(text, 120)
        ))),
    }
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(max_chars).collect();
        out.push_str("...");
        out
    }
}

// =============================================================================
// Tests
// =============================================================================
