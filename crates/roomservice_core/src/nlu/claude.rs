//! Claude Provider Implementation
//!
//! Implements the NluProvider trait on Anthropic's Messages API. Each
//! capability is a single non-streaming request whose prompt asks for a
//! bare JSON object; the reply is parsed with [`parse_json_object`].
//!
//! # Configuration
//!
//! - API key: Set via `ANTHROPIC_API_KEY` environment variable or passed directly
//! - Model: Defaults to claude-sonnet-4-20250514, configurable via constructor

use async_trait::async_trait;
use reqwest::Client;
use roomservice_dialog::{ModeHint, PendingQuery};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    clamp_confidence, parse_json_object, Intent, IntentClassification, NluError, NluHint,
    NluProvider, Relatedness, ReplyAction, ReplyInterpretation, SemanticCandidate,
};
use crate::draft::{LineItem, OrderDraft};

/// Anthropic API base URL
const API_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Default model to use
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// API version header
const API_VERSION: &str = "2023-06-01";

const DEFAULT_MAX_TOKENS: u32 = 1024;

// =============================================================================
// API Request/Response Types
// =============================================================================

/// Request body for the Messages API
#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    system: String,
    messages: Vec<ApiMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

// =============================================================================
// Claude Provider
// =============================================================================

/// Claude API provider
pub struct ClaudeNlu {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl ClaudeNlu {
    /// Create a new Claude provider with explicit API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Create a new Claude provider from environment variable
    ///
    /// Reads `ANTHROPIC_API_KEY` from environment
    pub fn from_env() -> Result<Self, NluError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
            NluError::ApiKey(
                "ANTHROPIC_API_KEY environment variable not set. \
                 Set it or use --provider lexical."
                    .to_string(),
            )
        })?;

        if api_key.is_empty() {
            return Err(NluError::ApiKey("ANTHROPIC_API_KEY is empty".to_string()));
        }

        Ok(Self::new(api_key))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, system: String, user: String) -> MessagesRequest {
        MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system,
            messages: vec![ApiMessage {
                role: "user",
                content: user,
            }],
            temperature: 0.0,
        }
    }

    /// Send one prompt and return the parsed JSON object from the reply.
    async fn complete(&self, system: String, user: String) -> Result<Value, NluError> {
        let request = self.build_request(system, user);

        let response = self
            .client
            .post(format!("{}/messages", API_BASE_URL))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| NluError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                return Err(NluError::RateLimit {
                    retry_after_ms: 60_000,
                });
            }

            return Err(NluError::Provider {
                provider: "Claude".to_string(),
                message: format!("HTTP {}: {}", status, error_text),
            });
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| NluError::InvalidResponse(e.to_string()))?;
        let text = body
            .content
            .iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(text.as_str()),
                ResponseBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");
        parse_json_object(&text)
    }
}

// =============================================================================
// Prompts
// =============================================================================

fn mode_instructions(mode: ModeHint) -> &'static str {
    match mode {
        ModeHint::Initial => {
            "You are a helpful room service assistant. Help guests place orders or answer questions about the menu."
        }
        ModeHint::Classifying => {
            "You are classifying the intent of a guest's request: a new order, a menu question, or something else."
        }
        ModeHint::MenuInquiry => {
            "You are answering questions about the menu: items, ingredients and modifications."
        }
        ModeHint::Extracting => {
            "You are processing a food order. Extract specific items, quantities and modifications."
        }
        ModeHint::Validating => {
            "You are validating order details against the menu."
        }
        ModeHint::Disambiguating => {
            "You are interpreting a guest's answer to a clarification question about their order."
        }
        ModeHint::Confirming => "You are confirming a completed order.",
        ModeHint::Recovering => {
            "The previous step failed. Be conservative and prefer asking again over guessing."
        }
    }
}

fn system_prompt(hint: &NluHint, task: &str) -> String {
    let mut prompt = format!("{}\n\n{}", mode_instructions(hint.mode), task);
    if !hint.summary.is_empty() {
        prompt.push_str("\n\nConversation so far:\n");
        prompt.push_str(&hint.summary);
    }
    prompt.push_str("\n\nRespond with the JSON object only.");
    prompt
}

const INTENT_TASK: &str = r#"Classify the guest's message into one intent:
- "new_order": wants to order food or drinks
- "general_inquiry": asks about the menu, ingredients, prices or allergens
- "unsupported_action": asks for something room service cannot do (cancel, refund, change an existing order, bookings)
- "unknown": anything else

Respond with {"intent": "<intent>", "confidence": <float between 0 and 1>}."#;

fn extraction_task(menu_context: &str) -> String {
    format!(
        r#"Extract the order with exact item names from this menu.

{}
Respond with a JSON object following this schema:
{{
    "room_number": number or null,
    "items": [
        {{"name": "exact item name from menu", "quantity": number (1 if not stated), "modifications": ["..."]}}
    ],
    "special_instructions": string or null
}}

If the message contains nothing orderable, respond with {{"items": []}}."#,
        menu_context
    )
}

fn reply_task(query: &PendingQuery) -> String {
    let options = query
        .options()
        .iter()
        .enumerate()
        .map(|(i, o)| format!("{}. {} (score: {:.2})", i + 1, o.label, o.score))
        .collect::<Vec<_>>()
        .join("\n");
    let options = if options.is_empty() {
        "(none, the guest may only confirm removal)".to_string()
    } else {
        options
    };
    format!(
        r#"Interpret the guest's answer to a clarification question.

Question kind: {}
Item: {}
Subject: {}
Available options:
{}

The guest can select an option by number ("1", "the first one") or by name, or remove the subject ("remove", "never mind").

Respond with {{"action": "select" | "remove" | "unclear", "selected_label": "<exact option label>" or null, "confidence": <float between 0 and 1>}}.
Only select an option that appears in the list."#,
        query.kind(),
        query.item(),
        query.subject(),
        options
    )
}

fn semantic_task(candidates: &[SemanticCandidate]) -> String {
    let listing = candidates
        .iter()
        .map(|c| format!("- label: {}\n  context: {}", c.label, c.text.replace('\n', " | ")))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        r#"Score how closely each candidate matches what the guest asked for, from 0 (unrelated) to 1 (same thing).

Candidates:
{}

Respond with {{"matches": [{{"label": "<candidate label>", "score": <float>}}]}} sorted best first."#,
        listing
    )
}

// =============================================================================
// Response Parsing
// =============================================================================

fn parse_intent(value: &Value) -> IntentClassification {
    let intent = value
        .get("intent")
        .and_then(Value::as_str)
        .map(Intent::parse_loose)
        .unwrap_or(Intent::Unknown);
    let confidence = value.get("confidence").and_then(Value::as_f64).unwrap_or(0.0);
    IntentClassification::new(intent, confidence)
}

#[derive(Debug, Deserialize)]
struct ExtractedOrder {
    #[serde(default)]
    room_number: Option<Value>,
    #[serde(default)]
    items: Vec<ExtractedItem>,
    #[serde(default)]
    special_instructions: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExtractedItem {
    name: String,
    #[serde(default)]
    quantity: Option<i64>,
    #[serde(default)]
    modifications: Vec<String>,
}

fn parse_draft(value: Value) -> Result<Option<OrderDraft>, NluError> {
    let extracted: ExtractedOrder = serde_json::from_value(value)?;
    let items: Vec<LineItem> = extracted
        .items
        .into_iter()
        .filter_map(|item| {
            let quantity = u32::try_from(item.quantity.unwrap_or(1)).ok()?;
            Some(LineItem::new(item.name, quantity).with_modifications(item.modifications))
        })
        .collect();
    if items.is_empty() {
        return Ok(None);
    }
    let room_number = extracted.room_number.and_then(|v| match v {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    });
    Ok(Some(OrderDraft {
        room_number,
        items,
        special_instructions: extracted.special_instructions,
    }))
}

fn parse_reply(value: &Value) -> ReplyInterpretation {
    let confidence = clamp_confidence(value.get("confidence").and_then(Value::as_f64).unwrap_or(0.0));
    let label = value
        .get("selected_label")
        .or_else(|| value.get("selected_item"))
        .and_then(Value::as_str)
        .map(str::to_string);
    match value.get("action").and_then(Value::as_str) {
        Some("select") => match label {
            Some(label) => ReplyInterpretation::select(label, confidence),
            None => ReplyInterpretation::unclear(),
        },
        Some("remove") => ReplyInterpretation::remove(confidence),
        _ => ReplyInterpretation {
            action: ReplyAction::Unclear,
            selected_label: None,
            confidence,
        },
    }
}

fn parse_matches(value: &Value) -> Vec<Relatedness> {
    let mut matches: Vec<Relatedness> = value
        .get("matches")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|m| {
                    let label = m.get("label")?.as_str()?;
                    let score = m.get("score")?.as_f64()?;
                    Some(Relatedness::new(label, clamp_confidence(score)))
                })
                .collect()
        })
        .unwrap_or_default();
    matches.sort_by(|a, b| b.score.total_cmp(&a.score));
    matches
}

#[async_trait]
impl NluProvider for ClaudeNlu {
    fn name(&self) -> &str {
        "Claude"
    }

    fn is_ready(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn classify_intent(
        &self,
        text: &str,
        hint: &NluHint,
    ) -> Result<IntentClassification, NluError> {
        let value = self
            .complete(system_prompt(hint, INTENT_TASK), text.to_string())
            .await?;
        Ok(parse_intent(&value))
    }

    async fn extract_order(
        &self,
        text: &str,
        menu_context: &str,
        hint: &NluHint,
    ) -> Result<Option<OrderDraft>, NluError> {
        let value = self
            .complete(system_prompt(hint, &extraction_task(menu_context)), text.to_string())
            .await?;
        parse_draft(value)
    }

    async fn interpret_reply(
        &self,
        query: &PendingQuery,
        text: &str,
        hint: &NluHint,
    ) -> Result<ReplyInterpretation, NluError> {
        let value = self
            .complete(system_prompt(hint, &reply_task(query)), text.to_string())
            .await?;
        Ok(parse_reply(&value))
    }

    async fn semantic_search(
        &self,
        query: &str,
        candidates: &[SemanticCandidate],
        hint: &NluHint,
    ) -> Result<Vec<Relatedness>, NluError> {
        let value = self
            .complete(system_prompt(hint, &semantic_task(candidates)), query.to_string())
            .await?;
        Ok(parse_matches(&value))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use roomservice_dialog::{QueryOption, QueryOrigin};

    #[test]
    fn test_provider_creation() {
        let provider = ClaudeNlu::new("test-key");
        assert_eq!(provider.name(), "Claude");
        assert_eq!(provider.model(), DEFAULT_MODEL);
        assert!(provider.is_ready());
        assert!(!ClaudeNlu::new("").is_ready());
    }

    #[test]
    fn test_build_request() {
        let provider = ClaudeNlu::new("test-key")
            .with_model("claude-opus-4-20250514")
            .with_max_tokens(256);
        let request = provider.build_request("sys".into(), "one latte".into());
        assert_eq!(request.model, "claude-opus-4-20250514");
        assert_eq!(request.max_tokens, 256);
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, "user");
    }

    #[test]
    fn test_system_prompt_carries_mode_and_summary() {
        let hint = NluHint::new(ModeHint::Extracting, "Current order:\n- 1x Latte");
        let prompt = system_prompt(&hint, "TASK");
        assert!(prompt.starts_with("You are processing a food order."));
        assert!(prompt.contains("TASK"));
        assert!(prompt.contains("- 1x Latte"));
    }

    #[test]
    fn test_parse_draft() {
        let value = serde_json::json!({
            "room_number": "405",
            "items": [
                {"name": "Still Water", "quantity": 2, "modifications": []},
                {"name": "Caesar Salad", "modifications": ["add chicken"]},
                {"name": "Latte", "quantity": -1}
            ]
        });
        let draft = parse_draft(value).unwrap().unwrap();
        assert_eq!(draft.room_number, Some(405));
        assert_eq!(draft.items.len(), 2);
        assert_eq!(draft.items[1].quantity, 1);
        assert_eq!(draft.items[1].modifications, vec!["add chicken"]);

        assert!(parse_draft(serde_json::json!({"items": []})).unwrap().is_none());
    }

    #[test]
    fn test_parse_reply() {
        let select = parse_reply(&serde_json::json!({
            "action": "select", "selected_item": "Add Chicken", "confidence": 0.9
        }));
        assert_eq!(select.selected_label.as_deref(), Some("Add Chicken"));

        let remove = parse_reply(&serde_json::json!({"action": "remove", "confidence": 0.8}));
        assert_eq!(remove.action, ReplyAction::Remove);

        let missing_label = parse_reply(&serde_json::json!({"action": "select", "confidence": 0.8}));
        assert_eq!(missing_label.action, ReplyAction::Unclear);
    }

    #[test]
    fn test_parse_matches_sorted() {
        let matches = parse_matches(&serde_json::json!({
            "matches": [
                {"label": "Latte", "score": 0.4},
                {"label": "Cappuccino", "score": 0.9},
                {"label": "bad"}
            ]
        }));
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].label, "Cappuccino");
    }

    #[test]
    fn test_reply_task_lists_options() {
        let query = PendingQuery::item_replacement(
            "pizza",
            QueryOrigin::Catalog,
            vec![QueryOption::new("Flatbread", 0.82)],
        )
        .unwrap();
        let task = reply_task(&query);
        assert!(task.contains("1. Flatbread (score: 0.82)"));
        assert!(task.contains("Item: pizza"));
    }

    #[test]
    fn test_parse_intent_defaults() {
        let parsed = parse_intent(&serde_json::json!({"intent": "general_inquiry", "confidence": 0.8}));
        assert_eq!(parsed.intent, Intent::GeneralInquiry);
        let empty = parse_intent(&serde_json::json!({}));
        assert_eq!(empty.intent, Intent::Unknown);
        assert_eq!(empty.confidence, 0.0);
    }
}
