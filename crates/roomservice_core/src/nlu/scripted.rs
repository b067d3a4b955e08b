//! Scripted provider for deterministic conversation tests.
//!
//! Answers are keyed by normalized input text. Anything unscripted gets a
//! neutral default: `NewOrder` at 0.95, no draft, an unclear reply and no
//! semantic matches. Every call is recorded for assertions.

use async_trait::async_trait;
use roomservice_dialog::{ModeHint, PendingQuery};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::{
    Intent, IntentClassification, NluError, NluHint, NluProvider, Relatedness,
    ReplyInterpretation, SemanticCandidate,
};
use crate::draft::OrderDraft;
use crate::matching::normalize;

/// One recorded provider call
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub operation: &'static str,
    pub text: String,
    pub mode: ModeHint,
}

pub struct ScriptedNlu {
    default_intent: IntentClassification,
    intents: HashMap<String, IntentClassification>,
    drafts: HashMap<String, OrderDraft>,
    replies: HashMap<String, ReplyInterpretation>,
    semantic: HashMap<String, Vec<Relatedness>>,
    failures: HashMap<String, NluError>,
    slow: HashMap<String, Duration>,
    delay: Option<Duration>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedNlu {
    pub fn new() -> Self {
        Self {
            default_intent: IntentClassification::new(Intent::NewOrder, 0.95),
            intents: HashMap::new(),
            drafts: HashMap::new(),
            replies: HashMap::new(),
            semantic: HashMap::new(),
            failures: HashMap::new(),
            slow: HashMap::new(),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_default_intent(mut self, intent: Intent, confidence: f64) -> Self {
        self.default_intent = IntentClassification::new(intent, confidence);
        self
    }

    pub fn with_intent(mut self, text: &str, intent: Intent, confidence: f64) -> Self {
        self.intents
            .insert(normalize(text), IntentClassification::new(intent, confidence));
        self
    }

    pub fn with_draft(mut self, text: &str, draft: OrderDraft) -> Self {
        self.drafts.insert(normalize(text), draft);
        self
    }

    pub fn with_reply(mut self, text: &str, reply: ReplyInterpretation) -> Self {
        self.replies.insert(normalize(text), reply);
        self
    }

    /// Ranking returned when semantic search is asked about `query`.
    pub fn with_semantic(mut self, query: &str, ranked: &[(&str, f64)]) -> Self {
        self.semantic.insert(
            normalize(query),
            ranked
                .iter()
                .map(|(label, score)| Relatedness::new(*label, *score))
                .collect(),
        );
        self
    }

    /// Any call whose text is `text` fails with `error`.
    pub fn with_failure(mut self, text: &str, error: NluError) -> Self {
        self.failures.insert(normalize(text), error);
        self
    }

    /// Any call whose text is `text` sleeps before answering.
    pub fn with_slow(mut self, text: &str, delay: Duration) -> Self {
        self.slow.insert(normalize(text), delay);
        self
    }

    /// Every call sleeps before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock_calls().clone()
    }

    pub fn calls_for(&self, operation: &str) -> Vec<RecordedCall> {
        self.lock_calls()
            .iter()
            .filter(|c| c.operation == operation)
            .cloned()
            .collect()
    }

    fn lock_calls(&self) -> MutexGuard<'_, Vec<RecordedCall>> {
        self.calls.lock().unwrap_or_else(|p| p.into_inner())
    }

    async fn enter(&self, operation: &'static str, text: &str, hint: &NluHint) -> Result<String, NluError> {
        let key = normalize(text);
        self.lock_calls().push(RecordedCall {
            operation,
            text: text.to_string(),
            mode: hint.mode,
        });
        if let Some(delay) = self.slow.get(&key).copied().or(self.delay) {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.failures.get(&key) {
            return Err(error.clone());
        }
        Ok(key)
    }
}

impl Default for ScriptedNlu {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NluProvider for ScriptedNlu {
    fn name(&self) -> &str {
        "Scripted"
    }

    fn is_ready(&self) -> bool {
        true
    }

    async fn classify_intent(
        &self,
        text: &str,
        hint: &NluHint,
    ) -> Result<IntentClassification, NluError> {
        let key = self.enter("classify_intent", text, hint).await?;
        Ok(self.intents.get(&key).copied().unwrap_or(self.default_intent))
    }

    async fn extract_order(
        &self,
        text: &str,
        _menu_context: &str,
        hint: &NluHint,
    ) -> Result<Option<OrderDraft>, NluError> {
        let key = self.enter("extract_order", text, hint).await?;
        Ok(self.drafts.get(&key).cloned())
    }

    async fn interpret_reply(
        &self,
        _query: &PendingQuery,
        text: &str,
        hint: &NluHint,
    ) -> Result<ReplyInterpretation, NluError> {
        let key = self.enter("interpret_reply", text, hint).await?;
        Ok(self
            .replies
            .get(&key)
            .cloned()
            .unwrap_or_else(ReplyInterpretation::unclear))
    }

    async fn semantic_search(
        &self,
        query: &str,
        _candidates: &[SemanticCandidate],
        hint: &NluHint,
    ) -> Result<Vec<Relatedness>, NluError> {
        let key = self.enter("semantic_search", query, hint).await?;
        Ok(self.semantic.get(&key).cloned().unwrap_or_default())
    }
}
