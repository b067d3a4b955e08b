//! Applying a guest's reply to the active query.

use roomservice_dialog::PendingQuery;
use serde::Serialize;

use crate::draft::OrderDraft;
use crate::matching::normalize;
use crate::nlu::{NluError, NluHandle, ReplyAction, ReplyInterpretation};

pub const DEFAULT_MIN_REPLY_CONFIDENCE: f64 = 0.5;

/// What a reply means for the active query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ReplyDecision {
    /// One of the offered options, by its canonical label
    Select { label: String, confidence: f64 },
    Remove,
    Unrecognized { reason: String },
}

/// Draft after a reply was applied.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedChange {
    pub draft: OrderDraft,
    pub description: String,
}

#[derive(Debug, Clone, Copy)]
pub struct ResponseInterpreter {
    min_confidence: f64,
}

impl ResponseInterpreter {
    pub fn new(min_confidence: f64) -> Self {
        Self { min_confidence }
    }

    pub async fn interpret(
        &self,
        query: &PendingQuery,
        reply: &str,
        nlu: NluHandle<'_>,
    ) -> Result<ReplyDecision, NluError> {
        let interpretation = nlu.interpret_reply(query, reply).await?;
        let decision = self.decide(query, &interpretation);
        tracing::debug!(kind = %query.kind(), subject = query.subject(), ?decision, "reply interpreted");
        Ok(decision)
    }

    /// Check a provider interpretation against the query. A selection has
    /// to name an offered option.
    pub fn decide(&self, query: &PendingQuery, interpretation: &ReplyInterpretation) -> ReplyDecision {
        if interpretation.action == ReplyAction::Unclear {
            return unrecognized("reply did not answer the question");
        }
        if interpretation.confidence < self.min_confidence {
            return unrecognized(format!(
                "confidence {:.2} below {:.2}",
                interpretation.confidence, self.min_confidence
            ));
        }

        match interpretation.action {
            ReplyAction::Remove => ReplyDecision::Remove,
            ReplyAction::Select => {
                let Some(label) = interpretation.selected_label.as_deref() else {
                    return unrecognized("selection without a label");
                };
                match query.find_option(label) {
                    Some(option) => ReplyDecision::Select {
                        label: option.label,
                        confidence: interpretation.confidence,
                    },
                    None => unrecognized(format!("'{}' is not one of the options", label)),
                }
            }
            ReplyAction::Unclear => unrecognized("reply did not answer the question"),
        }
    }

    /// Apply a decision to a copy of `draft`. `None` when nothing changes.
    pub fn apply(
        &self,
        query: &PendingQuery,
        decision: &ReplyDecision,
        draft: &OrderDraft,
    ) -> Option<AppliedChange> {
        let mut draft = draft.clone();
        let item = query.item();
        if !draft.items.iter().any(|l| l.is_named(item)) {
            tracing::warn!(item, "reply targets an item no longer on the draft");
            return None;
        }

        let description = match (query, decision) {
            (_, ReplyDecision::Unrecognized { .. }) => return None,

            (PendingQuery::ItemReplacement { .. }, ReplyDecision::Select { label, .. }) => {
                for line in draft.items.iter_mut().filter(|l| l.is_named(item)) {
                    line.name = label.clone();
                    line.category = None;
                }
                format!("Replaced {} with {}", item, label)
            }

            (
                PendingQuery::ModificationReplacement { modification, .. },
                ReplyDecision::Select { label, .. },
            ) => {
                let key = normalize(modification);
                for line in draft.items.iter_mut().filter(|l| l.is_named(item)) {
                    for m in line.modifications.iter_mut().filter(|m| normalize(m) == key) {
                        *m = label.clone();
                    }
                }
                format!("Changed '{}' to '{}' on {}", modification, label, item)
            }

            (PendingQuery::QuantityAdjustment { .. }, ReplyDecision::Select { label, .. }) => {
                let quantity: u32 = label.parse().ok()?;
                let mut kept = false;
                draft.items.retain_mut(|line| {
                    if !line.is_named(item) {
                        return true;
                    }
                    if kept {
                        return false;
                    }
                    line.quantity = quantity;
                    kept = true;
                    true
                });
                format!("Set {} to {}", item, quantity)
            }

            (
                PendingQuery::ItemReplacement { .. }
                | PendingQuery::ItemRemoval { .. }
                | PendingQuery::QuantityAdjustment { .. },
                ReplyDecision::Remove,
            ) => {
                draft.items.retain(|l| !l.is_named(item));
                format!("Removed {}", item)
            }

            (
                PendingQuery::ModificationReplacement { modification, .. }
                | PendingQuery::ModificationRemoval { modification, .. },
                ReplyDecision::Remove,
            ) => {
                let key = normalize(modification);
                for line in draft.items.iter_mut().filter(|l| l.is_named(item)) {
                    line.modifications.retain(|m| normalize(m) != key);
                }
                format!("Removed '{}' from {}", modification, item)
            }

            (PendingQuery::ModificationRemovalAll { .. }, ReplyDecision::Remove) => {
                for line in draft.items.iter_mut().filter(|l| l.is_named(item)) {
                    line.modifications.clear();
                }
                format!("Removed all modifications from {}", item)
            }

            // Removal-only queries have nothing to select.
            (_, ReplyDecision::Select { .. }) => return None,
        };

        tracing::info!(kind = %query.kind(), %description, "reply applied");
        Some(AppliedChange { draft, description })
    }
}

impl Default for ResponseInterpreter {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_REPLY_CONFIDENCE)
    }
}

fn unrecognized(reason: impl Into<String>) -> ReplyDecision {
    ReplyDecision::Unrecognized {
        reason: reason.into(),
    }
}
