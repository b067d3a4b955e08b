//! Turn orchestration for one session.
//!
//! A turn either starts a new request (classify, extract, validate) or
//! answers the active query (interpret, apply, revalidate). Validation ends
//! in exactly one of: a single active query, a rejection, or a committed
//! order.

use roomservice_dialog::{DialogMachine, DialogState, PendingQuery, TransitionError};
use serde::Serialize;
use thiserror::Error;

use crate::context::{ContextStore, ContextUpdate};
use crate::draft::{validate_room_number, OrderDraft};
use crate::engine::OrderEngine;
use crate::finalizer::OrderConfirmation;
use crate::format::{confirmation_summary, query_prompt, retry_prompt};
use crate::inquiry::InquiryAnswer;
use crate::interpreter::ReplyDecision;
use crate::nlu::{Intent, NluError};

const UNSUPPORTED_REPLY: &str =
    "I can help with room service orders and menu questions, but I can't help with that.";
const UNKNOWN_REPLY: &str = "I'm not sure what you'd like. You can order from the menu, for example \
     'two lattes to room 412', or ask about a dish.";
const NO_ORDER_REPLY: &str =
    "I couldn't find an order in that. Could you tell me what you'd like, for example 'one club sandwich'?";

/// One guest message.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnInput {
    pub text: String,
    /// Overrides any room number found in the text
    pub room_number: Option<u32>,
}

impl TurnInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            room_number: None,
        }
    }

    pub fn with_room(mut self, room: u32) -> Self {
        self.room_number = Some(room);
        self
    }
}

/// What the guest gets back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TurnOutcome {
    Confirmed {
        order: OrderConfirmation,
        summary: String,
    },
    NeedsInput {
        prompts: Vec<String>,
        issues: Vec<String>,
        draft: OrderDraft,
        query: PendingQuery,
    },
    Answered {
        answer: InquiryAnswer,
    },
    Rejected {
        reason: String,
        /// Sending the same message again may succeed
        retryable: bool,
    },
}

impl TurnOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, TurnOutcome::Confirmed { .. })
    }

    /// Text shown to the guest.
    pub fn message(&self) -> String {
        match self {
            TurnOutcome::Confirmed { summary, .. } => summary.clone(),
            TurnOutcome::NeedsInput { prompts, .. } => prompts.join("\n"),
            TurnOutcome::Answered { answer } => answer.text.clone(),
            TurnOutcome::Rejected { reason, .. } => reason.clone(),
        }
    }
}

#[derive(Debug, Error)]
enum TurnError {
    #[error(transparent)]
    Nlu(#[from] NluError),

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

#[derive(Debug, Clone)]
pub struct DialogController {
    machine: DialogMachine,
    context: ContextStore,
}

impl DialogController {
    pub fn new(history_window: usize) -> Self {
        Self {
            machine: DialogMachine::new(),
            context: ContextStore::new(history_window),
        }
    }

    pub fn state(&self) -> DialogState {
        self.machine.current()
    }

    pub fn machine(&self) -> &DialogMachine {
        &self.machine
    }

    pub fn context(&self) -> &ContextStore {
        &self.context
    }

    pub fn active_query(&self) -> Option<&PendingQuery> {
        self.context.active_query()
    }

    /// Back to Initial with an empty context. Returns false when there was
    /// nothing to reset.
    pub fn reset(&mut self, reason: &str) -> bool {
        let moved = self.machine.reset(reason).is_some();
        let had_context = !self.context.context().is_empty();
        self.context.clear();
        if moved || had_context {
            tracing::info!(reason, "dialog reset");
        }
        moved || had_context
    }

    /// Run one turn. Provider timeouts and other retryable provider
    /// failures leave the session exactly as it was before the turn.
    pub async fn handle_turn(&mut self, engine: &OrderEngine, input: TurnInput) -> TurnOutcome {
        let snapshot = (self.machine.clone(), self.context.clone());

        match self.run_turn(engine, &input).await {
            Ok(outcome) => outcome,
            Err(TurnError::Nlu(e)) if e.is_retryable() => {
                tracing::warn!(error = %e, state = %self.machine.current(), "rolling back turn");
                (self.machine, self.context) = snapshot;
                TurnOutcome::Rejected {
                    reason: format!(
                        "Sorry, I couldn't process that just now ({}). Please try again.",
                        e
                    ),
                    retryable: true,
                }
            }
            Err(TurnError::Nlu(e)) => {
                tracing::error!(error = %e, "provider failure");
                self.machine.fail(e.to_string());
                TurnOutcome::Rejected {
                    reason: format!("The ordering assistant is unavailable: {}", e),
                    retryable: false,
                }
            }
            Err(TurnError::Transition(e)) => {
                tracing::error!(error = %e, "dialog transition failed");
                self.machine.fail(e.to_string());
                TurnOutcome::Rejected {
                    reason: "Something went wrong with your order. Please start again.".to_string(),
                    retryable: false,
                }
            }
        }
    }

    async fn run_turn(
        &mut self,
        engine: &OrderEngine,
        input: &TurnInput,
    ) -> Result<TurnOutcome, TurnError> {
        let state = self.machine.current();
        let resumable = state == DialogState::Error
            && self.machine.failed_from().is_some_and(|s| s.awaits_reply())
            && self.context.active_query().is_some();

        if state.awaits_reply() || resumable {
            return self.handle_reply(engine, &input.text).await;
        }
        if state != DialogState::Initial {
            self.reset("new request");
        }
        self.start_request(engine, input).await
    }

    async fn start_request(
        &mut self,
        engine: &OrderEngine,
        input: &TurnInput,
    ) -> Result<TurnOutcome, TurnError> {
        let text = input.text.trim();
        self.context
            .merge(ContextUpdate::new().original_text(text));

        self.enter(DialogState::IntentClassification)?;
        let hint = self.context.hint();
        let classification = engine.handle(&hint).classify_intent(text).await?;
        let intent = if classification.confidence < engine.settings().min_intent_confidence {
            Intent::Unknown
        } else {
            classification.intent
        };
        tracing::info!(
            intent = intent.as_str(),
            confidence = classification.confidence,
            "intent classified"
        );

        match intent {
            Intent::GeneralInquiry => {
                self.enter(DialogState::MenuInquiry)?;
                let hint = self.context.hint();
                let answer = engine.inquiry().answer(text, engine.handle(&hint)).await?;
                self.reset("inquiry answered");
                return Ok(TurnOutcome::Answered { answer });
            }
            Intent::UnsupportedAction => return Ok(self.reject(UNSUPPORTED_REPLY, false)),
            Intent::Unknown => return Ok(self.reject(UNKNOWN_REPLY, false)),
            Intent::NewOrder => {}
        }

        self.enter(DialogState::OrderExtraction)?;
        let hint = self.context.hint();
        let menu = engine.catalog().menu_context();
        let Some(mut draft) = engine.handle(&hint).extract_order(text, &menu).await? else {
            tracing::info!("no order extracted");
            return Ok(self.reject(NO_ORDER_REPLY, true));
        };
        if let Some(room) = input.room_number {
            draft.room_number = Some(room);
        }
        match draft.room_number {
            None => {
                return Ok(self.reject("Please tell me your room number (100-999).", true));
            }
            Some(room) => {
                if let Err(e) = validate_room_number(room) {
                    return Ok(self.reject(format!("{}. Please give a room number from 100 to 999.", e), true));
                }
            }
        }

        let requested_mods: Vec<String> = draft
            .items
            .iter()
            .flat_map(|l| l.modifications.iter().cloned())
            .collect();
        self.context
            .merge(ContextUpdate::new().draft(draft).modifications(requested_mods));
        self.enter(DialogState::ItemValidation)?;
        self.validate_and_route(engine).await
    }

    async fn handle_reply(
        &mut self,
        engine: &OrderEngine,
        reply: &str,
    ) -> Result<TurnOutcome, TurnError> {
        let query = match self.context.active_query().cloned() {
            Some(query) => query,
            None => {
                let state = self.machine.current();
                match self
                    .context
                    .reconstruct_query(state, self.context.query_subject())
                {
                    Some(query) => {
                        self.context
                            .merge(ContextUpdate::new().set_query(query.clone()));
                        query
                    }
                    None => {
                        tracing::warn!(state = %state, "awaiting a reply with no query");
                        return Ok(self.reject(
                            "I lost track of the question. Please place your order again.",
                            false,
                        ));
                    }
                }
            }
        };

        self.context.merge(ContextUpdate::new().reply(reply.trim()));
        let hint = self.context.hint();
        let interpreter = engine.interpreter();
        let decision = interpreter
            .interpret(&query, reply, engine.handle(&hint))
            .await?;
        let draft = self.context.draft().cloned().unwrap_or_default();

        let Some(change) = interpreter.apply(&query, &decision, &draft) else {
            let reason = match decision {
                ReplyDecision::Unrecognized { reason } => reason,
                _ => "reply could not be applied".to_string(),
            };
            tracing::info!(%reason, "reply not understood");
            return Ok(TurnOutcome::NeedsInput {
                prompts: vec![retry_prompt(&query)],
                issues: vec![reason],
                draft,
                query,
            });
        };

        self.context.merge(
            ContextUpdate::new()
                .draft(change.draft)
                .modifications([change.description])
                .clear_query(),
        );
        let revalidate = query
            .awaiting_state()
            .revalidation_state()
            .unwrap_or(DialogState::ItemValidation);
        self.enter(revalidate)?;
        self.validate_and_route(engine).await
    }

    /// Validate the current draft and move to wherever the result leads.
    async fn validate_and_route(&mut self, engine: &OrderEngine) -> Result<TurnOutcome, TurnError> {
        let attempts = engine.settings().max_commit_attempts.max(1);
        for attempt in 1..=attempts {
            let draft = self.context.draft().cloned().unwrap_or_default();
            let hint = self.context.hint();
            let result = engine
                .validator()
                .validate(&draft, engine.handle(&hint))
                .await?;

            self.context.merge(
                ContextUpdate::new()
                    .draft(result.draft.clone())
                    .issues(result.issues.clone())
                    .suggestions(result.suggestions.clone()),
            );

            if let Some(query) = result.lead_query().cloned() {
                self.enter(query.awaiting_state())?;
                self.context
                    .merge(ContextUpdate::new().set_query(query.clone()));
                return Ok(TurnOutcome::NeedsInput {
                    prompts: vec![query_prompt(&query)],
                    issues: result.issues,
                    draft: result.draft,
                    query,
                });
            }

            if !result.issues.is_empty() {
                return Ok(self.reject(result.issues.join(" "), false));
            }

            self.enter(DialogState::OrderConfirmation)?;
            match engine
                .finalizer()
                .finalize(engine.catalog(), engine.ledger(), &result.draft)
            {
                Ok(order) => {
                    self.enter(DialogState::OrderCompleted)?;
                    self.context.clear();
                    let summary = confirmation_summary(&order);
                    return Ok(TurnOutcome::Confirmed { order, summary });
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(attempt, error = %e, "stock changed during commit, revalidating");
                    self.enter(DialogState::ItemValidation)?;
                }
                Err(e) => return Ok(self.reject(e.to_string(), false)),
            }
        }

        Ok(self.reject(
            "Stock kept changing while confirming your order. Please try again.",
            true,
        ))
    }

    /// Walk the shortest legal path to `target` and set its mode hint.
    fn enter(&mut self, target: DialogState) -> Result<(), TransitionError> {
        for step in self.machine.walk_to(target)? {
            tracing::debug!(from = %step.from, to = %step.to, trigger = %step.trigger, "transition");
        }
        self.context
            .merge(ContextUpdate::new().mode(target.mode_hint()));
        Ok(())
    }

    fn reject(&mut self, reason: impl Into<String>, retryable: bool) -> TurnOutcome {
        let reason = reason.into();
        self.machine.fail(reason.clone());
        self.context
            .merge(ContextUpdate::new().mode(DialogState::Error.mode_hint()));
        tracing::info!(%reason, retryable, "turn rejected");
        TurnOutcome::Rejected { reason, retryable }
    }
}

impl Default for DialogController {
    fn default() -> Self {
        Self::new(crate::context::DEFAULT_HISTORY_WINDOW)
    }
}
