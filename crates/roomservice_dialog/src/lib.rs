//! Dialog core types and state machine.
//!
//! Canonical definitions for DialogState, the trigger-labelled transition
//! table, Error recovery exits, and the pending disambiguation query.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;

pub mod query;

pub use query::{PendingQuery, QueryError, QueryKind, QueryOption, QueryOrigin};

/// Transition history kept per machine; older entries are dropped.
const MAX_HISTORY: usize = 256;

// ============================================================================
// Dialog State - The core state machine
// ============================================================================

/// Conversation states for one room service session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DialogState {
    /// Start state, nothing in progress
    Initial,
    /// Deciding what the guest wants
    IntentClassification,
    /// Answering a question about the menu
    MenuInquiry,
    /// Turning free text into a draft order
    OrderExtraction,
    /// Resolving item names against the catalog
    ItemValidation,
    /// Waiting for the guest to pick or drop an item
    ItemSelection,
    /// Resolving modifications against the owning item
    ModificationValidation,
    /// Waiting for the guest to pick or drop a modification
    ModificationSelection,
    /// Checking requested quantities against stock
    QuantityValidation,
    /// Waiting for the guest to accept a reduced quantity or alternative
    QuantityAdjustment,
    /// Committing the order
    OrderConfirmation,
    /// Terminal: order committed
    OrderCompleted,
    /// Something went wrong; resume or reset
    Error,
}

impl DialogState {
    pub const ALL: [DialogState; 13] = [
        DialogState::Initial,
        DialogState::IntentClassification,
        DialogState::MenuInquiry,
        DialogState::OrderExtraction,
        DialogState::ItemValidation,
        DialogState::ItemSelection,
        DialogState::ModificationValidation,
        DialogState::ModificationSelection,
        DialogState::QuantityValidation,
        DialogState::QuantityAdjustment,
        DialogState::OrderConfirmation,
        DialogState::OrderCompleted,
        DialogState::Error,
    ];

    /// Get the canonical string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            DialogState::Initial => "INITIAL",
            DialogState::IntentClassification => "INTENT_CLASSIFICATION",
            DialogState::MenuInquiry => "MENU_INQUIRY",
            DialogState::OrderExtraction => "ORDER_EXTRACTION",
            DialogState::ItemValidation => "ITEM_VALIDATION",
            DialogState::ItemSelection => "ITEM_SELECTION",
            DialogState::ModificationValidation => "MODIFICATION_VALIDATION",
            DialogState::ModificationSelection => "MODIFICATION_SELECTION",
            DialogState::QuantityValidation => "QUANTITY_VALIDATION",
            DialogState::QuantityAdjustment => "QUANTITY_ADJUSTMENT",
            DialogState::OrderConfirmation => "ORDER_CONFIRMATION",
            DialogState::OrderCompleted => "ORDER_COMPLETED",
            DialogState::Error => "ERROR",
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DialogState::OrderCompleted)
    }

    /// Check if the session is parked here waiting for a disambiguation reply.
    pub fn awaits_reply(&self) -> bool {
        matches!(
            self,
            DialogState::ItemSelection
                | DialogState::ModificationSelection
                | DialogState::QuantityAdjustment
        )
    }

    /// Check if this state runs a validation pass.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            DialogState::ItemValidation
                | DialogState::ModificationValidation
                | DialogState::QuantityValidation
        )
    }

    /// The validation state a reply state returns to once the reply is applied.
    pub fn revalidation_state(&self) -> Option<DialogState> {
        match self {
            DialogState::ItemSelection => Some(DialogState::ItemValidation),
            DialogState::ModificationSelection => Some(DialogState::ModificationValidation),
            DialogState::QuantityAdjustment => Some(DialogState::QuantityValidation),
            _ => None,
        }
    }

    /// Provider-facing mode hint set on entry to this state.
    pub fn mode_hint(&self) -> ModeHint {
        match self {
            DialogState::Initial => ModeHint::Initial,
            DialogState::IntentClassification => ModeHint::Classifying,
            DialogState::MenuInquiry => ModeHint::MenuInquiry,
            DialogState::OrderExtraction => ModeHint::Extracting,
            DialogState::ItemValidation
            | DialogState::ModificationValidation
            | DialogState::QuantityValidation => ModeHint::Validating,
            DialogState::ItemSelection
            | DialogState::ModificationSelection
            | DialogState::QuantityAdjustment => ModeHint::Disambiguating,
            DialogState::OrderConfirmation | DialogState::OrderCompleted => ModeHint::Confirming,
            DialogState::Error => ModeHint::Recovering,
        }
    }

    /// Legal forward transitions from this state.
    ///
    /// Error and reset are universal and not listed here. Error's own exits
    /// depend on the state that failed, see [`error_exits`].
    pub fn valid_transitions(&self) -> &'static [DialogState] {
        match self {
            DialogState::Initial => &[DialogState::IntentClassification],
            DialogState::IntentClassification => {
                &[DialogState::MenuInquiry, DialogState::OrderExtraction]
            }
            DialogState::MenuInquiry => &[],
            DialogState::OrderExtraction => &[DialogState::ItemValidation],
            DialogState::ItemValidation => &[
                DialogState::ItemSelection,
                DialogState::ModificationValidation,
            ],
            DialogState::ItemSelection => &[DialogState::ItemValidation],
            DialogState::ModificationValidation => &[
                DialogState::ModificationSelection,
                DialogState::QuantityValidation,
            ],
            DialogState::ModificationSelection => &[DialogState::ModificationValidation],
            DialogState::QuantityValidation => &[
                DialogState::QuantityAdjustment,
                DialogState::OrderConfirmation,
                DialogState::ItemValidation,
            ],
            DialogState::QuantityAdjustment => &[DialogState::QuantityValidation],
            DialogState::OrderConfirmation => &[
                DialogState::OrderCompleted,
                DialogState::ItemValidation,
                DialogState::QuantityValidation,
            ],
            DialogState::OrderCompleted => &[],
            DialogState::Error => &[],
        }
    }

    /// Check if a forward transition to the target state is valid.
    pub fn can_transition_to(&self, target: DialogState) -> bool {
        self.valid_transitions().contains(&target)
    }

    /// Shortest chain of forward transitions from `self` to `target`.
    ///
    /// Returns the states to enter in order, excluding `self`. An empty
    /// vector means `self == target`.
    pub fn route_to(&self, target: DialogState) -> Option<Vec<DialogState>> {
        if *self == target {
            return Some(Vec::new());
        }

        let mut previous: Vec<Option<DialogState>> = vec![None; DialogState::ALL.len()];
        let mut seen = [false; DialogState::ALL.len()];
        let mut queue = VecDeque::new();
        seen[self.index()] = true;
        queue.push_back(*self);

        while let Some(state) = queue.pop_front() {
            for next in state.valid_transitions() {
                if seen[next.index()] {
                    continue;
                }
                seen[next.index()] = true;
                previous[next.index()] = Some(state);
                if *next == target {
                    let mut path = vec![target];
                    let mut cursor = state;
                    while cursor != *self {
                        path.push(cursor);
                        cursor = previous[cursor.index()]?;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(*next);
            }
        }

        None
    }

    fn index(&self) -> usize {
        DialogState::ALL
            .iter()
            .position(|s| s == self)
            .unwrap_or_default()
    }
}

impl fmt::Display for DialogState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Error when parsing a DialogState from string.
#[derive(Debug, Error, Clone)]
#[error("invalid state: {0}")]
pub struct StateParseError(String);

impl std::str::FromStr for DialogState {
    type Err = StateParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DialogState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| StateParseError(s.to_string()))
    }
}

/// Destinations available after a failure in `failed_from`.
///
/// Whatever `failed_from` could move to next, plus reset to Initial.
pub fn error_exits(failed_from: DialogState) -> Vec<DialogState> {
    let mut exits: Vec<DialogState> = failed_from
        .valid_transitions()
        .iter()
        .copied()
        .filter(|s| *s != DialogState::Error)
        .collect();
    if !exits.contains(&DialogState::Initial) {
        exits.push(DialogState::Initial);
    }
    exits
}

/// Where a session that failed in `failed_from` should go when it wants `desired`.
///
/// Falls back to Initial when `desired` is not reachable from Error.
pub fn recovery_target(failed_from: DialogState, desired: DialogState) -> DialogState {
    if error_exits(failed_from).contains(&desired) {
        desired
    } else {
        DialogState::Initial
    }
}

// ============================================================================
// Triggers and mode hints
// ============================================================================

/// Labels for the edges of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    ClassifyIntent,
    AnswerInquiry,
    ExtractOrder,
    ValidateItems,
    SelectItem,
    ValidateModifications,
    SelectModifications,
    ValidateQuantity,
    AdjustQuantity,
    ConfirmOrder,
    CompleteOrder,
    Fail,
    Reset,
}

impl Trigger {
    /// The trigger whose edges all end in `state`.
    pub fn for_destination(state: DialogState) -> Trigger {
        match state {
            DialogState::Initial => Trigger::Reset,
            DialogState::IntentClassification => Trigger::ClassifyIntent,
            DialogState::MenuInquiry => Trigger::AnswerInquiry,
            DialogState::OrderExtraction => Trigger::ExtractOrder,
            DialogState::ItemValidation => Trigger::ValidateItems,
            DialogState::ItemSelection => Trigger::SelectItem,
            DialogState::ModificationValidation => Trigger::ValidateModifications,
            DialogState::ModificationSelection => Trigger::SelectModifications,
            DialogState::QuantityValidation => Trigger::ValidateQuantity,
            DialogState::QuantityAdjustment => Trigger::AdjustQuantity,
            DialogState::OrderConfirmation => Trigger::ConfirmOrder,
            DialogState::OrderCompleted => Trigger::CompleteOrder,
            DialogState::Error => Trigger::Fail,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::ClassifyIntent => "classify_intent",
            Trigger::AnswerInquiry => "answer_inquiry",
            Trigger::ExtractOrder => "extract_order",
            Trigger::ValidateItems => "validate_items",
            Trigger::SelectItem => "select_item",
            Trigger::ValidateModifications => "validate_modifications",
            Trigger::SelectModifications => "select_modifications",
            Trigger::ValidateQuantity => "validate_quantity",
            Trigger::AdjustQuantity => "adjust_quantity",
            Trigger::ConfirmOrder => "confirm_order",
            Trigger::CompleteOrder => "complete_order",
            Trigger::Fail => "fail",
            Trigger::Reset => "reset",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Hint for the NLU provider about what the dialog is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModeHint {
    #[default]
    Initial,
    Classifying,
    MenuInquiry,
    Extracting,
    Validating,
    Disambiguating,
    Confirming,
    Recovering,
}

impl ModeHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModeHint::Initial => "initial",
            ModeHint::Classifying => "classifying",
            ModeHint::MenuInquiry => "menu_inquiry",
            ModeHint::Extracting => "extracting",
            ModeHint::Validating => "validating",
            ModeHint::Disambiguating => "disambiguating",
            ModeHint::Confirming => "confirming",
            ModeHint::Recovering => "recovering",
        }
    }
}

impl fmt::Display for ModeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// State Transition
// ============================================================================

/// A state transition event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: DialogState,
    pub to: DialogState,
    pub trigger: Trigger,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StateTransition {
    pub fn new(from: DialogState, to: DialogState) -> Self {
        Self {
            from,
            to,
            trigger: Trigger::for_destination(to),
            timestamp: Utc::now(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

// ============================================================================
// Dialog Machine
// ============================================================================

/// Errors for state machine operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: DialogState, to: DialogState },

    #[error("no route from {from} to {to}")]
    Unreachable { from: DialogState, to: DialogState },

    #[error("state is terminal: {0}")]
    TerminalState(DialogState),
}

/// State machine for one session.
#[derive(Debug, Clone)]
pub struct DialogMachine {
    current: DialogState,
    failed_from: Option<DialogState>,
    exits: Vec<DialogState>,
    history: Vec<StateTransition>,
}

impl DialogMachine {
    /// Create a new machine in Initial.
    pub fn new() -> Self {
        Self {
            current: DialogState::Initial,
            failed_from: None,
            exits: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Get the current state.
    pub fn current(&self) -> DialogState {
        self.current
    }

    /// The state that failed, while the machine sits in Error.
    pub fn failed_from(&self) -> Option<DialogState> {
        self.failed_from
    }

    /// Get the transition history.
    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    /// Every state reachable in one step from here, Error and reset included.
    pub fn legal_destinations(&self) -> Vec<DialogState> {
        let mut out: Vec<DialogState> = if self.current == DialogState::Error {
            self.exits.clone()
        } else {
            self.current.valid_transitions().to_vec()
        };
        for universal in [DialogState::Error, DialogState::Initial] {
            if !out.contains(&universal) {
                out.push(universal);
            }
        }
        out
    }

    /// Check if a single step to `to` is legal right now.
    pub fn can_transition_to(&self, to: DialogState) -> bool {
        self.legal_destinations().contains(&to)
    }

    /// Attempt to transition to a new state.
    pub fn transition(&mut self, to: DialogState) -> Result<StateTransition, TransitionError> {
        self.transition_with_reason(to, None)
    }

    /// Attempt to transition with a reason.
    ///
    /// Error and Initial are always accepted and route through
    /// [`fail`](Self::fail) and [`reset`](Self::reset).
    pub fn transition_with_reason(
        &mut self,
        to: DialogState,
        reason: Option<String>,
    ) -> Result<StateTransition, TransitionError> {
        match to {
            DialogState::Error => {
                return Ok(self.fail(reason.unwrap_or_else(|| "failure".to_string())));
            }
            DialogState::Initial => {
                let reason = reason.unwrap_or_else(|| "reset".to_string());
                return Ok(self.reset(reason.clone()).unwrap_or_else(|| {
                    StateTransition::new(DialogState::Initial, DialogState::Initial)
                        .with_reason(reason)
                }));
            }
            _ => {}
        }

        if self.current.is_terminal() {
            return Err(TransitionError::TerminalState(self.current));
        }

        let allowed = if self.current == DialogState::Error {
            self.exits.contains(&to)
        } else {
            self.current.can_transition_to(to)
        };
        if !allowed {
            return Err(TransitionError::InvalidTransition {
                from: self.current,
                to,
            });
        }

        let mut transition = StateTransition::new(self.current, to);
        if let Some(r) = reason {
            transition = transition.with_reason(r);
        }

        self.failed_from = None;
        self.exits.clear();
        self.current = to;
        self.record(transition.clone());

        Ok(transition)
    }

    /// Walk the shortest chain of legal transitions to `target`.
    ///
    /// Nothing changes when no chain exists.
    pub fn walk_to(&mut self, target: DialogState) -> Result<Vec<StateTransition>, TransitionError> {
        if matches!(target, DialogState::Error | DialogState::Initial) {
            return Ok(vec![self.transition(target)?]);
        }
        if self.current.is_terminal() {
            return Err(TransitionError::TerminalState(self.current));
        }

        let path = if self.current == DialogState::Error {
            self.exits
                .iter()
                .filter_map(|exit| {
                    exit.route_to(target).map(|mut rest| {
                        rest.insert(0, *exit);
                        rest
                    })
                })
                .min_by_key(|path| path.len())
        } else {
            self.current.route_to(target)
        };

        let path = path.ok_or(TransitionError::Unreachable {
            from: self.current,
            to: target,
        })?;

        let mut taken = Vec::with_capacity(path.len());
        for step in path {
            taken.push(self.transition(step)?);
        }
        Ok(taken)
    }

    /// Move to Error. Always succeeds.
    ///
    /// A failure while already in Error keeps the original failed-from state
    /// so its resume exits survive.
    pub fn fail(&mut self, reason: impl Into<String>) -> StateTransition {
        let origin = if self.current == DialogState::Error {
            self.failed_from.unwrap_or(DialogState::Initial)
        } else {
            self.current
        };
        let transition = StateTransition::new(self.current, DialogState::Error).with_reason(reason);
        self.failed_from = Some(origin);
        self.exits = error_exits(origin);
        self.current = DialogState::Error;
        self.record(transition.clone());
        transition
    }

    /// Return to Initial. A second reset in a row records nothing.
    pub fn reset(&mut self, reason: impl Into<String>) -> Option<StateTransition> {
        if self.current == DialogState::Initial && self.failed_from.is_none() {
            return None;
        }
        let transition =
            StateTransition::new(self.current, DialogState::Initial).with_reason(reason);
        self.failed_from = None;
        self.exits.clear();
        self.current = DialogState::Initial;
        self.record(transition.clone());
        Some(transition)
    }

    fn record(&mut self, transition: StateTransition) {
        self.history.push(transition);
        if self.history.len() > MAX_HISTORY {
            let excess = self.history.len() - MAX_HISTORY;
            self.history.drain(..excess);
        }
    }
}

impl Default for DialogMachine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
