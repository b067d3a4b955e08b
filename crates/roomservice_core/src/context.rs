//! Per-session conversation context and its merge rules.
//!
//! Each field has one policy:
//!
//! | field                                       | policy                         |
//! |---------------------------------------------|--------------------------------|
//! | original text, draft, mode                  | replace when supplied          |
//! | modifications, issues, suggestions, replies | append, keep the last `window` |
//! | active query                                | only changed by an explicit    |
//! |                                             | `Set` or `Clear`               |
//! | query subject                               | replaced by `Set`, kept on     |
//! |                                             | `Clear`                        |

use roomservice_dialog::{DialogState, ModeHint, PendingQuery, QueryOrigin};
use serde::Serialize;
use std::collections::VecDeque;

use crate::draft::OrderDraft;
use crate::nlu::NluHint;
use crate::validation::{MatchStage, Suggestion};

pub const DEFAULT_HISTORY_WINDOW: usize = 5;

/// Item and optional modification a query is about, lowercased.
pub type SubjectKey = (String, Option<String>);

/// Append-only list that keeps only the most recent entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundedHistory<T> {
    window: usize,
    entries: VecDeque<T>,
}

impl<T> BoundedHistory<T> {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn push(&mut self, entry: T) {
        if self.entries.len() == self.window {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = T>) {
        for entry in entries {
            self.push(entry);
        }
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// What a turn wants done with the active query.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum QueryUpdate {
    #[default]
    Keep,
    Set(PendingQuery),
    Clear,
}

/// Partial update supplied by one turn. Unset fields leave the context alone.
#[derive(Debug, Clone, Default)]
pub struct ContextUpdate {
    pub original_text: Option<String>,
    pub draft: Option<OrderDraft>,
    pub modifications: Vec<String>,
    pub issues: Vec<String>,
    pub suggestions: Vec<Suggestion>,
    pub replies: Vec<String>,
    pub query: QueryUpdate,
    pub mode: Option<ModeHint>,
}

impl ContextUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn original_text(mut self, text: impl Into<String>) -> Self {
        self.original_text = Some(text.into());
        self
    }

    pub fn draft(mut self, draft: OrderDraft) -> Self {
        self.draft = Some(draft);
        self
    }

    pub fn modifications(mut self, modifications: impl IntoIterator<Item = String>) -> Self {
        self.modifications.extend(modifications);
        self
    }

    pub fn issues(mut self, issues: impl IntoIterator<Item = String>) -> Self {
        self.issues.extend(issues);
        self
    }

    pub fn suggestions(mut self, suggestions: impl IntoIterator<Item = Suggestion>) -> Self {
        self.suggestions.extend(suggestions);
        self
    }

    pub fn reply(mut self, reply: impl Into<String>) -> Self {
        self.replies.push(reply.into());
        self
    }

    pub fn set_query(mut self, query: PendingQuery) -> Self {
        self.query = QueryUpdate::Set(query);
        self
    }

    pub fn clear_query(mut self) -> Self {
        self.query = QueryUpdate::Clear;
        self
    }

    pub fn mode(mut self, mode: ModeHint) -> Self {
        self.mode = Some(mode);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationContext {
    pub original_text: Option<String>,
    pub draft: Option<OrderDraft>,
    pub modifications: BoundedHistory<String>,
    pub issues: BoundedHistory<String>,
    pub suggestions: BoundedHistory<Suggestion>,
    pub replies: BoundedHistory<String>,
    pub active_query: Option<PendingQuery>,
    /// Subject of the last query raised, still known after the query is gone
    pub query_subject: Option<SubjectKey>,
    pub mode: ModeHint,
}

impl ConversationContext {
    fn empty(window: usize) -> Self {
        Self {
            original_text: None,
            draft: None,
            modifications: BoundedHistory::new(window),
            issues: BoundedHistory::new(window),
            suggestions: BoundedHistory::new(window),
            replies: BoundedHistory::new(window),
            active_query: None,
            query_subject: None,
            mode: ModeHint::Initial,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.original_text.is_none()
            && self.draft.is_none()
            && self.modifications.is_empty()
            && self.issues.is_empty()
            && self.suggestions.is_empty()
            && self.replies.is_empty()
            && self.active_query.is_none()
            && self.query_subject.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContextStore {
    window: usize,
    context: ConversationContext,
}

impl ContextStore {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            context: ConversationContext::empty(window),
        }
    }

    pub fn context(&self) -> &ConversationContext {
        &self.context
    }

    pub fn draft(&self) -> Option<&OrderDraft> {
        self.context.draft.as_ref()
    }

    pub fn active_query(&self) -> Option<&PendingQuery> {
        self.context.active_query.as_ref()
    }

    pub fn mode(&self) -> ModeHint {
        self.context.mode
    }

    pub fn query_subject(&self) -> Option<&SubjectKey> {
        self.context.query_subject.as_ref()
    }

    pub fn merge(&mut self, update: ContextUpdate) {
        let ctx = &mut self.context;
        if let Some(text) = update.original_text {
            ctx.original_text = Some(text);
        }
        if let Some(draft) = update.draft {
            ctx.draft = Some(draft);
        }
        if let Some(mode) = update.mode {
            ctx.mode = mode;
        }
        ctx.modifications.extend(update.modifications);
        ctx.issues.extend(update.issues);
        ctx.suggestions.extend(update.suggestions);
        ctx.replies.extend(update.replies);

        match update.query {
            QueryUpdate::Keep => {}
            QueryUpdate::Set(query) => {
                tracing::debug!(kind = %query.kind(), subject = query.subject(), "active query set");
                ctx.query_subject = Some(query.subject_key());
                ctx.active_query = Some(query);
            }
            QueryUpdate::Clear => {
                if ctx.active_query.take().is_some() {
                    tracing::debug!("active query cleared");
                }
            }
        }
    }

    /// Drop everything. Clearing an empty store is a no-op.
    pub fn clear(&mut self) {
        self.context = ConversationContext::empty(self.window);
    }

    /// Rebuild a query for a selection state from the most recent suggestion
    /// that fits it. Used when a selection state is entered without an
    /// explicit query. With a subject, only suggestions about that subject
    /// are considered.
    pub fn reconstruct_query(
        &self,
        state: DialogState,
        subject: Option<&SubjectKey>,
    ) -> Option<PendingQuery> {
        let matches_subject = |s: &Suggestion| match subject {
            None => true,
            Some((item, None)) => s.item.is_none() && s.subject.eq_ignore_ascii_case(item),
            Some((item, Some(modification))) => {
                s.item.as_deref().is_some_and(|i| i.eq_ignore_ascii_case(item))
                    && s.subject.eq_ignore_ascii_case(modification)
            }
        };

        let suggestion = self.context.suggestions.iter().rev().find(|s| {
            matches_subject(s)
                && !s.alternatives.is_empty()
                && match state {
                    DialogState::ItemSelection => {
                        s.stage == MatchStage::Semantic && s.item.is_none()
                    }
                    DialogState::ModificationSelection => {
                        s.stage == MatchStage::Semantic && s.item.is_some()
                    }
                    DialogState::QuantityAdjustment => s.stage == MatchStage::Stock,
                    _ => false,
                }
        })?;

        let rebuilt = match (&suggestion.item, suggestion.stage, suggestion.shortfall) {
            (Some(item), _, _) => PendingQuery::modification_replacement(
                item,
                &suggestion.subject,
                suggestion.alternatives.clone(),
            ),
            (None, MatchStage::Stock, Some(shortfall)) => PendingQuery::quantity_adjustment(
                &suggestion.subject,
                shortfall.requested,
                shortfall.available,
            ),
            (None, MatchStage::Stock, None) => PendingQuery::item_replacement(
                &suggestion.subject,
                QueryOrigin::Stock,
                suggestion.alternatives.clone(),
            ),
            (None, _, _) => PendingQuery::item_replacement(
                &suggestion.subject,
                QueryOrigin::Catalog,
                suggestion.alternatives.clone(),
            ),
        };
        match rebuilt {
            Ok(query) => {
                tracing::warn!(state = state.as_str(), subject = query.subject(), "reconstructed query from suggestion history");
                Some(query)
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not reconstruct query");
                None
            }
        }
    }

    /// Short summary of where the conversation stands.
    pub fn summary(&self) -> String {
        let ctx = &self.context;
        let mut parts = Vec::new();
        if let Some(draft) = &ctx.draft {
            let items: Vec<String> = draft
                .items
                .iter()
                .map(|l| {
                    if l.modifications.is_empty() {
                        format!("{}x {}", l.quantity, l.name)
                    } else {
                        format!("{}x {} ({})", l.quantity, l.name, l.modifications.join(", "))
                    }
                })
                .collect();
            if !items.is_empty() {
                parts.push(format!("Draft: {}", items.join("; ")));
            }
            if let Some(room) = draft.room_number {
                parts.push(format!("Room: {}", room));
            }
        }
        if let Some(query) = &ctx.active_query {
            parts.push(format!("Awaiting {} for '{}'", query.kind(), query.subject()));
        }
        if !ctx.issues.is_empty() {
            let recent: Vec<&str> = ctx.issues.iter().map(String::as_str).collect();
            parts.push(format!("Recent issues: {}", recent.join("; ")));
        }
        if let Some(reply) = ctx.replies.latest() {
            parts.push(format!("Last reply: {}", reply));
        }
        parts.join("\n")
    }

    pub fn hint(&self) -> NluHint {
        NluHint::new(self.context.mode, self.summary())
    }
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::LineItem;
    use roomservice_dialog::QueryOption;

    fn suggestion(subject: &str, item: Option<&str>, stage: MatchStage) -> Suggestion {
        Suggestion {
            subject: subject.to_string(),
            item: item.map(str::to_string),
            alternatives: vec![QueryOption::new("Add Chicken", 0.78)],
            stage,
            shortfall: None,
        }
    }

    #[test]
    fn test_scalars_replace() {
        let mut store = ContextStore::new(3);
        store.merge(ContextUpdate::new().original_text("first").draft(OrderDraft::new().with_room(101)));
        store.merge(ContextUpdate::new().original_text("second"));
        assert_eq!(store.context().original_text.as_deref(), Some("second"));
        assert_eq!(store.draft().unwrap().room_number, Some(101));
    }

    #[test]
    fn test_histories_append_within_window() {
        let mut store = ContextStore::new(3);
        for n in 0..5 {
            store.merge(ContextUpdate::new().issues([format!("issue {}", n)]));
        }
        let issues: Vec<_> = store.context().issues.iter().cloned().collect();
        assert_eq!(issues, vec!["issue 2", "issue 3", "issue 4"]);
    }

    #[test]
    fn test_query_only_changes_explicitly() {
        let mut store = ContextStore::default();
        let query = PendingQuery::item_removal("pizza", QueryOrigin::Catalog).unwrap();
        store.merge(ContextUpdate::new().set_query(query.clone()));
        store.merge(ContextUpdate::new().draft(OrderDraft::new()).reply("hmm"));
        assert_eq!(store.active_query(), Some(&query));
        store.merge(ContextUpdate::new().clear_query());
        assert!(store.active_query().is_none());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut store = ContextStore::default();
        store.merge(ContextUpdate::new().original_text("latte").mode(ModeHint::Extracting));
        store.clear();
        let once = store.clone();
        store.clear();
        assert_eq!(store, once);
        assert!(store.context().is_empty());
        assert_eq!(store.mode(), ModeHint::Initial);
    }

    #[test]
    fn test_reconstruct_query_uses_latest_matching_suggestion() {
        let mut store = ContextStore::default();
        store.merge(ContextUpdate::new().suggestions([
            suggestion("ceaser salad", None, MatchStage::Fuzzy),
            suggestion("avocado", Some("Caesar Salad"), MatchStage::Semantic),
        ]));

        let subject = ("caesar salad".to_string(), Some("avocado".to_string()));
        let query = store
            .reconstruct_query(DialogState::ModificationSelection, Some(&subject))
            .unwrap();
        assert_eq!(query.item(), "Caesar Salad");
        assert_eq!(query.subject(), "avocado");

        // Fuzzy suggestions never become queries.
        assert!(store.reconstruct_query(DialogState::ItemSelection, None).is_none());
    }

    #[test]
    fn test_reconstruct_query_follows_query_subject() {
        let mut store = ContextStore::default();
        let pizza = PendingQuery::item_replacement(
            "pizza",
            QueryOrigin::Catalog,
            vec![QueryOption::new("Club Sandwich", 0.75)],
        )
        .unwrap();
        store.merge(
            ContextUpdate::new()
                .suggestions([
                    suggestion("pizza", None, MatchStage::Semantic),
                    suggestion("burger", None, MatchStage::Semantic),
                ])
                .set_query(pizza),
        );
        store.merge(ContextUpdate::new().clear_query());
        assert_eq!(store.query_subject(), Some(&("pizza".to_string(), None)));

        let rebuilt = store
            .reconstruct_query(DialogState::ItemSelection, store.query_subject())
            .unwrap();
        assert_eq!(rebuilt.item(), "pizza");

        let latest = store.reconstruct_query(DialogState::ItemSelection, None).unwrap();
        assert_eq!(latest.item(), "burger");
    }

    #[test]
    fn test_reconstruct_quantity_adjustment_from_shortfall() {
        let mut store = ContextStore::default();
        store.merge(ContextUpdate::new().suggestions([Suggestion {
            subject: "Latte".to_string(),
            item: None,
            alternatives: vec![QueryOption::new("2", 1.0)],
            stage: MatchStage::Stock,
            shortfall: Some(crate::validation::Shortfall {
                requested: 5,
                available: 2,
            }),
        }]));

        let query = store
            .reconstruct_query(DialogState::QuantityAdjustment, None)
            .unwrap();
        assert_eq!(query, PendingQuery::quantity_adjustment("Latte", 5, 2).unwrap());
    }

    #[test]
    fn test_summary_mentions_draft_and_query() {
        let mut store = ContextStore::default();
        let draft = OrderDraft::new()
            .with_room(412)
            .with_item(LineItem::new("Caesar Salad", 2).with_modifications(["avocado"]));
        let query = PendingQuery::modification_removal("Caesar Salad", "avocado").unwrap();
        store.merge(ContextUpdate::new().draft(draft).set_query(query));
        let summary = store.summary();
        assert!(summary.contains("2x Caesar Salad (avocado)"));
        assert!(summary.contains("Room: 412"));
        assert!(summary.contains("modification_removal"));
    }
}
