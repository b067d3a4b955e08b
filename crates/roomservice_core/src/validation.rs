//! One validation pass over a draft.
//!
//! [`OrderValidator`] runs the draft-only checks, the resolver cascade and
//! the inventory check in that order and collects everything into a fresh
//! [`ValidationResult`].

use chrono::{DateTime, Utc};
use roomservice_dialog::{DialogState, PendingQuery, QueryKind, QueryOption};
use serde::Serialize;

use crate::catalog::Catalog;
use crate::draft::OrderDraft;
use crate::inventory::InventoryChecker;
use crate::ledger::Ledger;
use crate::matching::MatchPolicy;
use crate::nlu::{NluError, NluHandle};
use crate::resolver::Resolver;

/// Which cascade stage produced a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStage {
    Exact,
    Fuzzy,
    Semantic,
    Stock,
}

impl MatchStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStage::Exact => "exact",
            MatchStage::Fuzzy => "fuzzy",
            MatchStage::Semantic => "semantic",
            MatchStage::Stock => "stock",
        }
    }
}

/// Ranked alternatives recorded for one subject.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub subject: String,
    /// Owning item, for modification subjects
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
    pub alternatives: Vec<QueryOption>,
    pub stage: MatchStage,
    /// Set when stock covers part of the request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shortfall: Option<Shortfall>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Shortfall {
    pub requested: u32,
    pub available: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Subject bound to a catalog name
    Bound { to: String, score: f64 },
    /// Subject handed to the guest
    Queried { kind: QueryKind },
    /// Stage gave up on the subject
    Rejected {
        #[serde(skip_serializing_if = "Option::is_none")]
        best_score: Option<f64>,
    },
    /// Check passed with nothing to bind
    Passed,
}

/// Audit entry: what one stage decided about one subject.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolutionStep {
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
    pub stage: MatchStage,
    pub outcome: StepOutcome,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationResult {
    /// Draft with every bound name canonicalized
    pub draft: OrderDraft,
    pub issues: Vec<String>,
    pub suggestions: Vec<Suggestion>,
    pub pending_queries: Vec<PendingQuery>,
    pub step_log: Vec<ResolutionStep>,
}

impl ValidationResult {
    pub fn new(draft: OrderDraft) -> Self {
        Self {
            draft,
            ..Default::default()
        }
    }

    pub fn requires_user_input(&self) -> bool {
        !self.pending_queries.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        self.issues.is_empty() && self.pending_queries.is_empty()
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        let text = text.into();
        if !self.issues.contains(&text) {
            self.issues.push(text);
        }
    }

    pub fn push_query(&mut self, query: PendingQuery) {
        if !self.pending_queries.contains(&query) {
            self.pending_queries.push(query);
        }
    }

    pub fn suggest(&mut self, suggestion: Suggestion) {
        self.suggestions.push(suggestion);
    }

    pub fn step(
        &mut self,
        subject: &str,
        item: Option<&str>,
        stage: MatchStage,
        outcome: StepOutcome,
    ) {
        tracing::debug!(
            subject,
            item = item.unwrap_or(""),
            stage = stage.as_str(),
            outcome = ?outcome,
            "resolution step"
        );
        self.step_log.push(ResolutionStep {
            subject: subject.to_string(),
            item: item.map(str::to_string),
            stage,
            outcome,
            at: Utc::now(),
        });
    }

    /// Queries grouped by subject; each group is one unresolved element.
    pub fn query_groups(&self) -> Vec<Vec<&PendingQuery>> {
        let mut groups: Vec<Vec<&PendingQuery>> = Vec::new();
        for query in &self.pending_queries {
            let key = query.subject_key();
            match groups.iter_mut().find(|g| g[0].subject_key() == key) {
                Some(group) => group.push(query),
                None => groups.push(vec![query]),
            }
        }
        groups
    }

    /// The single query to put in front of the guest.
    ///
    /// Item questions come before modification questions, which come before
    /// stock questions. Within a group the query carrying options leads; its
    /// removal sibling is answered by a REMOVE reply.
    pub fn lead_query(&self) -> Option<&PendingQuery> {
        self.query_groups()
            .into_iter()
            .filter_map(|group| {
                group
                    .iter()
                    .find(|q| q.has_options())
                    .or_else(|| group.first())
                    .copied()
            })
            .enumerate()
            .min_by_key(|(index, query)| (state_rank(query.awaiting_state()), *index))
            .map(|(_, query)| query)
    }
}

fn state_rank(state: DialogState) -> u8 {
    match state {
        DialogState::ItemSelection => 0,
        DialogState::ModificationSelection => 1,
        _ => 2,
    }
}

/// Runs a full validation pass.
pub struct OrderValidator<'a> {
    catalog: &'a Catalog,
    ledger: &'a Ledger,
    policy: MatchPolicy,
}

impl<'a> OrderValidator<'a> {
    pub fn new(catalog: &'a Catalog, ledger: &'a Ledger, policy: MatchPolicy) -> Self {
        Self {
            catalog,
            ledger,
            policy,
        }
    }

    /// Validate `draft`. Only provider failures surface as errors; everything
    /// else lands in the result as issues and queries.
    pub async fn validate(
        &self,
        draft: &OrderDraft,
        nlu: NluHandle<'_>,
    ) -> Result<ValidationResult, NluError> {
        let mut result = ValidationResult::new(draft.clone().tidy());

        for problem in result.draft.check() {
            result.issue(problem.to_string());
        }
        if result.draft.is_empty() {
            result.issue("Order has no items");
            return Ok(result);
        }

        Resolver::new(self.catalog, self.policy)
            .resolve(&mut result, nlu)
            .await?;
        InventoryChecker::new(self.catalog, self.ledger, self.policy.max_alternatives)
            .check(&mut result);

        tracing::info!(
            items = result.draft.items.len(),
            issues = result.issues.len(),
            queries = result.pending_queries.len(),
            "validation pass complete"
        );
        Ok(result)
    }
}
