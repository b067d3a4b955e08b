//! Item and modification matching cascade.
//!
//! Items: exact, then fuzzy, then semantic. The first stage that succeeds
//! wins. A fuzzy hit binds silently (recorded as a suggestion); a semantic
//! hit never binds, it becomes a replacement query with a removal escape
//! hatch. Modifications run the same cascade scoped to the owning item.
//!
//! After a pass every item and modification is either bound to a catalog
//! name or the subject of a pending query.

use roomservice_dialog::{PendingQuery, QueryKind, QueryOption, QueryOrigin};

use crate::catalog::{Catalog, CatalogEntry};
use crate::draft::LineItem;
use crate::matching::{best_fuzzy, round_score, MatchPolicy};
use crate::nlu::{NluError, NluHandle, Relatedness, SemanticCandidate};
use crate::validation::{MatchStage, StepOutcome, Suggestion, ValidationResult};

pub struct Resolver<'a> {
    catalog: &'a Catalog,
    policy: MatchPolicy,
}

impl<'a> Resolver<'a> {
    pub fn new(catalog: &'a Catalog, policy: MatchPolicy) -> Self {
        Self { catalog, policy }
    }

    /// Resolve every line of `result.draft` in place.
    pub async fn resolve(
        &self,
        result: &mut ValidationResult,
        nlu: NluHandle<'_>,
    ) -> Result<(), NluError> {
        let mut items = std::mem::take(&mut result.draft.items);
        for line in items.iter_mut() {
            if let Some(entry) = self.resolve_item(line, result, nlu).await? {
                self.resolve_modifications(line, entry, result, nlu).await?;
            }
        }
        result.draft.items = items;
        Ok(())
    }

    async fn resolve_item(
        &self,
        line: &mut LineItem,
        result: &mut ValidationResult,
        nlu: NluHandle<'_>,
    ) -> Result<Option<&'a CatalogEntry>, NluError> {
        let requested = line.name.clone();

        if let Some(entry) = self.catalog.get(&requested) {
            result.step(&requested, None, MatchStage::Exact, bound(&entry.name, 1.0));
            bind(line, entry);
            return Ok(Some(entry));
        }
        result.step(&requested, None, MatchStage::Exact, rejected(None));

        if let Some((name, score)) = best_fuzzy(&requested, self.catalog.names()) {
            if self.policy.accepts_fuzzy(score) {
                if let Some(entry) = self.catalog.get(name) {
                    tracing::info!(subject = %requested, matched = %entry.name, score, "fuzzy item match");
                    result.step(&requested, None, MatchStage::Fuzzy, bound(&entry.name, score));
                    result.suggest(Suggestion {
                        subject: requested.clone(),
                        item: None,
                        alternatives: vec![QueryOption::new(entry.name.clone(), score)],
                        stage: MatchStage::Fuzzy,
                        shortfall: None,
                    });
                    bind(line, entry);
                    return Ok(Some(entry));
                }
            }
            result.step(&requested, None, MatchStage::Fuzzy, rejected(Some(score)));
        }

        let ranked = nlu
            .semantic_search(&requested, self.catalog.item_candidates())
            .await?;
        let options = self.accept_semantic(ranked, self.catalog.item_candidates());

        if options.is_empty() {
            tracing::info!(subject = %requested, "item not found");
            result.step(&requested, None, MatchStage::Semantic, rejected(None));
            result.issue(format!("Item '{}' not found in menu", requested));
            attach(result, PendingQuery::item_removal(&requested, QueryOrigin::Catalog));
            return Ok(None);
        }

        tracing::info!(subject = %requested, alternatives = options.len(), "item needs disambiguation");
        result.step(
            &requested,
            None,
            MatchStage::Semantic,
            StepOutcome::Queried {
                kind: QueryKind::ItemReplacement,
            },
        );
        result.issue(format!("Item '{}' is not on the menu", requested));
        result.suggest(Suggestion {
            subject: requested.clone(),
            item: None,
            alternatives: options.clone(),
            stage: MatchStage::Semantic,
            shortfall: None,
        });
        attach(
            result,
            PendingQuery::item_replacement(&requested, QueryOrigin::Catalog, options),
        );
        attach(result, PendingQuery::item_removal(&requested, QueryOrigin::Catalog));
        Ok(None)
    }

    async fn resolve_modifications(
        &self,
        line: &mut LineItem,
        entry: &CatalogEntry,
        result: &mut ValidationResult,
        nlu: NluHandle<'_>,
    ) -> Result<(), NluError> {
        if line.modifications.is_empty() {
            return Ok(());
        }

        if !entry.modifications_allowed {
            tracing::info!(item = %entry.name, count = line.modifications.len(), "modifications not allowed");
            for modification in &line.modifications {
                result.step(
                    modification,
                    Some(&entry.name),
                    MatchStage::Exact,
                    StepOutcome::Queried {
                        kind: QueryKind::ModificationRemovalAll,
                    },
                );
            }
            result.issue(format!("Modifications are not allowed for {}", entry.name));
            attach(result, PendingQuery::modification_removal_all(&entry.name));
            return Ok(());
        }

        let allowed = entry.allowed_modifications();
        let candidates: Vec<SemanticCandidate> = allowed
            .iter()
            .map(|m| SemanticCandidate::new(m.clone(), format!("{} for {}", m, entry.name)))
            .collect();

        let mut resolved = Vec::with_capacity(line.modifications.len());
        for requested in &line.modifications {
            let item = Some(entry.name.as_str());

            if let Some(label) = entry.find_modification(requested) {
                result.step(requested, item, MatchStage::Exact, bound(label, 1.0));
                resolved.push(label.to_string());
                continue;
            }
            result.step(requested, item, MatchStage::Exact, rejected(None));

            if let Some((label, score)) = best_fuzzy(requested, allowed.iter().map(String::as_str)) {
                if self.policy.accepts_fuzzy(score) {
                    tracing::info!(item = %entry.name, subject = %requested, matched = %label, score, "fuzzy modification match");
                    result.step(requested, item, MatchStage::Fuzzy, bound(label, score));
                    result.suggest(Suggestion {
                        subject: requested.clone(),
                        item: Some(entry.name.clone()),
                        alternatives: vec![QueryOption::new(label, score)],
                        stage: MatchStage::Fuzzy,
                        shortfall: None,
                    });
                    resolved.push(label.to_string());
                    continue;
                }
                result.step(requested, item, MatchStage::Fuzzy, rejected(Some(score)));
            }

            let ranked = nlu.semantic_search(requested, &candidates).await?;
            let options = self.accept_semantic(ranked, &candidates);
            if options.is_empty() {
                result.step(requested, item, MatchStage::Semantic, rejected(None));
                result.issue(format!(
                    "Modification '{}' is not valid for {}",
                    requested, entry.name
                ));
                attach(
                    result,
                    PendingQuery::modification_removal(&entry.name, requested),
                );
            } else {
                result.step(
                    requested,
                    item,
                    MatchStage::Semantic,
                    StepOutcome::Queried {
                        kind: QueryKind::ModificationReplacement,
                    },
                );
                result.issue(format!(
                    "Modification '{}' is not available for {}",
                    requested, entry.name
                ));
                result.suggest(Suggestion {
                    subject: requested.clone(),
                    item: Some(entry.name.clone()),
                    alternatives: options.clone(),
                    stage: MatchStage::Semantic,
                    shortfall: None,
                });
                attach(
                    result,
                    PendingQuery::modification_replacement(&entry.name, requested, options),
                );
            }
            // Unresolved text stays in the draft until the guest answers.
            resolved.push(requested.clone());
        }
        line.modifications = resolved;
        Ok(())
    }

    /// Keep provider matches that name a real candidate and clear the
    /// threshold, best first, capped at `max_alternatives`.
    fn accept_semantic(
        &self,
        ranked: Vec<Relatedness>,
        candidates: &[SemanticCandidate],
    ) -> Vec<QueryOption> {
        let mut accepted: Vec<QueryOption> = Vec::new();
        for hit in ranked {
            let Some(candidate) = candidates
                .iter()
                .find(|c| c.label.eq_ignore_ascii_case(hit.label.trim()))
            else {
                tracing::debug!(label = %hit.label, "semantic match outside candidate set");
                continue;
            };
            let score = round_score(hit.score);
            if !self.policy.accepts_semantic(score) {
                continue;
            }
            if accepted.iter().any(|o| o.label == candidate.label) {
                continue;
            }
            accepted.push(QueryOption::new(candidate.label.clone(), score));
        }
        accepted.sort_by(|a, b| b.score.total_cmp(&a.score));
        accepted.truncate(self.policy.max_alternatives);
        accepted
    }
}

fn bind(line: &mut LineItem, entry: &CatalogEntry) {
    line.name = entry.name.clone();
    line.category = Some(entry.category);
}

fn bound(to: &str, score: f64) -> StepOutcome {
    StepOutcome::Bound {
        to: to.to_string(),
        score,
    }
}

fn rejected(best_score: Option<f64>) -> StepOutcome {
    StepOutcome::Rejected { best_score }
}

fn attach(result: &mut ValidationResult, query: Result<PendingQuery, roomservice_dialog::QueryError>) {
    match query {
        Ok(query) => result.push_query(query),
        Err(e) => {
            // Only reachable with a blank subject, which tidy() already drops.
            tracing::error!(error = %e, "discarding malformed query");
            result.issue(e.to_string());
        }
    }
}
