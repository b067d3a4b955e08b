//! Stock check over the resolved draft.

use roomservice_dialog::{PendingQuery, QueryKind, QueryOption, QueryOrigin};

use crate::catalog::Catalog;
use crate::ledger::{Availability, Ledger};
use crate::validation::{MatchStage, Shortfall, StepOutcome, Suggestion, ValidationResult};

pub struct InventoryChecker<'a> {
    catalog: &'a Catalog,
    ledger: &'a Ledger,
    max_alternatives: usize,
}

impl<'a> InventoryChecker<'a> {
    pub fn new(catalog: &'a Catalog, ledger: &'a Ledger, max_alternatives: usize) -> Self {
        Self {
            catalog,
            ledger,
            max_alternatives,
        }
    }

    /// Compare combined quantities against the ledger. Only lines already
    /// bound to the catalog are checked; the rest are still being queried.
    pub fn check(&self, result: &mut ValidationResult) {
        for (name, requested) in result.draft.requested_by_item() {
            let Some(entry) = self.catalog.get(&name) else {
                continue;
            };
            let available = match self.ledger.available(&entry.name) {
                Availability::Untracked => {
                    result.step(&entry.name, None, MatchStage::Stock, StepOutcome::Passed);
                    continue;
                }
                Availability::Tracked(n) if n >= requested => {
                    result.step(&entry.name, None, MatchStage::Stock, StepOutcome::Passed);
                    continue;
                }
                Availability::Tracked(n) => n,
            };

            tracing::info!(item = %entry.name, requested, available, "insufficient stock");
            result.issue(format!(
                "Insufficient inventory for {}. Only {} available.",
                entry.name, available
            ));

            if available > 0 {
                result.step(
                    &entry.name,
                    None,
                    MatchStage::Stock,
                    StepOutcome::Queried {
                        kind: QueryKind::QuantityAdjustment,
                    },
                );
                if let Ok(query) =
                    PendingQuery::quantity_adjustment(&entry.name, requested, available)
                {
                    result.suggest(Suggestion {
                        subject: entry.name.clone(),
                        item: None,
                        alternatives: query.options(),
                        stage: MatchStage::Stock,
                        shortfall: Some(Shortfall {
                            requested,
                            available,
                        }),
                    });
                    result.push_query(query);
                }
                continue;
            }

            let alternatives = self.alternatives_for(&entry.name, result);
            if alternatives.is_empty() {
                result.step(
                    &entry.name,
                    None,
                    MatchStage::Stock,
                    StepOutcome::Queried {
                        kind: QueryKind::ItemRemoval,
                    },
                );
            } else {
                result.step(
                    &entry.name,
                    None,
                    MatchStage::Stock,
                    StepOutcome::Queried {
                        kind: QueryKind::ItemReplacement,
                    },
                );
                result.suggest(Suggestion {
                    subject: entry.name.clone(),
                    item: None,
                    alternatives: alternatives.clone(),
                    stage: MatchStage::Stock,
                    shortfall: None,
                });
                if let Ok(query) =
                    PendingQuery::item_replacement(&entry.name, QueryOrigin::Stock, alternatives)
                {
                    result.push_query(query);
                }
            }
            if let Ok(query) = PendingQuery::item_removal(&entry.name, QueryOrigin::Stock) {
                result.push_query(query);
            }
        }
    }

    /// In-stock items from the same category, excluding anything already on
    /// the draft.
    fn alternatives_for(&self, item: &str, result: &ValidationResult) -> Vec<QueryOption> {
        let Some(entry) = self.catalog.get(item) else {
            return Vec::new();
        };
        self.catalog
            .in_category(entry.category)
            .filter(|candidate| candidate.name != entry.name)
            .filter(|candidate| !result.draft.items.iter().any(|l| l.is_named(&candidate.name)))
            .filter(|candidate| self.ledger.available(&candidate.name).in_stock())
            .take(self.max_alternatives)
            .map(|candidate| QueryOption::new(candidate.name.clone(), 1.0))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sample_catalog;
    use crate::draft::{LineItem, OrderDraft};

    fn check(ledger: &Ledger, draft: OrderDraft) -> ValidationResult {
        let catalog = sample_catalog();
        let mut result = ValidationResult::new(draft);
        InventoryChecker::new(&catalog, ledger, 3).check(&mut result);
        result
    }

    #[test]
    fn test_untracked_and_covered_items_pass() {
        let ledger = Ledger::from_levels([("Latte", 5)]);
        let draft = OrderDraft::new()
            .with_room(101)
            .with_item(LineItem::new("Latte", 5))
            .with_item(LineItem::new("Grilled Salmon", 40));
        let result = check(&ledger, draft);
        assert!(result.is_valid());
        assert_eq!(result.step_log.len(), 2);
    }

    #[test]
    fn test_partial_stock_offers_quantity_adjustment() {
        let ledger = Ledger::from_levels([("Latte", 3)]);
        let draft = OrderDraft::new()
            .with_room(101)
            .with_item(LineItem::new("Latte", 2))
            .with_item(LineItem::new("latte", 2).with_modifications(["Oat Milk"]));
        let result = check(&ledger, draft);
        assert_eq!(
            result.pending_queries,
            vec![PendingQuery::quantity_adjustment("Latte", 4, 3).unwrap()]
        );
        assert_eq!(result.issues, vec!["Insufficient inventory for Latte. Only 3 available."]);

        let recorded = &result.suggestions[0];
        assert_eq!(recorded.subject, "Latte");
        assert_eq!(recorded.stage, MatchStage::Stock);
        assert_eq!(
            recorded.shortfall,
            Some(Shortfall {
                requested: 4,
                available: 3
            })
        );
        assert_eq!(recorded.alternatives[0].label, "3");
    }

    #[test]
    fn test_sold_out_offers_same_category_alternatives() {
        let ledger = Ledger::from_levels([("Club Sandwich", 0), ("Grilled Salmon", 0)]);
        let draft = OrderDraft::new()
            .with_room(101)
            .with_item(LineItem::new("Club Sandwich", 1));
        let result = check(&ledger, draft);

        let kinds: Vec<_> = result.pending_queries.iter().map(|q| q.kind()).collect();
        assert_eq!(kinds, vec![QueryKind::ItemReplacement, QueryKind::ItemRemoval]);
        let labels: Vec<_> = result.pending_queries[0]
            .options()
            .into_iter()
            .map(|o| o.label)
            .collect();
        assert_eq!(labels, vec!["Caesar Salad"]);
        assert_eq!(result.suggestions[0].stage, MatchStage::Stock);
        assert_eq!(
            result.lead_query().unwrap().awaiting_state(),
            roomservice_dialog::DialogState::QuantityAdjustment
        );
    }

    #[test]
    fn test_sold_out_without_alternatives_offers_removal() {
        let ledger = Ledger::from_levels([("French Fries", 0)]);
        let draft = OrderDraft::new()
            .with_room(101)
            .with_item(LineItem::new("French Fries", 2));
        let result = check(&ledger, draft);
        assert_eq!(result.pending_queries.len(), 1);
        assert_eq!(result.pending_queries[0].kind(), QueryKind::ItemRemoval);
    }

    #[test]
    fn test_unbound_lines_are_skipped() {
        let ledger = Ledger::from_levels([("Latte", 0)]);
        let draft = OrderDraft::new()
            .with_room(101)
            .with_item(LineItem::new("fish dinner", 1));
        let result = check(&ledger, draft);
        assert!(result.is_valid());
        assert!(result.step_log.is_empty());
    }
}
