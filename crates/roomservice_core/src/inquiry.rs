//! Answering menu questions from the catalog.

use serde::Serialize;

use crate::catalog::{Catalog, CatalogEntry, Category};
use crate::format::format_price;
use crate::matching::{round_score, MatchPolicy};
use crate::nlu::{NluError, NluHandle};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InquiryAnswer {
    /// Items the answer is about, best match first. Empty for the overview.
    pub matched: Vec<String>,
    pub text: String,
}

pub struct MenuInquiry<'a> {
    catalog: &'a Catalog,
    policy: MatchPolicy,
}

impl<'a> MenuInquiry<'a> {
    pub fn new(catalog: &'a Catalog, policy: MatchPolicy) -> Self {
        Self { catalog, policy }
    }

    pub async fn answer(&self, question: &str, nlu: NluHandle<'_>) -> Result<InquiryAnswer, NluError> {
        let ranked = nlu
            .semantic_search(question, self.catalog.item_candidates())
            .await?;

        let mut matched: Vec<&CatalogEntry> = Vec::new();
        for hit in ranked {
            if !self.policy.accepts_semantic(round_score(hit.score)) {
                continue;
            }
            let Some(entry) = self.catalog.get(&hit.label) else {
                continue;
            };
            if !matched.iter().any(|m| m.name == entry.name) {
                matched.push(entry);
            }
            if matched.len() == self.policy.max_alternatives {
                break;
            }
        }

        if matched.is_empty() {
            tracing::info!(question, "no specific items matched, answering with overview");
            return Ok(InquiryAnswer {
                matched: Vec::new(),
                text: self.overview(),
            });
        }

        tracing::info!(question, matched = matched.len(), "menu inquiry answered");
        let mut text = String::from("Here is what I found on the menu:");
        for entry in &matched {
            text.push('\n');
            text.push_str(&describe(entry));
        }
        Ok(InquiryAnswer {
            matched: matched.iter().map(|e| e.name.clone()).collect(),
            text,
        })
    }

    /// Every category with its items and prices.
    pub fn overview(&self) -> String {
        let mut text = String::from("I couldn't find anything specific for that, but here is our menu:");
        for category in Category::ALL {
            let items: Vec<String> = self
                .catalog
                .in_category(category)
                .map(|e| format!("{} ({})", e.name, format_price(e.price)))
                .collect();
            if !items.is_empty() {
                text.push_str(&format!("\n{}: {}", category, items.join(", ")));
            }
        }
        text
    }
}

fn describe(entry: &CatalogEntry) -> String {
    let mut line = format!(
        "- {} ({}, {}): {}",
        entry.name,
        format_price(entry.price),
        entry.category,
        entry.description
    );
    if !entry.allergens.is_empty() {
        line.push_str(&format!(" Allergens: {}.", entry.allergens.join(", ")));
    }
    let mods = entry.allowed_modifications();
    if !mods.is_empty() {
        line.push_str(&format!(" Modifications: {}.", mods.join(", ")));
    }
    line.push_str(&format!(
        " Ready in about {} minutes.",
        entry.preparation_time_minutes
    ));
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sample_catalog;
    use crate::nlu::{NluHint, ScriptedNlu};
    use std::time::Duration;

    #[tokio::test]
    async fn test_answer_lists_matching_items() {
        let catalog = sample_catalog();
        let nlu = ScriptedNlu::new().with_semantic(
            "do you have fish",
            &[("Grilled Salmon", 0.88), ("Caesar Salad", 0.5)],
        );
        let hint = NluHint::default();
        let answer = MenuInquiry::new(&catalog, MatchPolicy::default())
            .answer("do you have fish", NluHandle::new(&nlu, Duration::from_secs(1), &hint))
            .await
            .unwrap();
        assert_eq!(answer.matched, vec!["Grilled Salmon"]);
        assert!(answer.text.contains("Grilled Salmon ($32.00, Main)"));
        assert!(answer.text.contains("Ready in about 25 minutes."));
    }

    #[tokio::test]
    async fn test_falls_back_to_overview() {
        let catalog = sample_catalog();
        let nlu = ScriptedNlu::new();
        let hint = NluHint::default();
        let answer = MenuInquiry::new(&catalog, MatchPolicy::default())
            .answer("anything good?", NluHandle::new(&nlu, Duration::from_secs(1), &hint))
            .await
            .unwrap();
        assert!(answer.matched.is_empty());
        assert!(answer.text.contains("Beverage: Latte ($5.50), Still Water ($4.00)"));
        assert!(!answer.text.contains("Dessert"));
    }
}
