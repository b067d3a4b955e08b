//! Pending disambiguation queries.
//!
//! A query is what the session is waiting on the guest to answer. Each kind
//! carries exactly the payload it needs; constructors reject payloads that
//! could never be answered.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::DialogState;

/// Kind of disambiguation query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// Pick a catalog item in place of an unknown or unavailable one
    ItemReplacement,
    /// Drop an item that cannot be served
    ItemRemoval,
    /// Pick an allowed modification in place of an unknown one
    ModificationReplacement,
    /// Drop a modification that cannot be applied
    ModificationRemoval,
    /// Drop every modification from an item that allows none
    ModificationRemovalAll,
    /// Accept the quantity that is actually in stock
    QuantityAdjustment,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::ItemReplacement => "item_replacement",
            QueryKind::ItemRemoval => "item_removal",
            QueryKind::ModificationReplacement => "modification_replacement",
            QueryKind::ModificationRemoval => "modification_removal",
            QueryKind::ModificationRemovalAll => "modification_removal_all",
            QueryKind::QuantityAdjustment => "quantity_adjustment",
        }
    }

    /// Whether the query is about a whole line item rather than a modification.
    pub fn is_item_level(&self) -> bool {
        matches!(
            self,
            QueryKind::ItemReplacement | QueryKind::ItemRemoval | QueryKind::QuantityAdjustment
        )
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why an item-level query was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryOrigin {
    /// The name did not resolve against the catalog
    Catalog,
    /// The item resolved but is out of stock
    Stock,
}

/// One candidate answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryOption {
    pub label: String,
    pub score: f64,
}

impl QueryOption {
    pub fn new(label: impl Into<String>, score: f64) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// Errors raised when a query payload is malformed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryError {
    #[error("query subject is empty")]
    EmptySubject,

    #[error("{kind} query for '{subject}' has no options")]
    NoOptions { kind: QueryKind, subject: String },

    #[error("option '{label}' has score {score} outside [0, 1]")]
    ScoreOutOfRange { label: String, score: f64 },

    #[error("option label is empty")]
    EmptyLabel,

    #[error("option '{0}' offered twice")]
    DuplicateOption(String),

    #[error("quantity adjustment for '{item}' offers {available} of {requested}")]
    InvalidAdjustment {
        item: String,
        requested: u32,
        available: u32,
    },
}

/// A single outstanding disambiguation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingQuery {
    ItemReplacement {
        item: String,
        origin: QueryOrigin,
        options: Vec<QueryOption>,
    },
    ItemRemoval {
        item: String,
        origin: QueryOrigin,
    },
    ModificationReplacement {
        item: String,
        modification: String,
        options: Vec<QueryOption>,
    },
    ModificationRemoval {
        item: String,
        modification: String,
    },
    ModificationRemovalAll {
        item: String,
    },
    QuantityAdjustment {
        item: String,
        requested: u32,
        available: u32,
    },
}

impl PendingQuery {
    pub fn item_replacement(
        item: impl Into<String>,
        origin: QueryOrigin,
        options: Vec<QueryOption>,
    ) -> Result<Self, QueryError> {
        let query = PendingQuery::ItemReplacement {
            item: item.into(),
            origin,
            options,
        };
        query.validate()?;
        Ok(query)
    }

    pub fn item_removal(item: impl Into<String>, origin: QueryOrigin) -> Result<Self, QueryError> {
        let query = PendingQuery::ItemRemoval {
            item: item.into(),
            origin,
        };
        query.validate()?;
        Ok(query)
    }

    pub fn modification_replacement(
        item: impl Into<String>,
        modification: impl Into<String>,
        options: Vec<QueryOption>,
    ) -> Result<Self, QueryError> {
        let query = PendingQuery::ModificationReplacement {
            item: item.into(),
            modification: modification.into(),
            options,
        };
        query.validate()?;
        Ok(query)
    }

    pub fn modification_removal(
        item: impl Into<String>,
        modification: impl Into<String>,
    ) -> Result<Self, QueryError> {
        let query = PendingQuery::ModificationRemoval {
            item: item.into(),
            modification: modification.into(),
        };
        query.validate()?;
        Ok(query)
    }

    pub fn modification_removal_all(item: impl Into<String>) -> Result<Self, QueryError> {
        let query = PendingQuery::ModificationRemovalAll { item: item.into() };
        query.validate()?;
        Ok(query)
    }

    pub fn quantity_adjustment(
        item: impl Into<String>,
        requested: u32,
        available: u32,
    ) -> Result<Self, QueryError> {
        let query = PendingQuery::QuantityAdjustment {
            item: item.into(),
            requested,
            available,
        };
        query.validate()?;
        Ok(query)
    }

    /// Check the payload invariants for this kind.
    pub fn validate(&self) -> Result<(), QueryError> {
        if self.item().trim().is_empty() || self.subject().trim().is_empty() {
            return Err(QueryError::EmptySubject);
        }

        match self {
            PendingQuery::ItemReplacement { options, .. }
            | PendingQuery::ModificationReplacement { options, .. } => {
                if options.is_empty() {
                    return Err(QueryError::NoOptions {
                        kind: self.kind(),
                        subject: self.subject().to_string(),
                    });
                }
                let mut seen: Vec<String> = Vec::with_capacity(options.len());
                for option in options {
                    if option.label.trim().is_empty() {
                        return Err(QueryError::EmptyLabel);
                    }
                    if !option.score.is_finite() || !(0.0..=1.0).contains(&option.score) {
                        return Err(QueryError::ScoreOutOfRange {
                            label: option.label.clone(),
                            score: option.score,
                        });
                    }
                    let key = option.label.to_lowercase();
                    if seen.contains(&key) {
                        return Err(QueryError::DuplicateOption(option.label.clone()));
                    }
                    seen.push(key);
                }
            }
            PendingQuery::QuantityAdjustment {
                item,
                requested,
                available,
            } => {
                if *available == 0 || available >= requested {
                    return Err(QueryError::InvalidAdjustment {
                        item: item.clone(),
                        requested: *requested,
                        available: *available,
                    });
                }
            }
            _ => {}
        }

        Ok(())
    }

    pub fn kind(&self) -> QueryKind {
        match self {
            PendingQuery::ItemReplacement { .. } => QueryKind::ItemReplacement,
            PendingQuery::ItemRemoval { .. } => QueryKind::ItemRemoval,
            PendingQuery::ModificationReplacement { .. } => QueryKind::ModificationReplacement,
            PendingQuery::ModificationRemoval { .. } => QueryKind::ModificationRemoval,
            PendingQuery::ModificationRemovalAll { .. } => QueryKind::ModificationRemovalAll,
            PendingQuery::QuantityAdjustment { .. } => QueryKind::QuantityAdjustment,
        }
    }

    /// The line item this query is about.
    pub fn item(&self) -> &str {
        match self {
            PendingQuery::ItemReplacement { item, .. }
            | PendingQuery::ItemRemoval { item, .. }
            | PendingQuery::ModificationReplacement { item, .. }
            | PendingQuery::ModificationRemoval { item, .. }
            | PendingQuery::ModificationRemovalAll { item }
            | PendingQuery::QuantityAdjustment { item, .. } => item,
        }
    }

    /// The name being disambiguated: the modification for modification
    /// queries, the item otherwise.
    pub fn subject(&self) -> &str {
        match self {
            PendingQuery::ModificationReplacement { modification, .. }
            | PendingQuery::ModificationRemoval { modification, .. } => modification,
            _ => self.item(),
        }
    }

    /// Queries sharing a key are alternatives for the same unresolved element.
    pub fn subject_key(&self) -> (String, Option<String>) {
        let modification = match self {
            PendingQuery::ModificationReplacement { modification, .. }
            | PendingQuery::ModificationRemoval { modification, .. } => {
                Some(modification.to_lowercase())
            }
            PendingQuery::ModificationRemovalAll { .. } => Some(String::new()),
            _ => None,
        };
        (self.item().to_lowercase(), modification)
    }

    /// Candidate answers, best first. Removal queries offer none.
    pub fn options(&self) -> Vec<QueryOption> {
        match self {
            PendingQuery::ItemReplacement { options, .. }
            | PendingQuery::ModificationReplacement { options, .. } => options.clone(),
            PendingQuery::QuantityAdjustment { available, .. } => {
                vec![QueryOption::new(available.to_string(), 1.0)]
            }
            _ => Vec::new(),
        }
    }

    pub fn has_options(&self) -> bool {
        matches!(
            self,
            PendingQuery::ItemReplacement { .. }
                | PendingQuery::ModificationReplacement { .. }
                | PendingQuery::QuantityAdjustment { .. }
        )
    }

    /// Find an offered option by exact label, then case-insensitively.
    pub fn find_option(&self, label: &str) -> Option<QueryOption> {
        let label = label.trim();
        let options = self.options();
        options
            .iter()
            .find(|o| o.label == label)
            .or_else(|| options.iter().find(|o| o.label.eq_ignore_ascii_case(label)))
            .cloned()
    }

    /// The state a session sits in while this query is active.
    pub fn awaiting_state(&self) -> DialogState {
        match self {
            PendingQuery::ItemReplacement { origin, .. }
            | PendingQuery::ItemRemoval { origin, .. } => match origin {
                QueryOrigin::Catalog => DialogState::ItemSelection,
                QueryOrigin::Stock => DialogState::QuantityAdjustment,
            },
            PendingQuery::ModificationReplacement { .. }
            | PendingQuery::ModificationRemoval { .. }
            | PendingQuery::ModificationRemovalAll { .. } => DialogState::ModificationSelection,
            PendingQuery::QuantityAdjustment { .. } => DialogState::QuantityAdjustment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(labels: &[&str]) -> Vec<QueryOption> {
        labels.iter().map(|l| QueryOption::new(*l, 0.9)).collect()
    }

    #[test]
    fn test_replacement_requires_options() {
        let err = PendingQuery::item_replacement("pizza", QueryOrigin::Catalog, vec![]).unwrap_err();
        assert!(matches!(err, QueryError::NoOptions { .. }));

        let err =
            PendingQuery::modification_replacement("Caesar Salad", "avocado", vec![]).unwrap_err();
        assert!(matches!(err, QueryError::NoOptions { .. }));
    }

    #[test]
    fn test_rejects_bad_scores_and_duplicates() {
        let err = PendingQuery::item_replacement(
            "pizza",
            QueryOrigin::Catalog,
            vec![QueryOption::new("Flatbread", 1.5)],
        )
        .unwrap_err();
        assert!(matches!(err, QueryError::ScoreOutOfRange { .. }));

        let err = PendingQuery::item_replacement(
            "pizza",
            QueryOrigin::Catalog,
            opts(&["Flatbread", "flatbread"]),
        )
        .unwrap_err();
        assert_eq!(err, QueryError::DuplicateOption("flatbread".to_string()));
    }

    #[test]
    fn test_empty_subject_rejected() {
        assert_eq!(
            PendingQuery::item_removal("  ", QueryOrigin::Catalog).unwrap_err(),
            QueryError::EmptySubject
        );
        assert_eq!(
            PendingQuery::modification_removal("Club Sandwich", "").unwrap_err(),
            QueryError::EmptySubject
        );
    }

    #[test]
    fn test_quantity_adjustment_bounds() {
        assert!(PendingQuery::quantity_adjustment("Latte", 5, 2).is_ok());
        assert!(PendingQuery::quantity_adjustment("Latte", 5, 0).is_err());
        assert!(PendingQuery::quantity_adjustment("Latte", 2, 2).is_err());
    }

    #[test]
    fn test_quantity_adjustment_sole_option_is_available_count() {
        let query = PendingQuery::quantity_adjustment("Latte", 5, 2).unwrap();
        let options = query.options();
        assert_eq!(options, vec![QueryOption::new("2", 1.0)]);
        assert_eq!(query.find_option("2").unwrap().label, "2");
        assert!(query.find_option("3").is_none());
    }

    #[test]
    fn test_subject_and_item() {
        let query = PendingQuery::modification_replacement(
            "Caesar Salad",
            "avocado",
            opts(&["Add Chicken"]),
        )
        .unwrap();
        assert_eq!(query.item(), "Caesar Salad");
        assert_eq!(query.subject(), "avocado");
        assert_eq!(query.kind(), QueryKind::ModificationReplacement);
        assert_eq!(query.awaiting_state(), DialogState::ModificationSelection);
    }

    #[test]
    fn test_find_option_is_case_insensitive() {
        let query = PendingQuery::item_replacement(
            "burgr",
            QueryOrigin::Catalog,
            opts(&["Classic Burger", "Veggie Burger"]),
        )
        .unwrap();
        assert_eq!(
            query.find_option("veggie burger").unwrap().label,
            "Veggie Burger"
        );
        assert!(query.find_option("Fish Burger").is_none());
    }

    #[test]
    fn test_subject_keys_group_escape_hatch() {
        let replace = PendingQuery::item_replacement(
            "pizza",
            QueryOrigin::Catalog,
            opts(&["Flatbread"]),
        )
        .unwrap();
        let remove = PendingQuery::item_removal("Pizza", QueryOrigin::Catalog).unwrap();
        assert_eq!(replace.subject_key(), remove.subject_key());

        let mod_remove = PendingQuery::modification_removal("pizza", "olives").unwrap();
        assert_ne!(replace.subject_key(), mod_remove.subject_key());
    }

    #[test]
    fn test_stock_queries_wait_in_quantity_adjustment() {
        let query = PendingQuery::item_removal("Latte", QueryOrigin::Stock).unwrap();
        assert_eq!(query.awaiting_state(), DialogState::QuantityAdjustment);
        let query = PendingQuery::item_removal("Latte", QueryOrigin::Catalog).unwrap();
        assert_eq!(query.awaiting_state(), DialogState::ItemSelection);
    }

    #[test]
    fn test_serializes_with_kind_tag() {
        let query = PendingQuery::quantity_adjustment("Latte", 5, 2).unwrap();
        let value = serde_json::to_value(&query).unwrap();
        assert_eq!(value["kind"], "quantity_adjustment");
        assert_eq!(value["available"], 2);
    }
}
