//! Committing a fully resolved draft.

use chrono::{DateTime, Utc};
use roomservice_ids::OrderId;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::catalog::Catalog;
use crate::draft::OrderDraft;
use crate::ledger::{Ledger, StockConflict};

pub const DEFAULT_PREP_BUFFER_MINUTES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Confirmed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Confirmed => "confirmed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmedLine {
    pub name: String,
    pub quantity: u32,
    pub modifications: Vec<String>,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderConfirmation {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub room_number: u32,
    pub items: Vec<ConfirmedLine>,
    pub total_price: Decimal,
    pub estimated_time_minutes: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special_instructions: Option<String>,
    pub confirmed_at: DateTime<Utc>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FinalizeError {
    #[error("Order has no items")]
    EmptyDraft,

    #[error("Room number is required")]
    MissingRoom,

    #[error("Item '{0}' is not on the menu")]
    UnknownItem(String),

    #[error("Stock changed since validation: {0}")]
    StockChanged(#[from] StockConflict),
}

impl FinalizeError {
    /// A stock race is recovered by validating again; anything else means
    /// the draft should never have reached confirmation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FinalizeError::StockChanged(_))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Finalizer {
    buffer_minutes: u32,
}

impl Finalizer {
    pub fn new(buffer_minutes: u32) -> Self {
        Self { buffer_minutes }
    }

    /// Price the draft and decrement the ledger in one step. Nothing is
    /// decremented unless every line fits.
    pub fn finalize(
        &self,
        catalog: &Catalog,
        ledger: &Ledger,
        draft: &OrderDraft,
    ) -> Result<OrderConfirmation, FinalizeError> {
        if draft.is_empty() {
            return Err(FinalizeError::EmptyDraft);
        }
        let room_number = draft.room_number.ok_or(FinalizeError::MissingRoom)?;

        let mut items = Vec::with_capacity(draft.items.len());
        let mut total_price = Decimal::ZERO;
        let mut longest_prep = 0;
        for line in &draft.items {
            let entry = catalog
                .get(&line.name)
                .ok_or_else(|| FinalizeError::UnknownItem(line.name.clone()))?;
            let line_total = entry.price * Decimal::from(line.quantity);
            total_price += line_total;
            longest_prep = longest_prep.max(entry.preparation_time_minutes);
            items.push(ConfirmedLine {
                name: entry.name.clone(),
                quantity: line.quantity,
                modifications: line.modifications.clone(),
                unit_price: entry.price,
                line_total,
            });
        }

        let lines: Vec<(String, u32)> = items.iter().map(|l| (l.name.clone(), l.quantity)).collect();
        ledger.commit(&lines)?;

        let confirmation = OrderConfirmation {
            order_id: OrderId::new(),
            status: OrderStatus::Confirmed,
            room_number,
            items,
            total_price,
            estimated_time_minutes: longest_prep + self.buffer_minutes,
            special_instructions: draft.special_instructions.clone(),
            confirmed_at: Utc::now(),
        };
        tracing::info!(
            order_id = %confirmation.order_id,
            room = room_number,
            total = %confirmation.total_price,
            eta_minutes = confirmation.estimated_time_minutes,
            "order committed"
        );
        Ok(confirmation)
    }
}

impl Default for Finalizer {
    fn default() -> Self {
        Self::new(DEFAULT_PREP_BUFFER_MINUTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sample_catalog;
    use crate::draft::LineItem;
    use std::str::FromStr;

    #[test]
    fn test_totals_and_estimate() {
        let catalog = sample_catalog();
        let ledger = Ledger::from_levels([("Latte", 10)]);
        let draft = OrderDraft::new()
            .with_room(412)
            .with_item(LineItem::new("Club Sandwich", 1))
            .with_item(LineItem::new("Latte", 2).with_modifications(["Oat Milk"]));

        let order = Finalizer::default().finalize(&catalog, &ledger, &draft).unwrap();
        assert_eq!(order.total_price, Decimal::from_str("29.50").unwrap());
        assert_eq!(order.estimated_time_minutes, 20);
        assert_eq!(order.items[1].line_total, Decimal::from_str("11.00").unwrap());
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(ledger.remaining("Latte"), Some(8));
    }

    #[test]
    fn test_stock_race_commits_nothing() {
        let catalog = sample_catalog();
        let ledger = Ledger::from_levels([("Latte", 10), ("Club Sandwich", 1)]);
        let draft = OrderDraft::new()
            .with_room(412)
            .with_item(LineItem::new("Latte", 2))
            .with_item(LineItem::new("Club Sandwich", 2));

        let err = Finalizer::default().finalize(&catalog, &ledger, &draft).unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(ledger.remaining("Latte"), Some(10));
        assert_eq!(ledger.remaining("Club Sandwich"), Some(1));
    }

    #[test]
    fn test_rejects_unresolved_drafts() {
        let catalog = sample_catalog();
        let ledger = Ledger::default();
        let finalizer = Finalizer::default();

        assert_eq!(
            finalizer.finalize(&catalog, &ledger, &OrderDraft::new().with_room(101)),
            Err(FinalizeError::EmptyDraft)
        );
        let no_room = OrderDraft::new().with_item(LineItem::new("Latte", 1));
        assert_eq!(
            finalizer.finalize(&catalog, &ledger, &no_room),
            Err(FinalizeError::MissingRoom)
        );
        let unknown = no_room.clone().with_room(101).with_item(LineItem::new("pizza", 1));
        assert!(!finalizer.finalize(&catalog, &ledger, &unknown).unwrap_err().is_retryable());
    }
}
