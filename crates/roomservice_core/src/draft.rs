//! The order under construction.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::Category;
use crate::matching::normalize;

pub const MIN_ROOM_NUMBER: u32 = 100;
pub const MAX_ROOM_NUMBER: u32 = 999;
pub const MAX_SPECIAL_INSTRUCTIONS: usize = 500;

/// Problems with the draft itself, independent of the catalog.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DraftError {
    #[error("Room number must be between 100 and 999 (got {0})")]
    RoomOutOfRange(u32),

    #[error("A room number between 100 and 999 is required")]
    MissingRoom,

    #[error("Special instructions are limited to 500 characters (got {0})")]
    InstructionsTooLong(usize),
}

/// Check a room number against the hotel's range.
pub fn validate_room_number(room: u32) -> Result<u32, DraftError> {
    if (MIN_ROOM_NUMBER..=MAX_ROOM_NUMBER).contains(&room) {
        Ok(room)
    } else {
        Err(DraftError::RoomOutOfRange(room))
    }
}

/// One requested item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub quantity: u32,
    #[serde(default)]
    pub modifications: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
}

impl LineItem {
    pub fn new(name: impl Into<String>, quantity: u32) -> Self {
        Self {
            name: name.into(),
            quantity,
            modifications: Vec::new(),
            category: None,
        }
    }

    pub fn with_modifications<I, S>(mut self, modifications: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modifications = modifications.into_iter().map(Into::into).collect();
        self
    }

    /// Compare names the way the catalog does.
    pub fn is_named(&self, name: &str) -> bool {
        normalize(&self.name) == normalize(name)
    }
}

/// Draft order for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDraft {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room_number: Option<u32>,
    #[serde(default)]
    pub items: Vec<LineItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_instructions: Option<String>,
}

impl OrderDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_room(mut self, room: u32) -> Self {
        self.room_number = Some(room);
        self
    }

    pub fn with_item(mut self, item: LineItem) -> Self {
        self.items.push(item);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Trim names and modifications, drop blanks and zero quantities.
    pub fn tidy(mut self) -> Self {
        self.items.retain_mut(|item| {
            item.name = item.name.split_whitespace().collect::<Vec<_>>().join(" ");
            item.modifications = item
                .modifications
                .iter()
                .map(|m| m.split_whitespace().collect::<Vec<_>>().join(" "))
                .filter(|m| !m.is_empty())
                .collect();
            if item.name.is_empty() || item.quantity == 0 {
                tracing::warn!(item = %item.name, quantity = item.quantity, "dropping unusable line item");
                return false;
            }
            true
        });
        self.special_instructions = self
            .special_instructions
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self
    }

    /// Requested quantity per item, duplicates combined, in first-seen order.
    pub fn requested_by_item(&self) -> Vec<(String, u32)> {
        let mut totals: Vec<(String, u32)> = Vec::new();
        for item in &self.items {
            match totals.iter_mut().find(|(name, _)| normalize(name) == normalize(&item.name)) {
                Some((_, qty)) => *qty = qty.saturating_add(item.quantity),
                None => totals.push((item.name.clone(), item.quantity)),
            }
        }
        totals
    }

    /// Checks that need nothing but the draft.
    pub fn check(&self) -> Vec<DraftError> {
        let mut problems = Vec::new();
        match self.room_number {
            Some(room) => {
                if let Err(e) = validate_room_number(room) {
                    problems.push(e);
                }
            }
            None => problems.push(DraftError::MissingRoom),
        }
        if let Some(text) = &self.special_instructions {
            let len = text.chars().count();
            if len > MAX_SPECIAL_INSTRUCTIONS {
                problems.push(DraftError::InstructionsTooLong(len));
            }
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_number_bounds() {
        assert!(validate_room_number(100).is_ok());
        assert!(validate_room_number(999).is_ok());
        assert_eq!(validate_room_number(99), Err(DraftError::RoomOutOfRange(99)));
        assert_eq!(validate_room_number(1000), Err(DraftError::RoomOutOfRange(1000)));
    }

    #[test]
    fn test_tidy_drops_blank_and_zero_lines() {
        let draft = OrderDraft::new()
            .with_item(LineItem::new("  Club   Sandwich ", 1).with_modifications(["", " extra  bacon "]))
            .with_item(LineItem::new("Latte", 0))
            .with_item(LineItem::new("   ", 2))
            .tidy();
        assert_eq!(draft.items.len(), 1);
        assert_eq!(draft.items[0].name, "Club Sandwich");
        assert_eq!(draft.items[0].modifications, vec!["extra bacon"]);
    }

    #[test]
    fn test_requested_by_item_combines_duplicates() {
        let draft = OrderDraft::new()
            .with_item(LineItem::new("Latte", 2))
            .with_item(LineItem::new("Club Sandwich", 1))
            .with_item(LineItem::new("latte", 3));
        assert_eq!(
            draft.requested_by_item(),
            vec![("Latte".to_string(), 5), ("Club Sandwich".to_string(), 1)]
        );
    }

    #[test]
    fn test_check_reports_room_and_instructions() {
        let draft = OrderDraft {
            room_number: Some(42),
            items: vec![LineItem::new("Latte", 1)],
            special_instructions: Some("x".repeat(501)),
        };
        let problems = draft.check();
        assert!(problems.contains(&DraftError::RoomOutOfRange(42)));
        assert!(problems.contains(&DraftError::InstructionsTooLong(501)));

        let missing = OrderDraft::new().with_item(LineItem::new("Latte", 1));
        assert_eq!(missing.check(), vec![DraftError::MissingRoom]);
    }
}
