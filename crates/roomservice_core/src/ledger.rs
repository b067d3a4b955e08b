//! Shared stock ledger.
//!
//! One mutex guards every level. A commit checks and decrements the whole
//! order under that lock, so concurrent sessions can never oversell and a
//! failed commit leaves every level untouched.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;

use crate::catalog::Catalog;
use crate::matching::normalize;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Failed to read inventory file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Inventory is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Inventory for '{item}' is negative ({level})")]
    Negative { item: String, level: i64 },

    #[error("Inventory for '{item}' is not a whole number")]
    NotANumber { item: String },
}

/// A commit lost the race for stock.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Stock for '{item}' changed: {requested} requested, {available} available")]
pub struct StockConflict {
    pub item: String,
    pub requested: u32,
    pub available: u32,
}

/// Stock for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "remaining", rename_all = "snake_case")]
pub enum Availability {
    Tracked(u32),
    /// No ledger entry; treated as unlimited and never decremented.
    Untracked,
}

impl Availability {
    pub fn covers(&self, requested: u32) -> bool {
        match self {
            Availability::Tracked(n) => *n >= requested,
            Availability::Untracked => true,
        }
    }

    pub fn in_stock(&self) -> bool {
        self.covers(1)
    }
}

#[derive(Debug, Default)]
pub struct Ledger {
    levels: Mutex<HashMap<String, (String, u32)>>,
    /// Orders from other sessions that land just ahead of the next commit
    #[cfg(test)]
    competing: Mutex<Vec<(String, u32)>>,
}

impl Ledger {
    pub fn from_levels<I, S>(levels: I) -> Self
    where
        I: IntoIterator<Item = (S, u32)>,
        S: Into<String>,
    {
        let levels = levels
            .into_iter()
            .map(|(name, level)| {
                let name = name.into();
                (normalize(&name), (name, level))
            })
            .collect();
        Self {
            levels: Mutex::new(levels),
            #[cfg(test)]
            competing: Mutex::default(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        let text = std::fs::read_to_string(path).map_err(|source| LedgerError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let ledger = Self::from_json_str(&text)?;
        tracing::info!(path = %path.display(), items = ledger.snapshot().len(), "inventory loaded");
        Ok(ledger)
    }

    /// Accepts `{"Category": {"Item": n}}` or a flat `{"Item": n}`.
    pub fn from_json_str(text: &str) -> Result<Self, LedgerError> {
        let raw: BTreeMap<String, serde_json::Value> = serde_json::from_str(text)?;
        let mut levels = Vec::new();
        for (key, value) in raw {
            match value {
                serde_json::Value::Object(items) => {
                    for (item, level) in items {
                        levels.push((item.clone(), parse_level(&item, &level)?));
                    }
                }
                other => levels.push((key.clone(), parse_level(&key, &other)?)),
            }
        }
        Ok(Self::from_levels(levels))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, (String, u32)>> {
        // Levels are only mutated after every check passes, so a poisoned
        // map is still consistent.
        self.levels.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn available(&self, item: &str) -> Availability {
        match self.lock().get(&normalize(item)) {
            Some((_, level)) => Availability::Tracked(*level),
            None => Availability::Untracked,
        }
    }

    /// Remaining count for tracked items.
    pub fn remaining(&self, item: &str) -> Option<u32> {
        match self.available(item) {
            Availability::Tracked(n) => Some(n),
            Availability::Untracked => None,
        }
    }

    /// Check and decrement every line at once.
    ///
    /// Duplicate names are combined before checking. On conflict nothing is
    /// decremented.
    pub fn commit(&self, lines: &[(String, u32)]) -> Result<(), StockConflict> {
        let mut wanted: Vec<(String, String, u32)> = Vec::new();
        for (name, qty) in lines {
            let key = normalize(name);
            match wanted.iter_mut().find(|(k, _, _)| *k == key) {
                Some((_, _, total)) => *total = total.saturating_add(*qty),
                None => wanted.push((key, name.clone(), *qty)),
            }
        }

        let mut levels = self.lock();
        #[cfg(test)]
        self.land_competing(&mut levels);
        for (key, name, qty) in &wanted {
            if let Some((_, level)) = levels.get(key) {
                if *level < *qty {
                    tracing::warn!(item = %name, requested = qty, available = level, "stock conflict on commit");
                    return Err(StockConflict {
                        item: name.clone(),
                        requested: *qty,
                        available: *level,
                    });
                }
            }
        }
        for (key, name, qty) in &wanted {
            if let Some((_, level)) = levels.get_mut(key) {
                *level -= *qty;
                tracing::debug!(item = %name, decremented = qty, remaining = *level, "stock decremented");
            }
        }
        Ok(())
    }

    /// Queue an order that another session commits right before the next
    /// call to `commit`.
    #[cfg(test)]
    pub(crate) fn queue_competing(&self, item: &str, quantity: u32) {
        self.competing
            .lock()
            .unwrap()
            .push((normalize(item), quantity));
    }

    #[cfg(test)]
    fn land_competing(&self, levels: &mut HashMap<String, (String, u32)>) {
        for (key, quantity) in self.competing.lock().unwrap().drain(..) {
            if let Some((_, level)) = levels.get_mut(&key) {
                *level = level.saturating_sub(quantity);
            }
        }
    }

    /// Current levels by display name.
    pub fn snapshot(&self) -> BTreeMap<String, u32> {
        self.lock()
            .values()
            .map(|(name, level)| (name.clone(), *level))
            .collect()
    }

    /// Ledger entries that name nothing on the menu.
    pub fn unknown_items(&self, catalog: &Catalog) -> Vec<String> {
        let mut unknown: Vec<String> = self
            .lock()
            .values()
            .filter(|(name, _)| catalog.get(name).is_none())
            .map(|(name, _)| name.clone())
            .collect();
        unknown.sort();
        unknown
    }
}

fn parse_level(item: &str, value: &serde_json::Value) -> Result<u32, LedgerError> {
    let level = value.as_i64().ok_or_else(|| LedgerError::NotANumber {
        item: item.to_string(),
    })?;
    u32::try_from(level).map_err(|_| LedgerError::Negative {
        item: item.to_string(),
        level,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::sample_catalog;
    use std::sync::Arc;

    #[test]
    fn test_nested_and_flat_formats() {
        let nested = Ledger::from_json_str(r#"{"Main": {"Club Sandwich": 4}, "Beverage": {"Latte": 2}}"#).unwrap();
        assert_eq!(nested.remaining("club sandwich"), Some(4));
        assert_eq!(nested.remaining("Latte"), Some(2));

        let flat = Ledger::from_json_str(r#"{"Latte": 7}"#).unwrap();
        assert_eq!(flat.available("LATTE"), Availability::Tracked(7));
        assert_eq!(flat.available("Espresso"), Availability::Untracked);
    }

    #[test]
    fn test_negative_level_rejected() {
        let err = Ledger::from_json_str(r#"{"Main": {"Club Sandwich": -1}}"#).unwrap_err();
        assert!(matches!(err, LedgerError::Negative { level: -1, .. }));
        let err = Ledger::from_json_str(r#"{"Latte": "lots"}"#).unwrap_err();
        assert!(matches!(err, LedgerError::NotANumber { .. }));
    }

    #[test]
    fn test_commit_is_all_or_nothing() {
        let ledger = Ledger::from_levels([("Latte", 2), ("Club Sandwich", 5)]);
        let err = ledger
            .commit(&[("Club Sandwich".into(), 1), ("Latte".into(), 3)])
            .unwrap_err();
        assert_eq!(err.item, "Latte");
        assert_eq!(err.available, 2);
        assert_eq!(ledger.remaining("Club Sandwich"), Some(5));

        ledger
            .commit(&[("Club Sandwich".into(), 1), ("Latte".into(), 2)])
            .unwrap();
        assert_eq!(ledger.remaining("Club Sandwich"), Some(4));
        assert_eq!(ledger.remaining("Latte"), Some(0));
    }

    #[test]
    fn test_commit_combines_duplicates() {
        let ledger = Ledger::from_levels([("Latte", 3)]);
        assert!(ledger.commit(&[("Latte".into(), 2), ("latte".into(), 2)]).is_err());
        ledger.commit(&[("Latte".into(), 2), ("latte".into(), 1)]).unwrap();
        assert_eq!(ledger.remaining("Latte"), Some(0));
    }

    #[test]
    fn test_untracked_items_never_decrement() {
        let ledger = Ledger::from_levels([("Latte", 1)]);
        ledger.commit(&[("Still Water".into(), 50)]).unwrap();
        assert_eq!(ledger.available("Still Water"), Availability::Untracked);
        assert!(ledger.snapshot().get("Still Water").is_none());
    }

    #[test]
    fn test_concurrent_commits_never_oversell() {
        let ledger = Arc::new(Ledger::from_levels([("Latte", 10)]));
        let handles: Vec<_> = (0..25)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                std::thread::spawn(move || ledger.commit(&[("Latte".into(), 1)]).is_ok())
            })
            .collect();
        let committed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(committed, 10);
        assert_eq!(ledger.remaining("Latte"), Some(0));
    }

    #[test]
    fn test_unknown_items() {
        let ledger = Ledger::from_levels([("Latte", 1), ("Pizza", 3)]);
        assert_eq!(ledger.unknown_items(&sample_catalog()), vec!["Pizza".to_string()]);
    }
}
