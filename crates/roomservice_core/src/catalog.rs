//! Menu catalog.
//!
//! Loaded once at startup and shared read-only across sessions. Every record
//! is range-checked on load; a single bad record aborts the load.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::matching::normalize;
use crate::nlu::SemanticCandidate;

pub const MIN_PREP_MINUTES: u32 = 1;
pub const MAX_PREP_MINUTES: u32 = 180;

/// Upper price bound, 999.99.
pub fn max_price() -> Decimal {
    Decimal::new(99_999, 2)
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Failed to read catalog file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Catalog is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown category '{0}' (expected Main, Beverage, Dessert or Side)")]
    UnknownCategory(String),

    #[error("Price for '{item}' must be greater than 0 and at most 999.99 (got {price})")]
    PriceOutOfRange { item: String, price: Decimal },

    #[error("Price for '{item}' has more than 2 decimal places ({price})")]
    PriceScale { item: String, price: Decimal },

    #[error("Preparation time for '{item}' must be between 1 and 180 minutes (got {minutes})")]
    PrepTimeOutOfRange { item: String, minutes: i64 },

    #[error("Item '{0}' is listed more than once")]
    DuplicateItem(String),

    #[error("Catalog contains an item with an empty name")]
    EmptyName,

    #[error("Catalog has no items")]
    Empty,
}

/// Menu section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Main,
    Beverage,
    Dessert,
    Side,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Main,
        Category::Beverage,
        Category::Dessert,
        Category::Side,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Main => "Main",
            Category::Beverage => "Beverage",
            Category::Dessert => "Dessert",
            Category::Side => "Side",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Category {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| CatalogError::UnknownCategory(s.to_string()))
    }
}

/// One menu item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub name: String,
    pub category: Category,
    pub price: Decimal,
    pub description: String,
    pub modifications_allowed: bool,
    pub available_modifications: Vec<String>,
    pub allergens: Vec<String>,
    pub preparation_time_minutes: u32,
}

impl CatalogEntry {
    /// Text handed to the semantic search for this item.
    pub fn semantic_context(&self) -> String {
        format!(
            "Item: {}\nCategory: {}\nDescription: {}",
            self.name, self.category, self.description
        )
    }

    /// Modifications the resolver may bind to. Empty when none are allowed.
    pub fn allowed_modifications(&self) -> &[String] {
        if self.modifications_allowed {
            &self.available_modifications
        } else {
            &[]
        }
    }

    /// Allowed modification matching `name` after normalization.
    pub fn find_modification(&self, name: &str) -> Option<&str> {
        let key = normalize(name);
        self.allowed_modifications()
            .iter()
            .find(|m| normalize(m) == key)
            .map(String::as_str)
    }

    fn validate(&self) -> Result<(), CatalogError> {
        if self.name.trim().is_empty() {
            return Err(CatalogError::EmptyName);
        }
        if self.price <= Decimal::ZERO || self.price > max_price() {
            return Err(CatalogError::PriceOutOfRange {
                item: self.name.clone(),
                price: self.price,
            });
        }
        if self.price.normalize().scale() > 2 {
            return Err(CatalogError::PriceScale {
                item: self.name.clone(),
                price: self.price,
            });
        }
        if !(MIN_PREP_MINUTES..=MAX_PREP_MINUTES).contains(&self.preparation_time_minutes) {
            return Err(CatalogError::PrepTimeOutOfRange {
                item: self.name.clone(),
                minutes: i64::from(self.preparation_time_minutes),
            });
        }
        Ok(())
    }
}

// On-disk shape: {"categories": {"Main": {"Club Sandwich": {...}}}}
#[derive(Debug, Deserialize)]
struct RawMenu {
    categories: BTreeMap<String, BTreeMap<String, RawItem>>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    price: Decimal,
    #[serde(default)]
    description: String,
    #[serde(default)]
    modifications_allowed: bool,
    #[serde(default)]
    available_modifications: Vec<String>,
    #[serde(default)]
    allergens: Vec<String>,
    preparation_time: i64,
}

/// The immutable menu.
#[derive(Debug, Clone)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    index: HashMap<String, usize>,
    item_candidates: Vec<SemanticCandidate>,
}

impl Catalog {
    /// Load and validate a menu file.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_json_str(&text)?;
        tracing::info!(path = %path.display(), items = catalog.len(), "catalog loaded");
        Ok(catalog)
    }

    pub fn from_json_str(text: &str) -> Result<Self, CatalogError> {
        let raw: RawMenu = serde_json::from_str(text)?;
        let mut entries = Vec::new();
        for (category_name, items) in raw.categories {
            let category: Category = category_name.parse()?;
            for (name, item) in items {
                let minutes = u32::try_from(item.preparation_time).map_err(|_| {
                    CatalogError::PrepTimeOutOfRange {
                        item: name.clone(),
                        minutes: item.preparation_time,
                    }
                })?;
                entries.push(CatalogEntry {
                    name: name.trim().to_string(),
                    category,
                    price: item.price,
                    description: item.description,
                    modifications_allowed: item.modifications_allowed,
                    available_modifications: item.available_modifications,
                    allergens: item.allergens,
                    preparation_time_minutes: minutes,
                });
            }
        }
        Self::from_entries(entries)
    }

    pub fn from_entries(entries: Vec<CatalogEntry>) -> Result<Self, CatalogError> {
        if entries.is_empty() {
            return Err(CatalogError::Empty);
        }
        let mut index = HashMap::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            entry.validate()?;
            if index.insert(normalize(&entry.name), position).is_some() {
                return Err(CatalogError::DuplicateItem(entry.name.clone()));
            }
        }
        let item_candidates = entries
            .iter()
            .map(|e| SemanticCandidate::new(e.name.clone(), e.semantic_context()))
            .collect();
        Ok(Self {
            entries,
            index,
            item_candidates,
        })
    }

    /// Exact lookup on normalized name.
    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.index.get(&normalize(name)).map(|&i| &self.entries[i])
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn in_category(&self, category: Category) -> impl Iterator<Item = &CatalogEntry> {
        self.entries.iter().filter(move |e| e.category == category)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Descriptive context for every item, built once.
    pub fn item_candidates(&self) -> &[SemanticCandidate] {
        &self.item_candidates
    }

    /// Menu listing handed to order extraction.
    pub fn menu_context(&self) -> String {
        let mut out = String::from("Available Menu Items:\n");
        for category in Category::ALL {
            let mut items = self.in_category(category).peekable();
            if items.peek().is_none() {
                continue;
            }
            out.push_str(&format!("\n{}:\n", category));
            for entry in items {
                if entry.modifications_allowed && !entry.available_modifications.is_empty() {
                    out.push_str(&format!(
                        "- {} (Modifications: {})\n",
                        entry.name,
                        entry.available_modifications.join(", ")
                    ));
                } else {
                    out.push_str(&format!("- {}\n", entry.name));
                }
            }
        }
        out
    }
}
