//! CLI module for the room service assistant
//!
//! Commands load the engine configuration, apply their flag overrides and
//! then build only as much of the engine as they need.

pub mod chat;
pub mod check;
pub mod config;
pub mod error;
pub mod output;

use roomservice_core::engine::{build_provider, load_ledger};
use roomservice_core::{load_config, Catalog, EngineConfig, Ledger, OrderEngine};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use error::HelpfulError;

/// Menu and inventory overrides shared by commands that load the catalog.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct CatalogArgs {
    /// Menu JSON file (overrides catalog.menu_path)
    #[arg(long)]
    pub menu: Option<PathBuf>,

    /// Inventory JSON file (overrides catalog.inventory_path)
    #[arg(long)]
    pub inventory: Option<PathBuf>,
}

impl CatalogArgs {
    pub fn apply(&self, config: &mut EngineConfig) {
        if let Some(menu) = &self.menu {
            config.catalog.menu_path = menu.clone();
        }
        if let Some(inventory) = &self.inventory {
            config.catalog.inventory_path = inventory.clone();
        }
    }
}

pub fn load_engine_config(path: &Path) -> anyhow::Result<EngineConfig> {
    load_config(path).map_err(|e| HelpfulError::invalid_config(path, &e.to_string()).into())
}

pub fn load_catalog(path: &Path) -> anyhow::Result<Catalog> {
    if !path.exists() {
        return Err(HelpfulError::menu_not_found(path).into());
    }
    Catalog::load(path).map_err(|e| HelpfulError::invalid_menu(path, &e.to_string()).into())
}

pub fn load_inventory(path: &Path, catalog: &Catalog) -> anyhow::Result<Ledger> {
    load_ledger(path, catalog)
        .map_err(|e| HelpfulError::invalid_inventory(path, &e.to_string()).into())
}

/// Build the full engine, provider included.
pub fn build_engine(config: &EngineConfig) -> anyhow::Result<OrderEngine> {
    let catalog = load_catalog(&config.catalog.menu_path)?;
    let ledger = load_inventory(&config.catalog.inventory_path, &catalog)?;
    let provider = build_provider(&config.nlu, &catalog).map_err(|e| {
        anyhow::Error::from(HelpfulError::provider_unavailable(
            config.nlu.provider.as_str(),
            &e.to_string(),
        ))
    })?;
    Ok(OrderEngine::new(
        Arc::new(catalog),
        Arc::new(ledger),
        provider,
        config.settings(),
    ))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    pub const MENU: &str = r#"{
        "categories": {
            "Main": {
                "Club Sandwich": {
                    "price": 18.50,
                    "description": "Triple-decker with turkey and bacon",
                    "modifications_allowed": true,
                    "available_modifications": ["No Bacon", "Extra Bacon"],
                    "allergens": ["gluten"],
                    "preparation_time": 15
                }
            },
            "Beverage": {
                "Latte": {
                    "price": 5.50,
                    "description": "Espresso with steamed milk",
                    "modifications_allowed": true,
                    "available_modifications": ["Oat Milk"],
                    "allergens": ["dairy"],
                    "preparation_time": 5
                }
            }
        }
    }"#;

    /// Menu, inventory and an empty config file in a fresh directory.
    pub fn write_fixture(inventory: &str) -> (TempDir, EngineConfig) {
        let temp = TempDir::new().unwrap();
        let menu = temp.path().join("menu.json");
        let stock = temp.path().join("inventory.json");
        std::fs::write(&menu, MENU).unwrap();
        std::fs::write(&stock, inventory).unwrap();

        let mut config = EngineConfig::default();
        CatalogArgs {
            menu: Some(menu),
            inventory: Some(stock),
        }
        .apply(&mut config);
        (temp, config)
    }

    #[test]
    fn test_build_engine_from_fixture() {
        let (_temp, config) = write_fixture(r#"{"Latte": 2}"#);
        let engine = build_engine(&config).unwrap();
        assert_eq!(engine.catalog().len(), 2);
        assert_eq!(engine.ledger().remaining("Latte"), Some(2));
        assert_eq!(engine.provider().name(), "Lexical");
    }

    #[test]
    fn test_missing_menu_is_helpful() {
        let err = load_catalog(Path::new("/nonexistent/menu.json")).unwrap_err();
        let helpful = err.downcast_ref::<HelpfulError>().unwrap();
        assert!(helpful.message.contains("Menu file not found"));
    }

    #[test]
    fn test_negative_stock_is_helpful() {
        let (_temp, config) = write_fixture(r#"{"Latte": -1}"#);
        let err = build_engine(&config).unwrap_err();
        let helpful = err.downcast_ref::<HelpfulError>().unwrap();
        assert!(helpful.message.starts_with("Inventory rejected"));
    }
}
