//! Shared engine state handed to every session.

use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::{Catalog, CatalogError};
use crate::config::{EngineConfig, NluConfig, NluProviderKind};
use crate::context::DEFAULT_HISTORY_WINDOW;
use crate::finalizer::{Finalizer, DEFAULT_PREP_BUFFER_MINUTES};
use crate::inquiry::MenuInquiry;
use crate::interpreter::{ResponseInterpreter, DEFAULT_MIN_REPLY_CONFIDENCE};
use crate::ledger::{Ledger, LedgerError};
use crate::matching::MatchPolicy;
use crate::nlu::{ClaudeNlu, LexicalNlu, NluError, NluHandle, NluHint, NluProvider};
use crate::validation::OrderValidator;

/// Tunables for one engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EngineSettings {
    pub policy: MatchPolicy,
    pub history_window: usize,
    pub min_intent_confidence: f64,
    pub min_reply_confidence: f64,
    pub max_commit_attempts: u32,
    pub prep_buffer_minutes: u32,
    pub nlu_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            policy: MatchPolicy::default(),
            history_window: DEFAULT_HISTORY_WINDOW,
            min_intent_confidence: 0.70,
            min_reply_confidence: DEFAULT_MIN_REPLY_CONFIDENCE,
            max_commit_attempts: 3,
            prep_buffer_minutes: DEFAULT_PREP_BUFFER_MINUTES,
            nlu_timeout: Duration::from_secs(20),
        }
    }
}

/// Startup failures.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Catalog load failed: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Inventory load failed: {0}")]
    Ledger(#[from] LedgerError),

    #[error("NLU provider unavailable: {0}")]
    Nlu(#[from] NluError),
}

/// Immutable catalog, shared ledger and provider, cloned cheaply into
/// every session.
#[derive(Clone)]
pub struct OrderEngine {
    catalog: Arc<Catalog>,
    ledger: Arc<Ledger>,
    nlu: Arc<dyn NluProvider>,
    settings: EngineSettings,
}

impl fmt::Debug for OrderEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderEngine")
            .field("items", &self.catalog.len())
            .field("ledger", &self.ledger)
            .field("provider", &self.nlu.name())
            .field("settings", &self.settings)
            .finish()
    }
}

impl OrderEngine {
    pub fn new(
        catalog: Arc<Catalog>,
        ledger: Arc<Ledger>,
        nlu: Arc<dyn NluProvider>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            catalog,
            ledger,
            nlu,
            settings,
        }
    }

    /// Load catalog and ledger from disk and build the configured provider.
    /// Any failure aborts before a session can be opened.
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let catalog = Arc::new(Catalog::load(&config.catalog.menu_path)?);
        let ledger = Arc::new(load_ledger(&config.catalog.inventory_path, &catalog)?);
        let nlu = build_provider(&config.nlu, &catalog)?;
        tracing::info!(
            items = catalog.len(),
            provider = nlu.name(),
            "engine ready"
        );
        Ok(Self::new(catalog, ledger, nlu, config.settings()))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn provider(&self) -> &dyn NluProvider {
        self.nlu.as_ref()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn handle<'a>(&'a self, hint: &'a NluHint) -> NluHandle<'a> {
        NluHandle::new(self.nlu.as_ref(), self.settings.nlu_timeout, hint)
    }

    pub fn validator(&self) -> OrderValidator<'_> {
        OrderValidator::new(&self.catalog, &self.ledger, self.settings.policy)
    }

    pub fn interpreter(&self) -> ResponseInterpreter {
        ResponseInterpreter::new(self.settings.min_reply_confidence)
    }

    pub fn finalizer(&self) -> Finalizer {
        Finalizer::new(self.settings.prep_buffer_minutes)
    }

    pub fn inquiry(&self) -> MenuInquiry<'_> {
        MenuInquiry::new(&self.catalog, self.settings.policy)
    }
}

/// Load the ledger, warning about entries the menu doesn't know.
pub fn load_ledger(path: &Path, catalog: &Catalog) -> Result<Ledger, LedgerError> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "no inventory file, every item is untracked");
        return Ok(Ledger::default());
    }
    let ledger = Ledger::load(path)?;
    for name in ledger.unknown_items(catalog) {
        tracing::warn!(item = %name, "inventory entry is not on the menu");
    }
    Ok(ledger)
}

pub fn build_provider(
    config: &NluConfig,
    catalog: &Catalog,
) -> Result<Arc<dyn NluProvider>, NluError> {
    let provider: Arc<dyn NluProvider> = match config.provider {
        NluProviderKind::Lexical => Arc::new(LexicalNlu::new().with_catalog(catalog)),
        NluProviderKind::Claude => Arc::new(
            ClaudeNlu::from_env()?
                .with_model(config.model.clone())
                .with_max_tokens(config.max_tokens),
        ),
    };
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::SAMPLE_MENU;
    use tempfile::TempDir;

    #[test]
    fn test_from_config_loads_files() {
        let temp = TempDir::new().unwrap();
        let menu = temp.path().join("menu.json");
        let inventory = temp.path().join("inventory.json");
        std::fs::write(&menu, SAMPLE_MENU).unwrap();
        std::fs::write(&inventory, r#"{"Beverage": {"Latte": 4}, "Dessert": {"Tiramisu": 2}}"#).unwrap();

        let mut config = EngineConfig::default();
        config.catalog.menu_path = menu;
        config.catalog.inventory_path = inventory;

        let engine = OrderEngine::from_config(&config).unwrap();
        assert_eq!(engine.catalog().len(), 6);
        assert_eq!(engine.ledger().remaining("Latte"), Some(4));
        assert_eq!(engine.provider().name(), "Lexical");

        let debug = format!("{:?}", engine);
        assert!(debug.starts_with("OrderEngine"));
        assert!(debug.contains("provider: \"Lexical\""));
        assert!(debug.contains("items: 6"));
    }

    #[test]
    fn test_missing_menu_is_fatal() {
        let temp = TempDir::new().unwrap();
        let mut config = EngineConfig::default();
        config.catalog.menu_path = temp.path().join("missing.json");
        assert!(matches!(
            OrderEngine::from_config(&config),
            Err(EngineError::Catalog(_))
        ));
    }
}
