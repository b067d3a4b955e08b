//! Helpful error types for CLI commands
//!
//! Every error includes:
//! - What went wrong
//! - Context about the situation
//! - Suggestions for how to fix it

use std::fmt;
use std::path::Path;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    /// The main error message
    pub message: String,
    /// Additional context about what was happening
    pub context: Option<String>,
    /// Suggestions for how to fix the error
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    pub fn with_suggestions(mut self, suggestions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.suggestions.extend(suggestions.into_iter().map(|s| s.into()));
        self
    }

    // === Common error constructors ===

    /// Menu file missing
    pub fn menu_not_found(path: &Path) -> Self {
        Self::new(format!("Menu file not found: {}", path.display()))
            .with_context("The ordering assistant cannot start without a menu")
            .with_suggestions([
                format!("TRY: Check that the file exists: ls -la {}", path.display()),
                "TRY: Point at another menu: roomservice chat --menu PATH".to_string(),
                "TRY: Set catalog.menu_path in config.toml".to_string(),
            ])
    }

    /// Menu file present but rejected
    pub fn invalid_menu(path: &Path, details: &str) -> Self {
        Self::new(format!("Menu rejected: {}", details))
            .with_context(format!("Failed to load menu: {}", path.display()))
            .with_suggestions([
                "TRY: Prices must be above 0 and at most 999.99 with two decimals".to_string(),
                "TRY: Preparation times must be between 1 and 180 minutes".to_string(),
                "TRY: Item names must be unique regardless of case".to_string(),
            ])
    }

    /// Inventory file present but rejected
    pub fn invalid_inventory(path: &Path, details: &str) -> Self {
        Self::new(format!("Inventory rejected: {}", details))
            .with_context(format!("Failed to load inventory: {}", path.display()))
            .with_suggestions([
                "TRY: Use {\"Category\": {\"Item\": count}} or {\"Item\": count}".to_string(),
                "TRY: Stock levels cannot be negative".to_string(),
                "TRY: Remove the file to run with untracked stock".to_string(),
            ])
    }

    /// Config file present but rejected
    pub fn invalid_config(path: &Path, details: &str) -> Self {
        Self::new(format!("Config rejected: {}", details))
            .with_context(format!("Failed to load config: {}", path.display()))
            .with_suggestions([
                "TRY: Show the effective settings: roomservice config".to_string(),
                format!("TRY: Move the file aside to use defaults: mv {0} {0}.bak", path.display()),
            ])
    }

    /// Provider could not be constructed
    pub fn provider_unavailable(provider: &str, details: &str) -> Self {
        Self::new(format!("NLU provider '{}' unavailable: {}", provider, details))
            .with_context("The language understanding provider could not be started")
            .with_suggestions([
                "TRY: export ANTHROPIC_API_KEY=... for the claude provider".to_string(),
                "TRY: Run offline with: roomservice chat --provider lexical".to_string(),
            ])
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}

/// JSON rendering of a command failure, for `--json` callers.
pub fn json_error(err: &anyhow::Error) -> serde_json::Value {
    match err.downcast_ref::<HelpfulError>() {
        Some(helpful) => serde_json::json!({
            "error": {
                "message": helpful.message,
                "context": helpful.context,
                "suggestions": helpful.suggestions,
            }
        }),
        None => serde_json::json!({
            "error": {
                "message": format!("{:#}", err),
                "context": null,
                "suggestions": [],
            }
        }),
    }
}

pub fn print_json_error(err: &anyhow::Error) {
    let value = json_error(err);
    match serde_json::to_string_pretty(&value) {
        Ok(text) => println!("{}", text),
        Err(_) => eprintln!("{:?}", err),
    }
}
