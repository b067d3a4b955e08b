//! Engine configuration parsing
//!
//! Reads settings from `~/.roomservice/config.toml`. Every key is optional.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::engine::EngineSettings;
use crate::matching::MatchPolicy;

/// Error type for config operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid setting {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Result type for config operations
pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub matching: MatchingConfig,

    #[serde(default)]
    pub dialog: DialogConfig,

    #[serde(default)]
    pub sessions: SessionConfig,

    #[serde(default)]
    pub nlu: NluConfig,
}

/// Menu and inventory file locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_menu_path")]
    pub menu_path: PathBuf,

    #[serde(default = "default_inventory_path")]
    pub inventory_path: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            menu_path: default_menu_path(),
            inventory_path: default_inventory_path(),
        }
    }
}

/// Resolver thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Fuzzy matches must score strictly above this
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,

    /// Semantic matches must score at least this
    #[serde(default = "default_semantic_threshold")]
    pub semantic_threshold: f64,

    #[serde(default = "default_max_alternatives")]
    pub max_alternatives: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: default_fuzzy_threshold(),
            semantic_threshold: default_semantic_threshold(),
            max_alternatives: default_max_alternatives(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogConfig {
    /// Entries kept per context history
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    #[serde(default = "default_min_intent_confidence")]
    pub min_intent_confidence: f64,

    #[serde(default = "default_min_reply_confidence")]
    pub min_reply_confidence: f64,

    /// Validation rounds tried when stock changes under a commit
    #[serde(default = "default_max_commit_attempts")]
    pub max_commit_attempts: u32,

    #[serde(default = "default_prep_buffer_minutes")]
    pub prep_buffer_minutes: u32,
}

impl Default for DialogConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            min_intent_confidence: default_min_intent_confidence(),
            min_reply_confidence: default_min_reply_confidence(),
            max_commit_attempts: default_max_commit_attempts(),
            prep_buffer_minutes: default_prep_buffer_minutes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_idle_ttl_seconds")]
    pub idle_ttl_seconds: u64,

    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_ttl_seconds: default_idle_ttl_seconds(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
        }
    }
}

impl SessionConfig {
    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }
}

/// Which NLU provider to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NluProviderKind {
    #[default]
    Lexical,
    Claude,
}

impl NluProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NluProviderKind::Lexical => "lexical",
            NluProviderKind::Claude => "claude",
        }
    }
}

impl std::str::FromStr for NluProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "lexical" => Ok(NluProviderKind::Lexical),
            "claude" => Ok(NluProviderKind::Claude),
            other => Err(ConfigError::Invalid {
                key: "nlu.provider",
                message: format!("unknown provider '{}', expected lexical or claude", other),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NluConfig {
    #[serde(default)]
    pub provider: NluProviderKind,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Bound on every provider call
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for NluConfig {
    fn default() -> Self {
        Self {
            provider: NluProviderKind::default(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

// Default value functions
fn default_menu_path() -> PathBuf { PathBuf::from("data/menu.json") }
fn default_inventory_path() -> PathBuf { PathBuf::from("data/inventory.json") }
fn default_fuzzy_threshold() -> f64 { 0.80 }
fn default_semantic_threshold() -> f64 { 0.70 }
fn default_max_alternatives() -> usize { 3 }
fn default_history_window() -> usize { 5 }
fn default_min_intent_confidence() -> f64 { 0.70 }
fn default_min_reply_confidence() -> f64 { 0.50 }
fn default_max_commit_attempts() -> u32 { 3 }
fn default_prep_buffer_minutes() -> u32 { 5 }
fn default_idle_ttl_seconds() -> u64 { 1800 }
fn default_sweep_interval_seconds() -> u64 { 60 }
fn default_model() -> String { crate::nlu::claude::DEFAULT_MODEL.to_string() }
fn default_max_tokens() -> u32 { 1024 }
fn default_timeout_seconds() -> u64 { 20 }

impl EngineConfig {
    /// Reject values that would make the engine misbehave.
    pub fn validate(&self) -> Result<()> {
        let unit = 0.0..=1.0;
        if !unit.contains(&self.matching.fuzzy_threshold) {
            return Err(invalid("matching.fuzzy_threshold", self.matching.fuzzy_threshold));
        }
        if !unit.contains(&self.matching.semantic_threshold) {
            return Err(invalid("matching.semantic_threshold", self.matching.semantic_threshold));
        }
        if self.matching.max_alternatives == 0 {
            return Err(invalid("matching.max_alternatives", 0));
        }
        if !unit.contains(&self.dialog.min_intent_confidence) {
            return Err(invalid("dialog.min_intent_confidence", self.dialog.min_intent_confidence));
        }
        if !unit.contains(&self.dialog.min_reply_confidence) {
            return Err(invalid("dialog.min_reply_confidence", self.dialog.min_reply_confidence));
        }
        if self.dialog.max_commit_attempts == 0 {
            return Err(invalid("dialog.max_commit_attempts", 0));
        }
        if self.nlu.timeout_seconds == 0 {
            return Err(invalid("nlu.timeout_seconds", 0));
        }
        Ok(())
    }

    pub fn match_policy(&self) -> MatchPolicy {
        MatchPolicy {
            fuzzy_threshold: self.matching.fuzzy_threshold,
            semantic_threshold: self.matching.semantic_threshold,
            max_alternatives: self.matching.max_alternatives,
        }
    }

    /// Runtime settings for the engine.
    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            policy: self.match_policy(),
            history_window: self.dialog.history_window,
            min_intent_confidence: self.dialog.min_intent_confidence,
            min_reply_confidence: self.dialog.min_reply_confidence,
            max_commit_attempts: self.dialog.max_commit_attempts,
            prep_buffer_minutes: self.dialog.prep_buffer_minutes,
            nlu_timeout: Duration::from_secs(self.nlu.timeout_seconds),
        }
    }
}

fn invalid(key: &'static str, value: impl std::fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        key,
        message: format!("{} is out of range", value),
    }
}

/// Load configuration from a file. A missing file yields the defaults.
pub fn load_config(config_path: &Path) -> Result<EngineConfig> {
    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "no config file, using defaults");
        return Ok(EngineConfig::default());
    }

    let content = std::fs::read_to_string(config_path)?;
    let config: EngineConfig = toml::from_str(&content)?;
    config.validate()?;
    tracing::info!(path = %config_path.display(), "config loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.catalog.menu_path, PathBuf::from("data/menu.json"));
        assert_eq!(config.matching.fuzzy_threshold, 0.80);
        assert_eq!(config.matching.semantic_threshold, 0.70);
        assert_eq!(config.matching.max_alternatives, 3);
        assert_eq!(config.dialog.history_window, 5);
        assert_eq!(config.sessions.idle_ttl(), Duration::from_secs(1800));
        assert_eq!(config.nlu.provider, NluProviderKind::Lexical);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_empty_file() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.toml");
        std::fs::write(&config_path, "").unwrap();

        let config = load_config(&config_path).unwrap();
        assert_eq!(config.dialog.prep_buffer_minutes, 5);
    }

    #[test]
    fn test_load_partial_config() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.toml");
        std::fs::write(
            &config_path,
            r#"
            [matching]
            max_alternatives = 5

            [nlu]
            provider = "claude"
            timeout_seconds = 5
            "#,
        )
        .unwrap();

        let config = load_config(&config_path).unwrap();
        assert_eq!(config.matching.max_alternatives, 5);
        assert_eq!(config.matching.fuzzy_threshold, 0.80);
        assert_eq!(config.nlu.provider, NluProviderKind::Claude);

        let settings = config.settings();
        assert_eq!(settings.nlu_timeout, Duration::from_secs(5));
        assert_eq!(settings.policy.max_alternatives, 5);
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.toml");
        std::fs::write(&config_path, "[matching]\nfuzzy_threshold = 1.5\n").unwrap();
        assert!(matches!(
            load_config(&config_path),
            Err(ConfigError::Invalid { key: "matching.fuzzy_threshold", .. })
        ));
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("config.toml");
        std::fs::write(&config_path, "[dialog\nhistory_window = ").unwrap();
        assert!(matches!(load_config(&config_path), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn test_nonexistent_file() {
        let temp = TempDir::new().unwrap();
        let config = load_config(&temp.path().join("nonexistent.toml")).unwrap();
        assert_eq!(config.sessions.sweep_interval_seconds, 60);
    }

    #[test]
    fn test_provider_kind_parse() {
        assert_eq!("Claude".parse::<NluProviderKind>().unwrap(), NluProviderKind::Claude);
        assert!("openai".parse::<NluProviderKind>().is_err());
    }
}
