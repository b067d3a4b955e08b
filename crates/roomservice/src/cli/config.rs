//! `roomservice config`: resolved paths and effective settings.

use roomservice_core::EngineConfig;
use std::path::Path;

use super::output::exists_label;

/// Arguments for the config command
#[derive(Debug, clap::Args)]
pub struct ConfigArgs {
    /// Show resolved paths and settings in JSON format
    #[arg(long)]
    pub json: bool,
}

pub fn config_json(config: &EngineConfig, config_path: &Path) -> serde_json::Value {
    let home = roomservice_logging::roomservice_home();
    let logs = roomservice_logging::logs_dir();
    serde_json::json!({
        "home": home.to_string_lossy(),
        "config": {
            "path": config_path.to_string_lossy(),
            "exists": config_path.exists(),
        },
        "logs": {
            "path": logs.to_string_lossy(),
            "exists": logs.exists(),
        },
        "menu": {
            "path": config.catalog.menu_path.to_string_lossy(),
            "exists": config.catalog.menu_path.exists(),
        },
        "inventory": {
            "path": config.catalog.inventory_path.to_string_lossy(),
            "exists": config.catalog.inventory_path.exists(),
        },
        "settings": config,
    })
}

/// Run the config command
pub fn run(args: ConfigArgs, config_path: &Path) -> anyhow::Result<()> {
    let config = super::load_engine_config(config_path)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&config_json(&config, config_path))?);
        return Ok(());
    }

    println!("ROOM SERVICE CONFIGURATION");
    println!("==========================");
    println!();
    println!("Home:      {}", roomservice_logging::roomservice_home().display());
    println!(
        "Config:    {} ({})",
        config_path.display(),
        exists_label(config_path.exists())
    );
    println!("Logs:      {}", roomservice_logging::logs_dir().display());
    println!(
        "Menu:      {} ({})",
        config.catalog.menu_path.display(),
        exists_label(config.catalog.menu_path.exists())
    );
    println!(
        "Inventory: {} ({})",
        config.catalog.inventory_path.display(),
        exists_label(config.catalog.inventory_path.exists())
    );
    println!();
    println!("Effective settings:");
    println!();
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_json_reports_settings() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[matching]\nfuzzy_threshold = 0.85\n\n[nlu]\nprovider = \"claude\"\n").unwrap();

        let config = crate::cli::load_engine_config(&path).unwrap();
        let value = config_json(&config, &path);
        assert_eq!(value["config"]["exists"], true);
        assert_eq!(value["settings"]["matching"]["fuzzy_threshold"], 0.85);
        assert_eq!(value["settings"]["matching"]["semantic_threshold"], 0.7);
        assert_eq!(value["settings"]["nlu"]["provider"], "claude");
    }

    #[test]
    fn test_out_of_range_config_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[matching]\nfuzzy_threshold = 1.5\n").unwrap();
        assert!(crate::cli::load_engine_config(&path).is_err());
    }
}
