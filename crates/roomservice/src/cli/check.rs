//! `roomservice check`: load the menu and inventory and report what the
//! engine would see.

use roomservice_core::format::format_price;
use roomservice_core::{Catalog, Ledger};
use serde::Serialize;
use std::path::Path;

use super::output::{print_table, stock_label};
use super::CatalogArgs;

#[derive(Debug, clap::Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub catalog: CatalogArgs,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct ItemReport {
    pub name: String,
    pub category: String,
    pub price: String,
    pub preparation_minutes: u32,
    pub modifications: usize,
    pub stock: String,
}

#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub menu_path: String,
    pub inventory_path: String,
    pub items: Vec<ItemReport>,
    pub tracked_items: usize,
    pub sold_out: Vec<String>,
    /// Inventory entries that name nothing on the menu
    pub unknown_inventory: Vec<String>,
}

pub fn build_report(
    catalog: &Catalog,
    ledger: &Ledger,
    menu_path: &Path,
    inventory_path: &Path,
) -> CheckReport {
    let items: Vec<ItemReport> = catalog
        .entries()
        .iter()
        .map(|entry| ItemReport {
            name: entry.name.clone(),
            category: entry.category.to_string(),
            price: format_price(entry.price),
            preparation_minutes: entry.preparation_time_minutes,
            modifications: entry.allowed_modifications().len(),
            stock: stock_label(ledger.available(&entry.name)),
        })
        .collect();

    let sold_out = catalog
        .entries()
        .iter()
        .filter(|e| ledger.remaining(&e.name) == Some(0))
        .map(|e| e.name.clone())
        .collect();

    CheckReport {
        menu_path: menu_path.display().to_string(),
        inventory_path: inventory_path.display().to_string(),
        tracked_items: catalog
            .entries()
            .iter()
            .filter(|e| ledger.remaining(&e.name).is_some())
            .count(),
        items,
        sold_out,
        unknown_inventory: ledger.unknown_items(catalog),
    }
}

pub fn run(args: CheckArgs, config_path: &Path) -> anyhow::Result<()> {
    let mut config = super::load_engine_config(config_path)?;
    args.catalog.apply(&mut config);

    let menu_path = &config.catalog.menu_path;
    let inventory_path = &config.catalog.inventory_path;
    let catalog = super::load_catalog(menu_path)?;
    let ledger = super::load_inventory(inventory_path, &catalog)?;
    let report = build_report(&catalog, &ledger, menu_path, inventory_path);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("MENU CHECK");
    println!("==========");
    println!();
    println!("Menu:      {}", report.menu_path);
    println!("Inventory: {}", report.inventory_path);
    println!();

    let rows = report
        .items
        .iter()
        .map(|item| {
            vec![
                item.name.clone(),
                item.category.clone(),
                item.price.clone(),
                format!("{} min", item.preparation_minutes),
                item.modifications.to_string(),
                item.stock.clone(),
            ]
        })
        .collect();
    print_table(&["Item", "Category", "Price", "Prep", "Mods", "Stock"], rows);

    println!();
    println!(
        "{} items, {} tracked, {} sold out",
        report.items.len(),
        report.tracked_items,
        report.sold_out.len()
    );
    for name in &report.unknown_inventory {
        println!("WARNING: inventory entry '{}' is not on the menu", name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::tests::write_fixture;

    #[test]
    fn test_report_counts_stock() {
        let (_temp, config) = write_fixture(r#"{"Beverage": {"Latte": 0}, "Dessert": {"Tiramisu": 3}}"#);
        let catalog = crate::cli::load_catalog(&config.catalog.menu_path).unwrap();
        let ledger = crate::cli::load_inventory(&config.catalog.inventory_path, &catalog).unwrap();

        let report = build_report(
            &catalog,
            &ledger,
            &config.catalog.menu_path,
            &config.catalog.inventory_path,
        );
        assert_eq!(report.items.len(), 2);
        assert_eq!(report.tracked_items, 1);
        assert_eq!(report.sold_out, vec!["Latte"]);
        assert_eq!(report.unknown_inventory, vec!["Tiramisu"]);

        let latte = report.items.iter().find(|i| i.name == "Latte").unwrap();
        assert_eq!(latte.price, "$5.50");
        assert_eq!(latte.stock, "sold out");
        let sandwich = report.items.iter().find(|i| i.name == "Club Sandwich").unwrap();
        assert_eq!(sandwich.stock, "untracked");
        assert_eq!(sandwich.modifications, 2);
    }
}
