//! Output formatting utilities for CLI commands

use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use roomservice_core::{Availability, TurnOutcome};

/// Print a table with headers and rows
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    println!("{}", build_table(headers, rows));
}

fn build_table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header_cells: Vec<Cell> = headers
        .iter()
        .map(|h| Cell::new(h).fg(Color::Cyan))
        .collect();
    table.set_header(header_cells);

    for row in rows {
        table.add_row(row);
    }
    table
}

pub fn stock_label(availability: Availability) -> String {
    match availability {
        Availability::Tracked(0) => "sold out".to_string(),
        Availability::Tracked(n) => n.to_string(),
        Availability::Untracked => "untracked".to_string(),
    }
}

pub fn exists_label(exists: bool) -> &'static str {
    if exists {
        "exists"
    } else {
        "not found"
    }
}

/// What the guest sees after a turn. Issues come before the question.
pub fn render_outcome(outcome: &TurnOutcome) -> String {
    match outcome {
        TurnOutcome::NeedsInput { issues, prompts, .. } => {
            let mut lines: Vec<String> = issues.iter().map(|i| format!("Note: {}", i)).collect();
            lines.extend(prompts.iter().cloned());
            lines.join("\n")
        }
        TurnOutcome::Rejected { reason, retryable: true } => {
            format!("{} (you can send that again)", reason)
        }
        other => other.message(),
    }
}
