//! Guest-facing text for prompts, drafts and confirmations.

use roomservice_dialog::{PendingQuery, QueryOrigin};
use rust_decimal::Decimal;

use crate::draft::OrderDraft;
use crate::finalizer::OrderConfirmation;

/// `$12.50`
pub fn format_price(price: Decimal) -> String {
    let mut rounded = price.round_dp(2);
    rounded.rescale(2);
    format!("${}", rounded)
}

/// The question shown for a pending query.
pub fn query_prompt(query: &PendingQuery) -> String {
    match query {
        PendingQuery::ItemReplacement { item, origin, options } => {
            let lead = match origin {
                QueryOrigin::Catalog => format!(
                    "For '{}', please choose one of these options or type 'remove' to remove it:",
                    item
                ),
                QueryOrigin::Stock => format!(
                    "{} is sold out. Please choose one of these instead or type 'remove' to remove it:",
                    item
                ),
            };
            numbered(lead, options.iter().map(|o| o.label.as_str()))
        }
        PendingQuery::ModificationReplacement {
            item,
            modification,
            options,
        } => numbered(
            format!(
                "For '{}' on {}, please choose one of these options or type 'remove' to remove it:",
                modification, item
            ),
            options.iter().map(|o| o.label.as_str()),
        ),
        PendingQuery::ItemRemoval { item, origin } => match origin {
            QueryOrigin::Catalog => format!(
                "Sorry, we don't have '{}'. Type 'remove' to remove it from your order.",
                item
            ),
            QueryOrigin::Stock => format!(
                "{} is sold out. Type 'remove' to remove it from your order.",
                item
            ),
        },
        PendingQuery::ModificationRemoval { item, modification } => format!(
            "'{}' is not available for {}. Type 'remove' to remove it.",
            modification, item
        ),
        PendingQuery::ModificationRemovalAll { item } => format!(
            "{} can't be modified. Type 'remove' to order it without modifications.",
            item
        ),
        PendingQuery::QuantityAdjustment {
            item,
            requested,
            available,
        } => format!(
            "You asked for {} {}, but only {} are available. Type '{}' to order {}, or 'remove' to remove it.",
            requested, item, available, available, available
        ),
    }
}

pub fn retry_prompt(query: &PendingQuery) -> String {
    format!("Sorry, I didn't catch that. {}", query_prompt(query))
}

fn numbered<'a>(lead: String, labels: impl Iterator<Item = &'a str>) -> String {
    let mut out = lead;
    for (n, label) in labels.enumerate() {
        out.push_str(&format!("\n{}. {}", n + 1, label));
    }
    out
}

/// One line per item: `- 2x Caesar Salad with Add Chicken`
pub fn order_details(draft: &OrderDraft) -> String {
    draft
        .items
        .iter()
        .map(|line| {
            if line.modifications.is_empty() {
                format!("- {}x {}", line.quantity, line.name)
            } else {
                format!(
                    "- {}x {} with {}",
                    line.quantity,
                    line.name,
                    line.modifications.join(", ")
                )
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn confirmation_summary(order: &OrderConfirmation) -> String {
    let mut out = format!(
        "Order {} confirmed for room {}.",
        order.order_id.short(),
        order.room_number
    );
    for line in &order.items {
        out.push_str(&format!("\n- {}x {}", line.quantity, line.name));
        if !line.modifications.is_empty() {
            out.push_str(&format!(" with {}", line.modifications.join(", ")));
        }
        out.push_str(&format!(" ({})", format_price(line.line_total)));
    }
    out.push_str(&format!(
        "\nTotal: {}\nEstimated time: {} minutes",
        format_price(order.total_price),
        order.estimated_time_minutes
    ));
    if let Some(notes) = &order.special_instructions {
        out.push_str(&format!("\nNotes: {}", notes));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::LineItem;
    use roomservice_dialog::QueryOption;
    use std::str::FromStr;

    #[test]
    fn test_format_price_pads_to_cents() {
        assert_eq!(format_price(Decimal::from_str("5.5").unwrap()), "$5.50");
        assert_eq!(format_price(Decimal::from(32)), "$32.00");
        assert_eq!(format_price(Decimal::from_str("999.99").unwrap()), "$999.99");
    }

    #[test]
    fn test_replacement_prompt_numbers_options() {
        let query = PendingQuery::item_replacement(
            "fish dinner",
            QueryOrigin::Catalog,
            vec![QueryOption::new("Grilled Salmon", 0.91), QueryOption::new("Club Sandwich", 0.72)],
        )
        .unwrap();
        assert_eq!(
            query_prompt(&query),
            "For 'fish dinner', please choose one of these options or type 'remove' to remove it:\n1. Grilled Salmon\n2. Club Sandwich"
        );
        assert!(retry_prompt(&query).starts_with("Sorry, I didn't catch that. For 'fish dinner'"));
    }

    #[test]
    fn test_quantity_prompt_offers_available_count() {
        let query = PendingQuery::quantity_adjustment("Latte", 5, 2).unwrap();
        assert!(query_prompt(&query).contains("Type '2' to order 2"));
    }

    #[test]
    fn test_order_details_lines() {
        let draft = OrderDraft::new()
            .with_item(LineItem::new("Caesar Salad", 2).with_modifications(["Add Chicken", "No Croutons"]))
            .with_item(LineItem::new("Latte", 1));
        assert_eq!(
            order_details(&draft),
            "- 2x Caesar Salad with Add Chicken, No Croutons\n- 1x Latte"
        );
    }
}
