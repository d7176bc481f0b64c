//! Output formatting utilities

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};
use rust_decimal::Decimal;
use serde::Serialize;

use statemint_core::StatementTransaction;

/// Print a success message
pub fn success(msg: &str) {
    println!("{}", msg.green());
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{}", msg.red());
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{}", msg.yellow());
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{}", msg.cyan());
}

/// Print any serializable value as pretty JSON
pub fn json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Create a styled table
pub fn create_table() -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Amount coloured by sign
pub fn amount(value: Decimal) -> String {
    let text = value.to_string();
    if value.is_sign_negative() {
        text.red().to_string()
    } else {
        text.green().to_string()
    }
}

/// Table of statement transactions
pub fn transactions_table(transactions: &[StatementTransaction]) -> Table {
    let mut table = create_table();
    table.set_header(vec!["Date", "Description", "Amount", "Currency", "Balance"]);
    for tx in transactions {
        table.add_row(vec![
            tx.date.to_string(),
            tx.description.clone(),
            amount(tx.amount),
            tx.currency.clone(),
            tx.balance.map(|b| b.to_string()).unwrap_or_default(),
        ]);
    }
    table
}
