//! Status command - sources, categories and categorization progress

use anyhow::Result;
use colored::Colorize;
use comfy_table::{ContentArrangement, Table};

use super::get_context;

pub async fn run(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let status = ctx.status_service.get_status().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{}", "Statemint Status".bold());
    println!();

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);

    table.add_row(vec!["Sources", &status.total_sources.to_string()]);
    table.add_row(vec!["Transactions", &status.total_transactions.to_string()]);
    table.add_row(vec!["  Pending", &status.transactions.pending.to_string()]);
    table.add_row(vec!["  Categorized", &status.transactions.categorized.to_string()]);
    table.add_row(vec!["  Failed", &status.transactions.failed.to_string()]);
    table.add_row(vec!["Categories", &status.total_categories.to_string()]);
    table.add_row(vec!["Assignable categories", &status.assignable_categories.to_string()]);

    println!("{}", table);

    if !status.sources.is_empty() {
        println!();
        println!("{}", "Sources".bold());
        for source in &status.sources {
            println!("  • {} ({})", source.name, source.id);
        }
    }
    println!();
    println!("Data directory: {}", ctx.data_dir.display());

    Ok(())
}
