//! Categorize and retry-failed commands

use anyhow::Result;
use colored::Colorize;

use super::get_context;
use crate::output;

pub async fn run(limit: Option<usize>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let summary = ctx
        .categorization_service
        .categorize_pending_transactions(limit)
        .await?;

    if json {
        return output::json(&summary);
    }

    if summary.processed == 0 {
        println!("No pending transactions.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.add_row(vec!["Processed", &summary.processed.to_string()]);
    table.add_row(vec!["Categorized", &summary.categorized.to_string()]);
    table.add_row(vec!["Failed", &summary.failed.to_string()]);
    table.add_row(vec!["Batches", &summary.batches.to_string()]);
    println!("{}", table);

    if summary.failed_batches > 0 {
        println!();
        output::warning(&format!(
            "{} batch(es) failed; see `sm logs --errors`",
            summary.failed_batches
        ));
    }
    if summary.failed > 0 {
        println!(
            "{} Run `sm retry-failed` and `sm categorize` to try the failed ones again",
            "!".yellow()
        );
    }
    Ok(())
}

pub async fn retry_failed(json: bool) -> Result<()> {
    let ctx = get_context()?;
    let reset = ctx.categorization_service.retry_failed().await?;

    if json {
        println!("{}", serde_json::json!({ "reset": reset }));
        return Ok(());
    }

    if reset == 0 {
        println!("No failed transactions.");
    } else {
        output::success(&format!("Moved {} transaction(s) back to pending", reset));
    }
    Ok(())
}
