//! Analyze command - infer a statement's layout and preview it

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use super::{get_context, read_statement};
use crate::output;
use statemint_core::services::AnalysisResult;

pub async fn run(file: &Path, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let (file_name, bytes) = read_statement(file)?;
    let analysis = ctx.upload_service.analyze(&file_name, &bytes).await?;

    if json {
        return output::json(&analysis);
    }

    print_analysis(&analysis);
    println!();
    output::info(&format!(
        "Finalize with: sm finalize {} --source-id <ID>",
        analysis.statement_id
    ));
    Ok(())
}

/// Human-readable summary shared with `import`
pub fn print_analysis(analysis: &AnalysisResult) {
    let schema = &analysis.statement_schema;
    let stats = &analysis.statistics;

    println!("{}", format!("Statement {}", analysis.file_name).bold());
    println!("  ID:         {}", analysis.statement_id);
    println!("  Type:       {}", analysis.file_type);
    println!(
        "  Schema:     {}",
        if analysis.cache_hit {
            "cached".green()
        } else {
            "inferred".yellow()
        }
    );
    println!("  Header row: {}", schema.header_row);
    println!("  Start row:  {}", schema.start_row);
    println!();

    let mut mapping = output::create_table();
    mapping.set_header(vec!["Field", "Column"]);
    for (field, column) in schema.column_mapping.mapped() {
        mapping.add_row(vec![field.as_str().to_string(), column.to_string()]);
    }
    println!("{}", mapping);
    println!();

    println!("Transactions: {}", stats.count);
    println!("Total amount: {}", output::amount(stats.total_amount));
    if let (Some(start), Some(end)) = (stats.date_range_start, stats.date_range_end) {
        println!("Date range:   {} to {}", start, end);
    }
    if analysis.rows_dropped > 0 {
        output::warning(&format!(
            "{} row(s) could not be read and were dropped",
            analysis.rows_dropped
        ));
    }

    if !analysis.preview.is_empty() {
        println!();
        println!("{}", output::transactions_table(&analysis.preview));
    }
}
