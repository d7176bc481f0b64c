//! Finalize command - store the transactions of an analyzed statement

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Deserialize;
use uuid::Uuid;

use super::get_context;
use crate::output;
use statemint_core::services::FinalizeResponse;
use statemint_core::ColumnMapping;

/// Corrections read from `--schema`
///
/// The `statement_schema` object printed by `sm analyze --json` is accepted
/// as is. Fields left out keep their inferred values.
#[derive(Debug, Deserialize)]
struct SchemaFile {
    column_mapping: Option<ColumnMapping>,
    header_row: Option<usize>,
    start_row: Option<usize>,
}

pub async fn run(statement_id: &str, source_id: i64, schema: Option<&Path>, json: bool) -> Result<()> {
    let statement_id = Uuid::parse_str(statement_id)
        .with_context(|| format!("Invalid statement ID: {}", statement_id))?;
    let ctx = get_context()?;

    let mut request = ctx
        .upload_service
        .inferred_request(statement_id, source_id)
        .await?;

    if let Some(path) = schema {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema file {:?}", path))?;
        let corrections: SchemaFile = serde_json::from_str(&content)
            .with_context(|| format!("Invalid schema file {:?}", path))?;

        let confirmed = &mut request.statement_schema;
        if let Some(mapping) = corrections.column_mapping {
            confirmed.column_mapping = mapping;
        }
        if let Some(header_row) = corrections.header_row {
            confirmed.header_row = header_row;
        }
        if let Some(start_row) = corrections.start_row {
            confirmed.start_row = start_row;
        }
    }

    let response = ctx.upload_service.finalize(&request).await?;

    if json {
        return output::json(&response);
    }

    print_response(&response);
    Ok(())
}

/// Human-readable result shared with `import`
pub fn print_response(response: &FinalizeResponse) {
    println!("{} {}", "✓".green(), response.message);
    if response.skipped_duplicates > 0 {
        output::warning(&format!(
            "{} transaction(s) were already stored and skipped",
            response.skipped_duplicates
        ));
    }
    if response.transactions_processed > 0 {
        output::info("Run `sm categorize` to categorize the new transactions");
    }
}
