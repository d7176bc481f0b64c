//! Column normalizer - asks a language model how to read a statement layout

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::json_extract::extract_json_object;
use crate::domain::result::{Error, Result};
use crate::domain::{unique_column_names, CanonicalField, ColumnMapping, ConversionModel, RawTable};
use crate::ports::LlmClient;

/// Default number of data rows rendered into the prompt
pub const DEFAULT_MAX_PROMPT_ROWS: usize = 50;

#[derive(Debug, Deserialize)]
struct NormalizerResponse {
    column_mapping: ColumnMapping,
    header_row: usize,
    start_row: usize,
}

/// Infers a `ConversionModel` for a table through an `LlmClient`
pub struct ColumnNormalizer {
    llm: Arc<dyn LlmClient>,
    max_prompt_rows: usize,
}

impl ColumnNormalizer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self {
            llm,
            max_prompt_rows: DEFAULT_MAX_PROMPT_ROWS,
        }
    }

    pub fn with_max_prompt_rows(mut self, rows: usize) -> Self {
        self.max_prompt_rows = rows.max(1);
        self
    }

    pub async fn normalize(&self, table: &RawTable) -> Result<ConversionModel> {
        let prompt = build_prompt(table, self.max_prompt_rows);
        debug!(model = self.llm.name(), rows = table.row_count(), "Requesting column mapping");

        let response = self.llm.generate(&prompt).await?;
        let model = parse_response(&response, table)?;

        info!(
            header_row = model.header_row,
            start_row = model.start_row,
            debit_credit = model.column_map.uses_debit_credit(),
            "Inferred statement layout"
        );
        Ok(model)
    }
}

/// Render the table as `index | cell | cell ...` lines; line 0 is the file's first line
pub fn render_table(table: &RawTable, max_rows: usize) -> String {
    let mut out = format!("0 | {}\n", table.columns.join(" | "));
    for (i, row) in table.rows.iter().take(max_rows).enumerate() {
        let cells: Vec<String> = row.iter().map(|c| c.display()).collect();
        out.push_str(&format!("{} | {}\n", i + 1, cells.join(" | ")));
    }
    if table.row_count() > max_rows {
        out.push_str(&format!("... ({} more rows)\n", table.row_count() - max_rows));
    }
    out
}

fn build_prompt(table: &RawTable, max_rows: usize) -> String {
    let fields: Vec<&str> = CanonicalField::ALL.iter().map(|f| f.as_str()).collect();

    format!(
        r#"You are given the first lines of a bank statement export. Each line starts with its row index followed by the cells separated by " | ".

{table}
Work out how to read this statement:
- Find the row that holds the real column names. Banks often put account details, titles or blank lines above it; ignore those. Report its index as "header_row".
- Report the index of the first transaction row as "start_row". It must be greater than "header_row".
- Map each of these fields to a column name taken exactly from the header row: {fields}.
- Use "" for a field the statement does not have. Never invent a column name.
- If the statement has one signed amount column, map "amount" and leave "debit_amount" and "credit_amount" empty. If money in and money out are separate columns, map "debit_amount" (money out) and "credit_amount" (money in) and leave "amount" empty.

Respond with a single JSON object and nothing else:
{{"column_mapping": {{"date": "", "description": "", "amount": "", "debit_amount": "", "credit_amount": "", "currency": "", "balance": ""}}, "header_row": 0, "start_row": 1}}"#,
        table = render_table(table, max_rows),
        fields = fields.join(", "),
    )
}

/// Validate a model answer into a conversion model for `table`
pub fn parse_response(response: &str, table: &RawTable) -> Result<ConversionModel> {
    let mut object = extract_json_object(response)
        .ok_or_else(|| Error::invalid_llm_response("no JSON object in column mapping response"))?;

    for key in ["column_mapping", "header_row", "start_row"] {
        if !object.contains_key(key) {
            return Err(Error::invalid_llm_response(format!("missing key '{}'", key)));
        }
    }

    // Models sometimes answer null for absent fields
    if let Some(Value::Object(mapping)) = object.get_mut("column_mapping") {
        for value in mapping.values_mut() {
            if value.is_null() {
                *value = Value::String(String::new());
            }
        }
    }

    let parsed: NormalizerResponse = serde_json::from_value(Value::Object(object))
        .map_err(|e| Error::invalid_llm_response(format!("malformed column mapping: {}", e)))?;

    if parsed.header_row > table.row_count() {
        return Err(Error::invalid_llm_response(format!(
            "header_row {} is beyond the end of the table",
            parsed.header_row
        )));
    }
    // One past the last row is allowed and yields an empty statement
    if parsed.start_row > table.row_count() + 1 {
        return Err(Error::invalid_llm_response(format!(
            "start_row {} is beyond the end of the table",
            parsed.start_row
        )));
    }

    let model = ConversionModel::new(parsed.column_mapping, parsed.header_row, parsed.start_row)
        .map_err(|e| Error::invalid_llm_response(e.to_string()))?;

    let header = header_candidates(table, model.header_row);
    for (field, name) in model.column_map.mapped() {
        if !header.iter().any(|h| h.eq_ignore_ascii_case(name)) {
            return Err(Error::invalid_llm_response(format!(
                "{} mapped to unknown column '{}'",
                field.as_str(),
                name
            )));
        }
    }

    Ok(model)
}

/// Column names as they appear on the header row the model chose
fn header_candidates(table: &RawTable, header_row: usize) -> Vec<String> {
    if header_row == 0 {
        return table.columns.clone();
    }
    table
        .row_as_header(header_row - 1)
        .map(|names| unique_column_names(names, table.column_count()))
        .unwrap_or_default()
}
