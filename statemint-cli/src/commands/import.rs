//! Import command - analyze and finalize in one step

use std::path::Path;

use anyhow::Result;

use super::analyze::print_analysis;
use super::finalize::print_response;
use super::{get_context, read_statement};
use crate::output;

pub async fn run(file: &Path, source_id: i64, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let (file_name, bytes) = read_statement(file)?;
    let result = ctx
        .upload_service
        .import_file(&file_name, &bytes, source_id)
        .await?;

    if json {
        return output::json(&result);
    }

    print_analysis(&result.analysis);
    println!();
    print_response(&result.finalize);
    Ok(())
}
