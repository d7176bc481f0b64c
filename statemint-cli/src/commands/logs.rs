//! Logs command - view the event log

use anyhow::{Context, Result};
use chrono::{TimeZone, Utc};
use colored::Colorize;

use super::get_logger;
use crate::output;

fn format_timestamp(timestamp_ms: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

pub fn run(limit: usize, errors: bool, json: bool) -> Result<()> {
    let service = get_logger().context("Event log is unavailable")?;
    let entries = if errors {
        service.get_errors(limit)?
    } else {
        service.get_recent(limit)?
    };

    if json {
        return output::json(&entries);
    }

    if entries.is_empty() {
        println!("No log entries found.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Time", "Event", "Context", "Count", "Error"]);

    for entry in &entries {
        let context = [entry.command.as_deref(), entry.file_type.as_deref()]
            .iter()
            .filter_map(|&s| s)
            .collect::<Vec<_>>()
            .join(", ");

        let error = match &entry.error_message {
            Some(message) if errors => message.clone(),
            Some(_) => "!".red().to_string(),
            None => String::new(),
        };

        table.add_row(vec![
            format_timestamp(entry.timestamp),
            entry.event.clone(),
            context,
            entry.count.map(|c| c.to_string()).unwrap_or_default(),
            error,
        ]);
    }

    println!("{}", table);
    println!("Log database: {}", service.db_path().display().to_string().dimmed());

    Ok(())
}
