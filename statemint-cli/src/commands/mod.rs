//! CLI command implementations

pub mod analyze;
pub mod categorize;
pub mod category;
pub mod finalize;
pub mod import;
pub mod logs;
pub mod source;
pub mod status;

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};
use statemint_core::{open_event_log, EntryPoint, LogEvent, LoggingService, StatemintContext, DATA_DIR_ENV};

static LOGGER: OnceLock<Option<Arc<LoggingService>>> = OnceLock::new();

/// Get the event log for CLI operations
///
/// Opened once per process and shared with the context. Returns None if the
/// log cannot be opened; that never blocks a command.
pub fn get_logger() -> Option<Arc<LoggingService>> {
    LOGGER
        .get_or_init(|| {
            let data_dir = get_data_dir().ok()?;
            std::fs::create_dir_all(&data_dir).ok()?;
            open_event_log(&data_dir, EntryPoint::Cli)
        })
        .clone()
}

/// Log an event, ignoring any errors
pub fn log_event(logger: &Option<Arc<LoggingService>>, event: LogEvent) {
    if let Some(l) = logger {
        l.record(event);
    }
}

/// Get the data directory from environment or default
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(".statemint"))
}

/// Get or create the statemint context
pub fn get_context() -> Result<StatemintContext> {
    let data_dir = get_data_dir()?;
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

    StatemintContext::with_logger(&data_dir, get_logger())
        .context("Failed to initialize statemint context")
}

/// Read a statement file, keeping only its file name for type detection
pub fn read_statement(path: &Path) -> Result<(String, Vec<u8>)> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("Not a file: {:?}", path))?;
    Ok((file_name, bytes))
}
