//! Statemint CLI - bank statements in, categorized transactions out

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{analyze, categorize, category, finalize, import, logs, source, status};
use statemint_core::{LogEvent, OperationResult};

/// Environment variable holding the diagnostic log filter
const LOG_FILTER_ENV: &str = "STATEMINT_LOG";

/// Statemint - import bank statements and categorize transactions
#[derive(Parser)]
#[command(name = "sm", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Infer the layout of a statement file and preview its transactions
    Analyze {
        /// Path to a CSV or Excel statement
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Store the transactions of an analyzed statement
    Finalize {
        /// Statement ID printed by `analyze`
        statement_id: String,
        /// Source the statement belongs to
        #[arg(long)]
        source_id: i64,
        /// JSON file with a corrected schema (defaults to the inferred one)
        #[arg(long)]
        schema: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Analyze and finalize a statement with the inferred schema
    Import {
        /// Path to a CSV or Excel statement
        file: PathBuf,
        /// Source the statement belongs to
        #[arg(long)]
        source_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Categorize pending transactions
    Categorize {
        /// Maximum number of transactions to process
        #[arg(long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Move failed transactions back to pending
    RetryFailed {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage categories
    Category {
        #[command(subcommand)]
        command: category::CategoryCommands,
    },

    /// Manage statement sources
    Source {
        #[command(subcommand)]
        command: source::SourceCommands,
    },

    /// Show sources, categories and categorization progress
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show recent event log entries
    Logs {
        /// Number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Show only errors
        #[arg(long)]
        errors: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Analyze { .. } => "analyze",
            Commands::Finalize { .. } => "finalize",
            Commands::Import { .. } => "import",
            Commands::Categorize { .. } => "categorize",
            Commands::RetryFailed { .. } => "retry-failed",
            Commands::Category { command } => command.name(),
            Commands::Source { command } => command.name(),
            Commands::Status { .. } => "status",
            Commands::Logs { .. } => "logs",
        }
    }

    fn wants_json(&self) -> bool {
        match self {
            Commands::Analyze { json, .. }
            | Commands::Finalize { json, .. }
            | Commands::Import { json, .. }
            | Commands::Categorize { json, .. }
            | Commands::RetryFailed { json }
            | Commands::Status { json }
            | Commands::Logs { json, .. } => *json,
            Commands::Category { command } => command.wants_json(),
            Commands::Source { command } => command.wants_json(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let logger = commands::get_logger();
    let command_name = cli.command.name();
    let json = cli.command.wants_json();
    commands::log_event(&logger, LogEvent::new("command_executed").with_command(command_name));

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            commands::log_event(
                &logger,
                LogEvent::new("command_failed")
                    .with_command(command_name)
                    .with_error(e.to_string()),
            );
            if json {
                println!("{}", serde_json::to_string_pretty(&failure(&e)).unwrap_or_default());
            } else {
                output::error(&format!("{:#}", e));
            }
            ExitCode::FAILURE
        }
    }
}

/// JSON body for a failed command; core errors say whether the input was at fault
fn failure(e: &anyhow::Error) -> OperationResult<()> {
    let result = OperationResult::fail(format!("{:#}", e));
    match e.downcast_ref::<statemint_core::Error>() {
        Some(core) => result.with_context("client_error", serde_json::Value::Bool(core.is_client_error())),
        None => result,
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Analyze { file, json } => analyze::run(&file, json).await,
        Commands::Finalize {
            statement_id,
            source_id,
            schema,
            json,
        } => finalize::run(&statement_id, source_id, schema.as_deref(), json).await,
        Commands::Import {
            file,
            source_id,
            json,
        } => import::run(&file, source_id, json).await,
        Commands::Categorize { limit, json } => categorize::run(limit, json).await,
        Commands::RetryFailed { json } => categorize::retry_failed(json).await,
        Commands::Category { command } => category::run(command).await,
        Commands::Source { command } => source::run(command).await,
        Commands::Status { json } => status::run(json).await,
        Commands::Logs {
            limit,
            errors,
            json,
        } => logs::run(limit, errors, json),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_command_names_for_event_log() {
        let cli = Cli::parse_from(["sm", "finalize", "0b6f", "--source-id", "3", "--json"]);
        assert_eq!(cli.command.name(), "finalize");

        let cli = Cli::parse_from(["sm", "category", "add", "Groceries", "--parent", "1"]);
        assert_eq!(cli.command.name(), "category add");

        let cli = Cli::parse_from(["sm", "retry-failed"]);
        assert_eq!(cli.command.name(), "retry-failed");
    }

    #[test]
    fn test_json_flag_reaches_subcommands() {
        assert!(Cli::parse_from(["sm", "source", "list", "--json"]).command.wants_json());
        assert!(Cli::parse_from(["sm", "categorize", "--limit", "5", "--json"]).command.wants_json());
        assert!(!Cli::parse_from(["sm", "status"]).command.wants_json());
    }

    #[test]
    fn test_failure_body_flags_client_errors() {
        let err = anyhow::Error::new(statemint_core::Error::not_found("Source 9 not found"));
        let body = failure(&err);
        assert!(!body.success);
        assert_eq!(body.error.as_deref(), Some("Not found: Source 9 not found"));
        let context = body.context.unwrap();
        assert_eq!(context.get("client_error"), Some(&serde_json::Value::Bool(true)));

        let body = failure(&anyhow::anyhow!("Could not find home directory"));
        assert!(body.context.is_none());
    }
}
