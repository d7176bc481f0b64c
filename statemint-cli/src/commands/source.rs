//! Source commands - the accounts statements are imported into

use anyhow::Result;
use clap::Subcommand;

use super::get_context;
use crate::output;

#[derive(Subcommand)]
pub enum SourceCommands {
    /// Register a new source
    Add {
        /// Source name, e.g. "Current account"
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List sources
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl SourceCommands {
    pub fn name(&self) -> &'static str {
        match self {
            SourceCommands::Add { .. } => "source add",
            SourceCommands::List { .. } => "source list",
        }
    }

    pub fn wants_json(&self) -> bool {
        match self {
            SourceCommands::Add { json, .. } => *json,
            SourceCommands::List { json, .. } => *json,
        }
    }
}

pub async fn run(command: SourceCommands) -> Result<()> {
    let ctx = get_context()?;

    match command {
        SourceCommands::Add { name, json } => {
            let source = ctx.status_service.add_source(&name).await?;
            if json {
                return output::json(&source);
            }
            output::success(&format!("Added source '{}' (ID {})", source.name, source.id));
        }
        SourceCommands::List { json } => {
            let sources = ctx.status_service.list_sources().await?;
            if json {
                return output::json(&sources);
            }
            if sources.is_empty() {
                println!("No sources yet. Add one with `sm source add <name>`.");
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["ID", "Name", "Created"]);
            for source in sources {
                table.add_row(vec![
                    source.id.to_string(),
                    source.name,
                    source.created_at.format("%Y-%m-%d %H:%M").to_string(),
                ]);
            }
            println!("{}", table);
        }
    }

    Ok(())
}
