//! Category commands - manage the category tree and manual assignments

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use uuid::Uuid;

use super::get_context;
use crate::output;

#[derive(Subcommand)]
pub enum CategoryCommands {
    /// Add a category, or a subcategory with --parent
    Add {
        /// Category name
        name: String,
        /// ID of the top-level parent category
        #[arg(long)]
        parent: Option<i64>,
        /// Optional description used by the categorizers
        #[arg(long)]
        description: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the category tree
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Assign a category to a transaction by hand
    Assign {
        /// Transaction ID
        transaction_id: String,
        /// Category ID
        category_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl CategoryCommands {
    pub fn name(&self) -> &'static str {
        match self {
            CategoryCommands::Add { .. } => "category add",
            CategoryCommands::List { .. } => "category list",
            CategoryCommands::Assign { .. } => "category assign",
        }
    }

    pub fn wants_json(&self) -> bool {
        match self {
            CategoryCommands::Add { json, .. } => *json,
            CategoryCommands::List { json, .. } => *json,
            CategoryCommands::Assign { json, .. } => *json,
        }
    }
}

pub async fn run(command: CategoryCommands) -> Result<()> {
    let ctx = get_context()?;

    match command {
        CategoryCommands::Add {
            name,
            parent,
            description,
            json,
        } => {
            let category = ctx
                .category_service
                .add_category(&name, parent, description.as_deref())
                .await?;

            if json {
                return output::json(&category);
            }
            output::success(&format!(
                "Added category '{}' (ID {})",
                category.category_name, category.id
            ));
        }
        CategoryCommands::List { json } => {
            let tree = ctx.category_service.tree().await?;

            if json {
                return output::json(&tree);
            }
            if tree.is_empty() {
                println!("No categories yet. Add one with `sm category add <name>`.");
                return Ok(());
            }

            let mut table = output::create_table();
            table.set_header(vec!["ID", "Category", "Description"]);
            for node in &tree {
                table.add_row(vec![
                    node.category.id.to_string(),
                    node.category.category_name.bold().to_string(),
                    node.category.description.clone().unwrap_or_default(),
                ]);
                for sub in &node.subcategories {
                    table.add_row(vec![
                        sub.id.to_string(),
                        format!("  {}", sub.short_name()),
                        sub.description.clone().unwrap_or_default(),
                    ]);
                }
            }
            println!("{}", table);
        }
        CategoryCommands::Assign {
            transaction_id,
            category_id,
            json,
        } => {
            let transaction_id = Uuid::parse_str(&transaction_id)
                .with_context(|| format!("Invalid transaction ID: {}", transaction_id))?;
            let transaction = ctx
                .categorization_service
                .set_category(transaction_id, category_id)
                .await?;

            if json {
                return output::json(&transaction);
            }
            output::success(&format!(
                "Categorized '{}' as category {}",
                transaction.description,
                transaction.sub_category_id.or(transaction.category_id).unwrap_or(category_id)
            ));
        }
    }

    Ok(())
}
