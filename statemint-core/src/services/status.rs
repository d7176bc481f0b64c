//! Status service - sources, categories and categorization progress

use std::sync::Arc;

use serde::Serialize;

use crate::domain::result::{Error, Result};
use crate::domain::{leaf_categories, Source};
use crate::ports::{CategoryRepository, SourceRepository, StatusCounts, TransactionRepository};

pub struct StatusService {
    sources: Arc<dyn SourceRepository>,
    transactions: Arc<dyn TransactionRepository>,
    categories: Arc<dyn CategoryRepository>,
}

impl StatusService {
    pub fn new(
        sources: Arc<dyn SourceRepository>,
        transactions: Arc<dyn TransactionRepository>,
        categories: Arc<dyn CategoryRepository>,
    ) -> Self {
        Self {
            sources,
            transactions,
            categories,
        }
    }

    pub async fn get_status(&self) -> Result<StatusSummary> {
        let sources = self.sources.get_sources().await?;
        let counts = self.transactions.count_by_status().await?;
        let tree = self.categories.get_category_tree().await?;

        Ok(StatusSummary {
            total_sources: sources.len(),
            total_transactions: counts.pending + counts.categorized + counts.failed,
            transactions: counts,
            total_categories: tree.len() + tree.iter().map(|n| n.subcategories.len()).sum::<usize>(),
            assignable_categories: leaf_categories(&tree).len(),
            sources,
        })
    }

    /// Register a statement source; names are unique
    pub async fn add_source(&self, name: &str) -> Result<Source> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("Source name cannot be empty"));
        }
        let existing = self.sources.get_sources().await?;
        if existing.iter().any(|s| s.name == name) {
            return Err(Error::validation(format!("Source '{}' already exists", name)));
        }
        self.sources.add_source(name).await
    }

    pub async fn list_sources(&self) -> Result<Vec<Source>> {
        self.sources.get_sources().await
    }
}

#[derive(Debug, Serialize)]
pub struct StatusSummary {
    pub total_sources: usize,
    pub total_transactions: i64,
    pub transactions: StatusCounts,
    pub total_categories: usize,
    pub assignable_categories: usize,
    pub sources: Vec<Source>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::duckdb::DuckDbRepository;

    #[tokio::test]
    async fn test_summary_counts() {
        let repo = Arc::new(DuckDbRepository::open_in_memory().unwrap());
        let service = StatusService::new(repo.clone(), repo.clone(), repo.clone());

        service.add_source("Checking").await.unwrap();
        assert!(matches!(
            service.add_source("Checking").await,
            Err(Error::Validation(_))
        ));
        let food = repo.add_category("Food", None, None).await.unwrap();
        repo.add_category("Food: Groceries", Some(food.id), None).await.unwrap();
        repo.add_category("Salary", None, None).await.unwrap();

        let status = service.get_status().await.unwrap();
        assert_eq!(status.total_sources, 1);
        assert_eq!(status.total_transactions, 0);
        assert_eq!(status.total_categories, 3);
        assert_eq!(status.assignable_categories, 2);
    }
}
