//! Category service - category tree management

use std::sync::Arc;

use tracing::{info, warn};

use super::categorize::TransactionCategorizer;
use crate::domain::result::{Error, Result};
use crate::domain::{subcategory_display_name, Category, CategoryNode};
use crate::ports::CategoryRepository;

/// Adds categories and tells the categorizers to rebuild their rules
pub struct CategoryService {
    categories: Arc<dyn CategoryRepository>,
    categorizer: Option<Arc<dyn TransactionCategorizer>>,
}

impl CategoryService {
    pub fn new(
        categories: Arc<dyn CategoryRepository>,
        categorizer: Option<Arc<dyn TransactionCategorizer>>,
    ) -> Self {
        Self {
            categories,
            categorizer,
        }
    }

    /// Add a top-level category, or a subcategory when `parent_id` is given
    ///
    /// Subcategories are stored as "{parent}: {name}". Only one level of
    /// nesting exists, so the parent must itself be top-level.
    pub async fn add_category(
        &self,
        name: &str,
        parent_id: Option<i64>,
        description: Option<&str>,
    ) -> Result<Category> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("Category name cannot be empty"));
        }

        let stored_name = match parent_id {
            Some(pid) => {
                let parent = self
                    .categories
                    .get_category(pid)
                    .await?
                    .ok_or_else(|| Error::not_found(format!("Parent category {} not found", pid)))?;
                if !parent.is_top_level() {
                    return Err(Error::validation(format!(
                        "'{}' is a subcategory and cannot have children",
                        parent.category_name
                    )));
                }
                subcategory_display_name(&parent.category_name, name)
            }
            None => name.to_string(),
        };

        let exists = self
            .tree()
            .await?
            .iter()
            .flat_map(|n| std::iter::once(&n.category).chain(n.subcategories.iter()))
            .any(|c| c.category_name == stored_name);
        if exists {
            return Err(Error::validation(format!(
                "Category '{}' already exists",
                stored_name
            )));
        }

        let description = description.map(str::trim).filter(|d| !d.is_empty());
        let category = self
            .categories
            .add_category(&stored_name, parent_id, description)
            .await?;
        info!(category_id = category.id, "Added category");

        // Already persisted; rules stay stale until the next successful refresh
        if let Some(categorizer) = &self.categorizer {
            if let Err(e) = categorizer.refresh_rules().await {
                warn!(error = %e, "Failed to refresh categorization rules");
            }
        }
        Ok(category)
    }

    pub async fn tree(&self) -> Result<Vec<CategoryNode>> {
        self.categories.get_category_tree().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::duckdb::DuckDbRepository;
    use crate::domain::{CategorizationResult, TxDescriptor};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingRefresh {
        refreshes: AtomicUsize,
    }

    #[async_trait]
    impl TransactionCategorizer for CountingRefresh {
        fn name(&self) -> &str {
            "counting"
        }

        async fn categorize(&self, transactions: &[TxDescriptor]) -> Result<Vec<CategorizationResult>> {
            Ok(transactions
                .iter()
                .map(|t| CategorizationResult::unmatched(t.id))
                .collect())
        }

        async fn refresh_rules(&self) -> Result<()> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn service() -> (Arc<CountingRefresh>, CategoryService) {
        let counter = Arc::new(CountingRefresh::default());
        let service = CategoryService::new(
            Arc::new(DuckDbRepository::open_in_memory().unwrap()),
            Some(counter.clone()),
        );
        (counter, service)
    }

    #[tokio::test]
    async fn test_subcategory_naming_and_refresh() {
        let (counter, service) = service();
        let food = service.add_category(" Food ", None, None).await.unwrap();
        let groceries = service
            .add_category("Groceries", Some(food.id), Some("  "))
            .await
            .unwrap();

        assert_eq!(food.category_name, "Food");
        assert_eq!(groceries.category_name, "Food: Groceries");
        assert_eq!(groceries.parent_category_id, Some(food.id));
        assert!(groceries.description.is_none());
        assert_eq!(counter.refreshes.load(Ordering::SeqCst), 2);

        let tree = service.tree().await.unwrap();
        assert_eq!(tree[0].subcategories[0].short_name(), "Groceries");
    }

    #[tokio::test]
    async fn test_rejects_duplicates_and_deep_nesting() {
        let (counter, service) = service();
        let food = service.add_category("Food", None, None).await.unwrap();
        let groceries = service.add_category("Groceries", Some(food.id), None).await.unwrap();

        let dup = service.add_category("Food", None, None).await.unwrap_err();
        assert!(matches!(dup, Error::Validation(_)));

        let nested = service
            .add_category("Organic", Some(groceries.id), None)
            .await
            .unwrap_err();
        assert!(matches!(nested, Error::Validation(_)));

        let orphan = service.add_category("X", Some(999), None).await.unwrap_err();
        assert!(matches!(orphan, Error::NotFound(_)));

        assert!(service.add_category("   ", None, None).await.is_err());
        assert_eq!(counter.refreshes.load(Ordering::SeqCst), 2);
    }
}
