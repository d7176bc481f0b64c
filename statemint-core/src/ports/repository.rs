//! Repository ports - persistence abstraction
//!
//! The services depend only on these traits. `adapters::duckdb` provides the
//! production implementation.

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::result::Result;
use crate::domain::{
    CategorizationStatus, Category, CategoryNode, SchemaUpdate, Source, StatementSchema,
    StatementTransaction, Transaction,
};

/// Schema cache keyed by statement hash
#[async_trait]
pub trait StatementSchemaRepository: Send + Sync {
    /// First-saved schema for a statement shape, if any
    async fn find_by_hash(&self, statement_hash: &str) -> Result<Option<StatementSchema>>;

    /// Persist a new schema
    async fn save(&self, schema: &StatementSchema) -> Result<()>;

    /// Apply an explicit partial update (human-confirmed mapping)
    async fn update(&self, id: Uuid, update: &SchemaUpdate) -> Result<StatementSchema>;
}

/// Result of a guarded duplicate-check-then-insert
#[derive(Debug, Clone, Default)]
pub struct InsertOutcome {
    pub inserted: Vec<Transaction>,
    pub duplicates: Vec<StatementTransaction>,
}

/// Categorization write for one transaction
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryAssignment {
    pub transaction_id: Uuid,
    pub category_id: Option<i64>,
    pub sub_category_id: Option<i64>,
    pub status: CategorizationStatus,
    pub confidence: Option<f64>,
}

impl CategoryAssignment {
    pub fn failed(transaction_id: Uuid) -> Self {
        Self {
            transaction_id,
            category_id: None,
            sub_category_id: None,
            status: CategorizationStatus::Failed,
            confidence: None,
        }
    }
}

/// Normalized description -> leaf category, from already categorized history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoricalCategorization {
    pub normalized_description: String,
    pub category_id: i64,
}

/// Transaction counts per categorization status
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusCounts {
    pub pending: i64,
    pub categorized: i64,
    pub failed: i64,
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    /// Candidates whose (date, description, amount, source) already exist
    async fn find_duplicates(
        &self,
        source_id: i64,
        candidates: &[StatementTransaction],
    ) -> Result<Vec<StatementTransaction>>;

    /// Persist all candidates in one batch as pending transactions
    async fn create_many(
        &self,
        source_id: i64,
        candidates: &[StatementTransaction],
    ) -> Result<Vec<Transaction>>;

    /// Duplicate check followed by insert of the unique remainder
    ///
    /// Implementations that can hold one lock or DB transaction across both
    /// steps should override this to close the check-then-insert window.
    async fn insert_unique(
        &self,
        source_id: i64,
        candidates: &[StatementTransaction],
    ) -> Result<InsertOutcome> {
        let duplicates = self.find_duplicates(source_id, candidates).await?;
        let unique: Vec<StatementTransaction> = candidates
            .iter()
            .filter(|c| !duplicates.contains(c))
            .cloned()
            .collect();
        let inserted = self.create_many(source_id, &unique).await?;
        Ok(InsertOutcome {
            inserted,
            duplicates,
        })
    }

    /// Oldest pending transactions, up to `limit`
    async fn get_uncategorized_batch(&self, limit: usize) -> Result<Vec<Transaction>>;

    async fn update_category_and_status(&self, assignments: &[CategoryAssignment]) -> Result<()>;

    /// Move failed transactions back to pending; returns how many moved
    async fn reset_failed(&self) -> Result<usize>;

    /// Most recent distinct normalized descriptions with their category
    async fn recent_categorized_descriptions(
        &self,
        limit: usize,
    ) -> Result<Vec<HistoricalCategorization>>;

    async fn get_transaction(&self, id: Uuid) -> Result<Option<Transaction>>;

    async fn get_transactions(&self, source_id: Option<i64>) -> Result<Vec<Transaction>>;

    async fn count_by_status(&self) -> Result<StatusCounts>;
}

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    /// Top-level categories with their subcategories, ordered by id
    async fn get_category_tree(&self) -> Result<Vec<CategoryNode>>;

    async fn get_category(&self, id: i64) -> Result<Option<Category>>;

    /// Parent of a subcategory; `None` for top-level categories
    async fn get_parent_of(&self, id: i64) -> Result<Option<Category>>;

    /// Insert a category with an already-unique name
    async fn add_category(
        &self,
        category_name: &str,
        parent_category_id: Option<i64>,
        description: Option<&str>,
    ) -> Result<Category>;
}

#[async_trait]
pub trait SourceRepository: Send + Sync {
    async fn add_source(&self, name: &str) -> Result<Source>;

    async fn get_source(&self, id: i64) -> Result<Option<Source>>;

    async fn get_sources(&self) -> Result<Vec<Source>>;
}
