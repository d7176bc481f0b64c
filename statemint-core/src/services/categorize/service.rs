//! Categorization service - drives the strategy chain over pending transactions
//!
//! State machine per transaction:
//! `pending -> categorized` when a strategy matched,
//! `pending -> failed` when nothing matched or the batch errored,
//! `failed -> pending` on `retry_failed`.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::TransactionCategorizer;
use crate::domain::result::{Error, Result};
use crate::domain::{CategorizationResult, CategorizationStatus, Transaction, TxDescriptor};
use crate::ports::{CategoryAssignment, CategoryRepository, TransactionRepository};
use crate::services::logging::{record, LogEvent, LoggingService};

/// Outcome of one categorization run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategorizationSummary {
    pub processed: usize,
    pub categorized: usize,
    pub failed: usize,
    pub batches: usize,
    /// Batches that failed as a whole (LLM error, timeout, ...)
    pub failed_batches: usize,
}

pub struct CategorizationService {
    transactions: Arc<dyn TransactionRepository>,
    categories: Arc<dyn CategoryRepository>,
    categorizer: Arc<dyn TransactionCategorizer>,
    batch_size: usize,
    logger: Option<Arc<LoggingService>>,
}

impl CategorizationService {
    pub fn new(
        transactions: Arc<dyn TransactionRepository>,
        categories: Arc<dyn CategoryRepository>,
        categorizer: Arc<dyn TransactionCategorizer>,
        batch_size: usize,
    ) -> Self {
        Self {
            transactions,
            categories,
            categorizer,
            batch_size: batch_size.max(1),
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: Arc<LoggingService>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Categorize pending transactions batch by batch, up to `limit` in total
    ///
    /// Only pending rows are read, so running this twice never touches a
    /// transaction that already left `pending`. A failing batch is marked
    /// failed and the run continues with the next one.
    pub async fn categorize_pending_transactions(
        &self,
        limit: Option<usize>,
    ) -> Result<CategorizationSummary> {
        let mut summary = CategorizationSummary::default();

        loop {
            let budget = match limit {
                Some(limit) if summary.processed >= limit => break,
                Some(limit) => (limit - summary.processed).min(self.batch_size),
                None => self.batch_size,
            };
            let batch = self.transactions.get_uncategorized_batch(budget).await?;
            if batch.is_empty() {
                break;
            }

            let assignments = self.categorize_batch(&batch, &mut summary).await?;
            self.transactions
                .update_category_and_status(&assignments)
                .await?;

            summary.batches += 1;
            summary.processed += batch.len();
            for a in &assignments {
                match a.status {
                    CategorizationStatus::Categorized => summary.categorized += 1,
                    _ => summary.failed += 1,
                }
            }
        }

        info!(
            processed = summary.processed,
            categorized = summary.categorized,
            failed = summary.failed,
            "Categorization run finished"
        );
        Ok(summary)
    }

    async fn categorize_batch(
        &self,
        batch: &[Transaction],
        summary: &mut CategorizationSummary,
    ) -> Result<Vec<CategoryAssignment>> {
        let descriptors: Vec<TxDescriptor> = batch.iter().map(descriptor).collect();

        let results = match self.categorizer.categorize(&descriptors).await {
            Ok(results) => results,
            Err(e) => {
                warn!(batch = batch.len(), error = %e, "Categorization batch failed");
                summary.failed_batches += 1;
                record(
                    self.logger.as_deref(),
                    LogEvent::new("categorization_failed")
                        .with_count(batch.len())
                        .with_error(e.to_string())
                        .with_error_details(self.categorizer.name()),
                );
                return Ok(batch.iter().map(|t| CategoryAssignment::failed(t.id)).collect());
            }
        };

        let mut assignments = Vec::with_capacity(batch.len());
        for tx in batch {
            let result = results
                .iter()
                .find(|r| r.id == tx.id)
                .cloned()
                .unwrap_or_else(|| CategorizationResult::unmatched(tx.id));
            assignments.push(self.assignment_for(&result).await?);
        }
        Ok(assignments)
    }

    /// Split a leaf category into (category, subcategory) ids
    async fn assignment_for(&self, result: &CategorizationResult) -> Result<CategoryAssignment> {
        let Some(leaf_id) = result.category_id else {
            return Ok(CategoryAssignment::failed(result.id));
        };
        if self.categories.get_category(leaf_id).await?.is_none() {
            warn!(category_id = leaf_id, "Categorizer returned a missing category");
            return Ok(CategoryAssignment::failed(result.id));
        }

        let (category_id, sub_category_id) = match self.categories.get_parent_of(leaf_id).await? {
            Some(parent) => (parent.id, Some(leaf_id)),
            None => (leaf_id, None),
        };

        Ok(CategoryAssignment {
            transaction_id: result.id,
            category_id: Some(category_id),
            sub_category_id,
            status: CategorizationStatus::Categorized,
            confidence: Some(result.confidence),
        })
    }

    /// Move failed transactions back to pending
    pub async fn retry_failed(&self) -> Result<usize> {
        let reset = self.transactions.reset_failed().await?;
        info!(reset, "Re-queued failed transactions");
        Ok(reset)
    }

    /// Manually assign a category, bypassing the strategies
    pub async fn set_category(&self, transaction_id: Uuid, category_id: i64) -> Result<Transaction> {
        if self.transactions.get_transaction(transaction_id).await?.is_none() {
            return Err(Error::not_found(format!("Transaction {} not found", transaction_id)));
        }
        if self.categories.get_category(category_id).await?.is_none() {
            return Err(Error::not_found(format!("Category {} not found", category_id)));
        }

        let assignment = self
            .assignment_for(&CategorizationResult::matched(transaction_id, category_id, 1.0))
            .await?;
        self.transactions
            .update_category_and_status(&[assignment])
            .await?;

        self.transactions
            .get_transaction(transaction_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Transaction {} not found", transaction_id)))
    }

    /// Rebuild category-derived state in every strategy
    pub async fn refresh_rules(&self) -> Result<()> {
        self.categorizer.refresh_rules().await
    }
}

fn descriptor(tx: &Transaction) -> TxDescriptor {
    TxDescriptor {
        id: tx.id,
        description: tx.description.clone(),
        normalized_description: tx.normalized_description.clone(),
        amount: tx.amount,
    }
}
