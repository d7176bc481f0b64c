//! Exact match against already categorized transactions

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::TransactionCategorizer;
use crate::domain::result::Result;
use crate::domain::{CategorizationResult, TxDescriptor};
use crate::ports::TransactionRepository;

/// Reuses the category of a previous transaction with the same normalized
/// description. History is re-read on every batch so new categorizations
/// are picked up immediately.
pub struct ExistingTransactionsCategorizer {
    transactions: Arc<dyn TransactionRepository>,
    history_limit: usize,
}

impl ExistingTransactionsCategorizer {
    pub fn new(transactions: Arc<dyn TransactionRepository>, history_limit: usize) -> Self {
        Self {
            transactions,
            history_limit,
        }
    }
}

#[async_trait]
impl TransactionCategorizer for ExistingTransactionsCategorizer {
    fn name(&self) -> &str {
        "existing"
    }

    async fn categorize(&self, transactions: &[TxDescriptor]) -> Result<Vec<CategorizationResult>> {
        let history = self
            .transactions
            .recent_categorized_descriptions(self.history_limit)
            .await?;

        // Most recent first: keep the first category seen per description
        let mut known: HashMap<&str, i64> = HashMap::new();
        for entry in &history {
            known
                .entry(entry.normalized_description.as_str())
                .or_insert(entry.category_id);
        }

        Ok(transactions
            .iter()
            .map(|tx| match known.get(tx.normalized_description.as_str()) {
                Some(category_id) if !tx.normalized_description.is_empty() => {
                    CategorizationResult::matched(tx.id, *category_id, 1.0)
                }
                _ => CategorizationResult::unmatched(tx.id),
            })
            .collect())
    }
}
