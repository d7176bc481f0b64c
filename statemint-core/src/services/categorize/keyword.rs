//! Keyword table built from category name tokens

use std::sync::Arc;

use async_trait::async_trait;

use super::{RuleCache, TransactionCategorizer};
use crate::domain::result::Result;
use crate::domain::{leaf_categories, normalize_description, CategorizationResult, TxDescriptor};
use crate::ports::CategoryRepository;

/// Shorter tokens ("of", "&", "uk") match too much to be useful
const MIN_KEYWORD_LEN: usize = 3;
const EXACT_CONFIDENCE: f64 = 1.0;
const SUBSTRING_CONFIDENCE: f64 = 0.8;

pub struct KeywordTransactionCategorizer {
    categories: Arc<dyn CategoryRepository>,
    keywords: RuleCache<Vec<(String, i64)>>,
}

impl KeywordTransactionCategorizer {
    pub fn new(categories: Arc<dyn CategoryRepository>) -> Self {
        Self {
            categories,
            keywords: RuleCache::new(),
        }
    }

    async fn rebuild(&self) -> Result<Arc<Vec<(String, i64)>>> {
        let tree = self.categories.get_category_tree().await?;
        let mut keywords = Vec::new();
        for category in leaf_categories(&tree) {
            for token in normalize_description(category.short_name()).split_whitespace() {
                if token.chars().count() >= MIN_KEYWORD_LEN {
                    keywords.push((token.to_string(), category.id));
                }
            }
        }
        self.keywords.set(keywords)
    }

    async fn current(&self) -> Result<Arc<Vec<(String, i64)>>> {
        match self.keywords.get()? {
            Some(keywords) => Ok(keywords),
            None => self.rebuild().await,
        }
    }
}

fn best_match(keywords: &[(String, i64)], normalized: &str) -> Option<(i64, f64)> {
    let tokens: Vec<&str> = normalized.split_whitespace().collect();

    let exact = keywords
        .iter()
        .find(|(keyword, _)| tokens.iter().any(|t| *t == keyword.as_str()))
        .map(|(_, id)| (*id, EXACT_CONFIDENCE));

    exact.or_else(|| {
        keywords
            .iter()
            .find(|(keyword, _)| tokens.iter().any(|t| t.contains(keyword.as_str())))
            .map(|(_, id)| (*id, SUBSTRING_CONFIDENCE))
    })
}

#[async_trait]
impl TransactionCategorizer for KeywordTransactionCategorizer {
    fn name(&self) -> &str {
        "keyword"
    }

    async fn categorize(&self, transactions: &[TxDescriptor]) -> Result<Vec<CategorizationResult>> {
        let keywords = self.current().await?;
        Ok(transactions
            .iter()
            .map(|tx| match best_match(&keywords, &tx.normalized_description) {
                Some((category_id, confidence)) => {
                    CategorizationResult::matched(tx.id, category_id, confidence)
                }
                None => CategorizationResult::unmatched(tx.id),
            })
            .collect())
    }

    async fn refresh_rules(&self) -> Result<()> {
        self.rebuild().await.map(|_| ())
    }
}
