//! Category names as whole-word patterns

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use super::{RuleCache, TransactionCategorizer};
use crate::domain::result::{Error, Result};
use crate::domain::{leaf_categories, CategorizationResult, TxDescriptor};
use crate::ports::CategoryRepository;

struct Rule {
    category_id: i64,
    pattern: Regex,
}

/// Matches `\b{category name}\b` against the lower-cased description;
/// the first category in tree order wins
pub struct RuleBasedTransactionCategorizer {
    categories: Arc<dyn CategoryRepository>,
    rules: RuleCache<Vec<Rule>>,
}

impl RuleBasedTransactionCategorizer {
    pub fn new(categories: Arc<dyn CategoryRepository>) -> Self {
        Self {
            categories,
            rules: RuleCache::new(),
        }
    }

    async fn rebuild(&self) -> Result<Arc<Vec<Rule>>> {
        let tree = self.categories.get_category_tree().await?;
        let mut rules = Vec::new();
        for category in leaf_categories(&tree) {
            let name = category.short_name().trim().to_lowercase();
            if name.is_empty() {
                continue;
            }
            let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(&name)))
                .map_err(|e| Error::Other(format!("Invalid category pattern: {}", e)))?;
            rules.push(Rule {
                category_id: category.id,
                pattern,
            });
        }
        debug!(rules = rules.len(), "Rebuilt category rules");
        self.rules.set(rules)
    }

    async fn current(&self) -> Result<Arc<Vec<Rule>>> {
        match self.rules.get()? {
            Some(rules) => Ok(rules),
            None => self.rebuild().await,
        }
    }
}

#[async_trait]
impl TransactionCategorizer for RuleBasedTransactionCategorizer {
    fn name(&self) -> &str {
        "rules"
    }

    async fn categorize(&self, transactions: &[TxDescriptor]) -> Result<Vec<CategorizationResult>> {
        let rules = self.current().await?;
        Ok(transactions
            .iter()
            .map(|tx| {
                let description = tx.description.to_lowercase();
                rules
                    .iter()
                    .find(|rule| rule.pattern.is_match(&description))
                    .map(|rule| CategorizationResult::matched(tx.id, rule.category_id, 1.0))
                    .unwrap_or_else(|| CategorizationResult::unmatched(tx.id))
            })
            .collect())
    }

    async fn refresh_rules(&self) -> Result<()> {
        self.rebuild().await.map(|_| ())
    }
}
