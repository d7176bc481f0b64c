//! Transaction categorization strategies
//!
//! Every strategy implements [`TransactionCategorizer`]. A [`FallbackChain`]
//! runs them in priority order and only forwards what a link could not
//! categorize with enough confidence.

mod embedding;
mod existing;
mod keyword;
mod llm;
mod rule;
mod service;

pub use embedding::EmbeddingTransactionCategorizer;
pub use existing::ExistingTransactionsCategorizer;
pub use keyword::KeywordTransactionCategorizer;
pub use llm::LlmTransactionCategorizer;
pub use rule::RuleBasedTransactionCategorizer;
pub use service::{CategorizationService, CategorizationSummary};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::CategorizationSettings;
use crate::domain::result::{Error, Result};
use crate::domain::{CategorizationResult, TxDescriptor};
use crate::ports::{CategoryRepository, EmbeddingModel, LlmClient, TransactionRepository};

#[async_trait]
pub trait TransactionCategorizer: Send + Sync {
    /// Strategy name, for logs and config
    fn name(&self) -> &str;

    /// One result per input transaction; unknown ones come back unmatched
    async fn categorize(&self, transactions: &[TxDescriptor]) -> Result<Vec<CategorizationResult>>;

    /// Rebuild anything derived from the category tree
    async fn refresh_rules(&self) -> Result<()> {
        Ok(())
    }
}

/// Runs categorizers in order, forwarding unmatched and low-confidence
/// transactions to the next one
pub struct FallbackChain {
    links: Vec<Arc<dyn TransactionCategorizer>>,
    min_confidence: f64,
}

impl FallbackChain {
    pub fn new(links: Vec<Arc<dyn TransactionCategorizer>>, min_confidence: f64) -> Self {
        Self {
            links,
            min_confidence,
        }
    }

    pub fn link_names(&self) -> Vec<&str> {
        self.links.iter().map(|l| l.name()).collect()
    }

    fn accepts(&self, result: &CategorizationResult) -> bool {
        result.is_match() && result.confidence >= self.min_confidence
    }
}

#[async_trait]
impl TransactionCategorizer for FallbackChain {
    fn name(&self) -> &str {
        "chain"
    }

    async fn categorize(&self, transactions: &[TxDescriptor]) -> Result<Vec<CategorizationResult>> {
        let mut accepted: HashMap<Uuid, CategorizationResult> = HashMap::new();
        let mut remaining: Vec<TxDescriptor> = transactions.to_vec();

        for link in &self.links {
            if remaining.is_empty() {
                break;
            }
            let results = link.categorize(&remaining).await?;
            let before = remaining.len();

            let mut by_id: HashMap<Uuid, CategorizationResult> =
                results.into_iter().map(|r| (r.id, r)).collect();
            remaining.retain(|tx| match by_id.remove(&tx.id) {
                Some(result) if self.accepts(&result) => {
                    accepted.insert(tx.id, result);
                    false
                }
                _ => true,
            });

            debug!(
                strategy = link.name(),
                matched = before - remaining.len(),
                forwarded = remaining.len(),
                "Categorizer link finished"
            );
        }

        Ok(transactions
            .iter()
            .map(|tx| {
                accepted
                    .remove(&tx.id)
                    .unwrap_or_else(|| CategorizationResult::unmatched(tx.id))
            })
            .collect())
    }

    async fn refresh_rules(&self) -> Result<()> {
        for link in &self.links {
            link.refresh_rules().await?;
        }
        Ok(())
    }
}

/// Lazily built, explicitly refreshed state derived from the category tree
pub(crate) struct RuleCache<T> {
    inner: RwLock<Option<Arc<T>>>,
}

impl<T> RuleCache<T> {
    pub(crate) fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    pub(crate) fn get(&self) -> Result<Option<Arc<T>>> {
        self.inner
            .read()
            .map(|guard| guard.clone())
            .map_err(|e| Error::Other(format!("Rule cache poisoned: {}", e)))
    }

    pub(crate) fn set(&self, value: T) -> Result<Arc<T>> {
        let value = Arc::new(value);
        let mut guard = self
            .inner
            .write()
            .map_err(|e| Error::Other(format!("Rule cache poisoned: {}", e)))?;
        *guard = Some(Arc::clone(&value));
        Ok(value)
    }
}

/// Dependencies strategies may need
pub struct ChainDependencies {
    pub transactions: Arc<dyn TransactionRepository>,
    pub categories: Arc<dyn CategoryRepository>,
    pub llm: Option<Arc<dyn LlmClient>>,
    pub embeddings: Option<Arc<dyn EmbeddingModel>>,
}

/// Build the configured strategy chain
///
/// Strategies whose backing model is not configured are skipped with a
/// warning; unknown strategy names are a configuration error.
pub fn build_chain(settings: &CategorizationSettings, deps: ChainDependencies) -> Result<FallbackChain> {
    let mut links: Vec<Arc<dyn TransactionCategorizer>> = Vec::new();

    for name in &settings.strategies {
        match name.as_str() {
            "existing" => links.push(Arc::new(ExistingTransactionsCategorizer::new(
                Arc::clone(&deps.transactions),
                settings.history_limit,
            ))),
            "embedding" => match &deps.embeddings {
                Some(model) => links.push(Arc::new(EmbeddingTransactionCategorizer::new(
                    Arc::clone(model),
                    Arc::clone(&deps.categories),
                ))),
                None => warn!("No embedding model configured, skipping embedding categorizer"),
            },
            "rules" => links.push(Arc::new(RuleBasedTransactionCategorizer::new(Arc::clone(
                &deps.categories,
            )))),
            "keyword" => links.push(Arc::new(KeywordTransactionCategorizer::new(Arc::clone(
                &deps.categories,
            )))),
            "llm" => match &deps.llm {
                Some(llm) => links.push(Arc::new(LlmTransactionCategorizer::new(
                    Arc::clone(llm),
                    Arc::clone(&deps.categories),
                ))),
                None => warn!("No LLM configured, skipping LLM categorizer"),
            },
            other => {
                return Err(Error::Config(format!(
                    "Unknown categorization strategy '{}' (expected existing, embedding, rules, keyword or llm)",
                    other
                )))
            }
        }
    }

    Ok(FallbackChain::new(links, settings.min_confidence))
}
