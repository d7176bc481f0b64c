//! Cosine similarity between transaction and category embeddings

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{RuleCache, TransactionCategorizer};
use crate::domain::result::{Error, Result};
use crate::domain::{leaf_categories, CategorizationResult, TxDescriptor};
use crate::ports::{CategoryRepository, EmbeddingModel};

struct CategoryVector {
    category_id: i64,
    vector: Vec<f32>,
}

/// Picks the leaf category whose embedding is closest to the description.
/// Category embeddings are computed once and reused until `refresh_rules`.
pub struct EmbeddingTransactionCategorizer {
    model: Arc<dyn EmbeddingModel>,
    categories: Arc<dyn CategoryRepository>,
    vectors: RuleCache<Vec<CategoryVector>>,
}

impl EmbeddingTransactionCategorizer {
    pub fn new(model: Arc<dyn EmbeddingModel>, categories: Arc<dyn CategoryRepository>) -> Self {
        Self {
            model,
            categories,
            vectors: RuleCache::new(),
        }
    }

    async fn rebuild(&self) -> Result<Arc<Vec<CategoryVector>>> {
        let leaves = leaf_categories(&self.categories.get_category_tree().await?);
        if leaves.is_empty() {
            return self.vectors.set(Vec::new());
        }

        let texts: Vec<String> = leaves
            .iter()
            .map(|c| match &c.description {
                Some(d) if !d.trim().is_empty() => format!("{} - {}", c.category_name, d.trim()),
                _ => c.category_name.clone(),
            })
            .collect();
        let embedded = self.embed_checked(&texts).await?;

        let vectors = leaves
            .iter()
            .zip(embedded)
            .map(|(c, vector)| CategoryVector {
                category_id: c.id,
                vector,
            })
            .collect::<Vec<_>>();
        debug!(categories = vectors.len(), "Embedded categories");
        self.vectors.set(vectors)
    }

    async fn current(&self) -> Result<Arc<Vec<CategoryVector>>> {
        match self.vectors.get()? {
            Some(vectors) => Ok(vectors),
            None => self.rebuild().await,
        }
    }

    async fn embed_checked(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let vectors = self.model.embed(texts).await?;
        if vectors.len() != texts.len() {
            return Err(Error::Llm(format!(
                "Embedding model returned {} vectors for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }
        Ok(vectors)
    }
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[async_trait]
impl TransactionCategorizer for EmbeddingTransactionCategorizer {
    fn name(&self) -> &str {
        "embedding"
    }

    async fn categorize(&self, transactions: &[TxDescriptor]) -> Result<Vec<CategorizationResult>> {
        let categories = self.current().await?;
        if categories.is_empty() || transactions.is_empty() {
            return Ok(transactions
                .iter()
                .map(|tx| CategorizationResult::unmatched(tx.id))
                .collect());
        }

        let texts: Vec<String> = transactions.iter().map(|t| t.description.clone()).collect();
        let embedded = self.embed_checked(&texts).await?;

        Ok(transactions
            .iter()
            .zip(embedded)
            .map(|(tx, vector)| {
                categories
                    .iter()
                    .map(|c| (c.category_id, cosine_similarity(&vector, &c.vector)))
                    .max_by(|a, b| a.1.total_cmp(&b.1))
                    .filter(|(_, similarity)| *similarity > 0.0)
                    .map(|(id, similarity)| CategorizationResult::matched(tx.id, id, similarity))
                    .unwrap_or_else(|| CategorizationResult::unmatched(tx.id))
            })
            .collect())
    }

    async fn refresh_rules(&self) -> Result<()> {
        self.rebuild().await.map(|_| ())
    }
}
