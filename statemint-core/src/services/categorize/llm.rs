//! One LLM prompt per batch, answered as a JSON array of assignments

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use super::TransactionCategorizer;
use crate::domain::result::{Error, Result};
use crate::domain::{leaf_categories, CategorizationResult, Category, TxDescriptor};
use crate::ports::{CategoryRepository, LlmClient};
use crate::services::json_extract::extract_json_array;

#[derive(Debug, Deserialize)]
struct Assignment {
    transaction_id: Uuid,
    category_id: Option<i64>,
    #[serde(default)]
    confidence: f64,
}

pub struct LlmTransactionCategorizer {
    llm: Arc<dyn LlmClient>,
    categories: Arc<dyn CategoryRepository>,
}

impl LlmTransactionCategorizer {
    pub fn new(llm: Arc<dyn LlmClient>, categories: Arc<dyn CategoryRepository>) -> Self {
        Self { llm, categories }
    }
}

fn build_prompt(leaves: &[Category], transactions: &[TxDescriptor]) -> String {
    let category_lines: Vec<String> = leaves
        .iter()
        .map(|c| match &c.description {
            Some(d) if !d.trim().is_empty() => format!("{}: {} ({})", c.id, c.category_name, d.trim()),
            _ => format!("{}: {}", c.id, c.category_name),
        })
        .collect();
    let transaction_lines: Vec<String> = transactions
        .iter()
        .map(|t| format!("{} | {} | {}", t.id, t.description, t.amount))
        .collect();

    format!(
        r#"Assign each bank transaction to one spending category.

Categories (id: name):
{categories}

Transactions (id | description | amount, negative is money out):
{transactions}

Respond with a JSON array only, one element per transaction:
[{{"transaction_id": "<id>", "category_id": <category id or null>, "confidence": <0.0 to 1.0>}}]
Use null when no category fits. Only use the category ids listed above."#,
        categories = category_lines.join("\n"),
        transactions = transaction_lines.join("\n"),
    )
}

/// Typed assignments from a model answer; anything but a well-formed array is an error
fn parse_assignments(response: &str) -> Result<Vec<Assignment>> {
    let items = extract_json_array(response)
        .ok_or_else(|| Error::invalid_llm_response("no JSON array in categorization response"))?;
    serde_json::from_value(serde_json::Value::Array(items))
        .map_err(|e| Error::invalid_llm_response(format!("malformed categorization: {}", e)))
}

#[async_trait]
impl TransactionCategorizer for LlmTransactionCategorizer {
    fn name(&self) -> &str {
        "llm"
    }

    async fn categorize(&self, transactions: &[TxDescriptor]) -> Result<Vec<CategorizationResult>> {
        let leaves = leaf_categories(&self.categories.get_category_tree().await?);
        if leaves.is_empty() || transactions.is_empty() {
            return Ok(transactions
                .iter()
                .map(|tx| CategorizationResult::unmatched(tx.id))
                .collect());
        }

        let prompt = build_prompt(&leaves, transactions);
        debug!(model = self.llm.name(), batch = transactions.len(), "Requesting categories");
        let response = self.llm.generate(&prompt).await?;
        let assignments = parse_assignments(&response)?;

        let valid_categories: HashSet<i64> = leaves.iter().map(|c| c.id).collect();
        let mut by_tx: HashMap<Uuid, (i64, f64)> = HashMap::new();
        for a in assignments {
            match a.category_id {
                Some(id) if valid_categories.contains(&id) => {
                    by_tx.entry(a.transaction_id).or_insert((id, a.confidence));
                }
                Some(id) => warn!(category_id = id, "LLM answered with an unknown category"),
                None => {}
            }
        }

        Ok(transactions
            .iter()
            .map(|tx| match by_tx.get(&tx.id) {
                Some((category_id, confidence)) => {
                    CategorizationResult::matched(tx.id, *category_id, *confidence)
                }
                None => CategorizationResult::unmatched(tx.id),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use std::sync::Mutex;

    /// Answers with a closure over the prompt's transaction ids
    struct EchoLlm {
        reply: Box<dyn Fn(&[Uuid]) -> String + Send + Sync>,
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmClient for EchoLlm {
        fn name(&self) -> &str {
            "echo"
        }

        async fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let ids: Vec<Uuid> = prompt
                .lines()
                .filter_map(|l| l.split(" | ").next())
                .filter_map(|s| Uuid::parse_str(s).ok())
                .collect();
            Ok((self.reply)(&ids))
        }
    }

    fn make(reply: impl Fn(&[Uuid]) -> String + Send + Sync + 'static) -> (Arc<EchoLlm>, LlmTransactionCategorizer) {
        let llm = Arc::new(EchoLlm {
            reply: Box::new(reply),
            prompts: Mutex::new(Vec::new()),
        });
        let categorizer = LlmTransactionCategorizer::new(
            llm.clone(),
            Arc::new(StaticCategories { tree: sample_tree() }),
        );
        (llm, categorizer)
    }

    #[tokio::test]
    async fn test_assignments_applied() {
        let (llm, categorizer) = make(|ids| {
            format!(
                "```json\n[{{\"transaction_id\": \"{}\", \"category_id\": 5, \"confidence\": 0.85}}, {{\"transaction_id\": \"{}\", \"category_id\": null, \"confidence\": 0}}]\n```",
                ids[0], ids[1]
            )
        });
        let txs = vec![tx("SHELL 1234"), tx("ODD THING")];
        let results = categorizer.categorize(&txs).await.unwrap();

        assert_eq!(results[0].category_id, Some(5));
        assert_eq!(results[0].confidence, 0.85);
        assert!(!results[1].is_match());

        let prompts = llm.prompts.lock().unwrap();
        let prompt = &prompts[0];
        assert!(prompt.contains("5: Transport: Fuel"));
        assert!(prompt.contains("SHELL 1234"));
    }

    #[tokio::test]
    async fn test_unknown_ids_ignored() {
        let (_, categorizer) = make(|ids| {
            format!(
                r#"[{{"transaction_id": "{}", "category_id": 999, "confidence": 0.9}}, {{"transaction_id": "{}", "category_id": 2, "confidence": 0.9}}]"#,
                ids[0],
                Uuid::new_v4()
            )
        });
        let results = categorizer.categorize(&[tx("X")]).await.unwrap();
        assert!(!results[0].is_match());
    }

    #[tokio::test]
    async fn test_unparseable_response_fails_batch() {
        let (_, categorizer) = make(|_| "I think these are groceries.".to_string());
        let err = categorizer.categorize(&[tx("X")]).await.unwrap_err();
        assert!(matches!(err, Error::InvalidLlmResponse(_)));

        let (_, categorizer) = categorizer_with_object();
        assert!(categorizer.categorize(&[tx("X")]).await.is_err());
    }

    fn categorizer_with_object() -> (Arc<EchoLlm>, LlmTransactionCategorizer) {
        make(|_| r#"{"transaction_id": "nope"}"#.to_string())
    }
}
