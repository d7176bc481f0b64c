//! Language model ports
//!
//! Both the column normalizer and the LLM categorizer only need plain text
//! generation; the embedding categorizer needs vector embeddings. Vendor
//! specifics live in `adapters::llm`.

use async_trait::async_trait;

use crate::domain::result::Result;

/// Text generation capability
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Model name, for logging
    fn name(&self) -> &str;

    /// Send a prompt, return the raw response text (may contain prose or code fences)
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Text embedding capability
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Embed each text; output has one vector per input, in order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
