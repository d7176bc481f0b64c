//! Configuration management
//!
//! Settings live in `settings.json` in the data directory:
//! ```json
//! {
//!   "llm": { "provider": "ollama", "baseUrl": "http://localhost:11434", "model": "llama3.1" },
//!   "ingest": { "maxPromptRows": 50 },
//!   "categorization": { "strategies": ["existing", "rules", "llm"], "minConfidence": 0.6 }
//! }
//! ```
//! Keys this crate does not know about are preserved on save.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::result::Result;

pub const ENV_LLM_BASE_URL: &str = "STATEMINT_LLM_BASE_URL";
pub const ENV_LLM_MODEL: &str = "STATEMINT_LLM_MODEL";
pub const ENV_LLM_API_KEY: &str = "STATEMINT_LLM_API_KEY";

/// Wire format spoken by the LLM endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// `/v1/chat/completions` and `/v1/embeddings`
    OpenAi,
    /// `/api/generate` and `/api/embed`
    #[default]
    Ollama,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmSettings {
    #[serde(default)]
    pub provider: LlmProvider,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Enables the embedding categorizer when set
    #[serde(default)]
    pub embedding_model: Option<String>,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: LlmProvider::default(),
            base_url: default_base_url(),
            model: default_model(),
            embedding_model: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LlmSettings {
    /// API key from `STATEMINT_LLM_API_KEY`, falling back to `api_key_env`
    pub fn api_key(&self) -> Option<String> {
        std::env::var(ENV_LLM_API_KEY)
            .ok()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|k| !k.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSettings {
    /// Data rows shown to the model when inferring a layout
    #[serde(default = "default_max_prompt_rows")]
    pub max_prompt_rows: usize,
}

fn default_max_prompt_rows() -> usize {
    50
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            max_prompt_rows: default_max_prompt_rows(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorizationSettings {
    /// Strategy names in priority order: existing, embedding, rules, keyword, llm
    #[serde(default = "default_strategies")]
    pub strategies: Vec<String>,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Results below this confidence fall through to the next strategy
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_strategies() -> Vec<String> {
    ["existing", "embedding", "rules", "keyword", "llm"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_history_limit() -> usize {
    1000
}

fn default_min_confidence() -> f64 {
    0.6
}

fn default_batch_size() -> usize {
    50
}

impl Default for CategorizationSettings {
    fn default() -> Self {
        Self {
            strategies: default_strategies(),
            history_limit: default_history_limit(),
            min_confidence: default_min_confidence(),
            batch_size: default_batch_size(),
        }
    }
}

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    llm: LlmSettings,
    #[serde(default)]
    ingest: IngestSettings,
    #[serde(default)]
    categorization: CategorizationSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Statemint configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub llm: LlmSettings,
    pub ingest: IngestSettings,
    pub categorization: CategorizationSettings,
}

impl Config {
    /// Load config from the data directory, then apply environment overrides
    pub fn load(data_dir: &Path) -> Result<Self> {
        let mut config = Self::from_file(data_dir)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(data_dir: &Path) -> Result<Self> {
        let raw = read_settings(&data_dir.join("settings.json"))?;
        Ok(Self {
            llm: raw.llm,
            ingest: raw.ingest,
            categorization: raw.categorization,
        })
    }

    /// Apply `STATEMINT_LLM_*` overrides from a variable lookup
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_LLM_BASE_URL).filter(|v| !v.is_empty()) {
            self.llm.base_url = url;
        }
        if let Some(model) = lookup(ENV_LLM_MODEL).filter(|v| !v.is_empty()) {
            self.llm.model = model;
        }
    }

    /// Save config, preserving settings this crate does not manage
    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let settings_path = data_dir.join("settings.json");
        let mut settings = read_settings(&settings_path)?;

        settings.llm = self.llm.clone();
        settings.ingest = self.ingest.clone();
        settings.categorization = self.categorization.clone();

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)?;
        Ok(())
    }
}

fn read_settings(path: &Path) -> Result<SettingsFile> {
    if !path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "Ignoring malformed settings file");
        SettingsFile::default()
    }))
}
