//! HTTP language model adapters
//!
//! Speaks two wire formats: OpenAI-compatible (`/v1/chat/completions`,
//! `/v1/embeddings`) and Ollama (`/api/generate`, `/api/embed`). Transport
//! and decoding problems surface as `Error::Llm`.

use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{LlmProvider, LlmSettings};
use crate::domain::result::{Error, Result};
use crate::ports::{EmbeddingModel, LlmClient};

/// Shared HTTP plumbing for both capabilities
#[derive(Clone)]
struct Endpoint {
    client: reqwest::Client,
    provider: LlmProvider,
    base_url: String,
    api_key: Option<String>,
}

impl Endpoint {
    fn new(settings: &LlmSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::Config(format!("Cannot build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            provider: settings.provider,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> anyhow::Result<R> {
        let mut request = self.client.post(self.url(path)).json(body);
        if let Some(key) = &self.api_key {
            request = request.header(AUTHORIZATION, format!("Bearer {key}"));
        }

        let resp = request.send().await.with_context(|| format!("request to {}", path))?;
        let status = resp.status();
        if !status.is_success() {
            let txt = resp.text().await.unwrap_or_default();
            bail!("{} returned {}: {}", path, status, txt);
        }
        resp.json().await.with_context(|| format!("decode {} response", path))
    }
}

fn llm_error(e: anyhow::Error) -> Error {
    Error::Llm(format!("{:#}", e))
}

/// Text generation over HTTP
pub struct HttpLlmClient {
    endpoint: Endpoint,
    model: String,
}

impl HttpLlmClient {
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new(settings)?,
            model: settings.model.clone(),
        })
    }

    async fn openai_generate(&self, prompt: &str) -> anyhow::Result<String> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
        }

        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: MsgOut,
        }

        #[derive(Deserialize)]
        struct MsgOut {
            content: Option<String>,
        }

        let body = Req {
            model: &self.model,
            messages: vec![Msg {
                role: "user",
                content: prompt,
            }],
            temperature: 0.0,
        };
        let out: Resp = self.endpoint.post("/v1/chat/completions", &body).await?;
        out.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .context("completion has no content")
    }

    async fn ollama_generate(&self, prompt: &str) -> anyhow::Result<String> {
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            prompt: &'a str,
            stream: bool,
        }

        #[derive(Deserialize)]
        struct Resp {
            response: String,
        }

        let body = Req {
            model: &self.model,
            prompt,
            stream: false,
        };
        let out: Resp = self.endpoint.post("/api/generate", &body).await?;
        Ok(out.response)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(model = %self.model, prompt_chars = prompt.len(), "Sending prompt");
        let response = match self.endpoint.provider {
            LlmProvider::OpenAi => self.openai_generate(prompt).await,
            LlmProvider::Ollama => self.ollama_generate(prompt).await,
        };
        response.map(|s| s.trim().to_string()).map_err(llm_error)
    }
}

/// Text embeddings over HTTP
pub struct HttpEmbeddingModel {
    endpoint: Endpoint,
    model: String,
}

impl HttpEmbeddingModel {
    pub fn new(settings: &LlmSettings, model: impl Into<String>) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new(settings)?,
            model: model.into(),
        })
    }

    async fn openai_embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            input: &'a [String],
        }

        #[derive(Deserialize)]
        struct Resp {
            data: Vec<Item>,
        }

        #[derive(Deserialize)]
        struct Item {
            index: usize,
            embedding: Vec<f32>,
        }

        let body = Req {
            model: &self.model,
            input: texts,
        };
        let mut out: Resp = self.endpoint.post("/v1/embeddings", &body).await?;
        out.data.sort_by_key(|item| item.index);
        Ok(out.data.into_iter().map(|item| item.embedding).collect())
    }

    async fn ollama_embed(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            input: &'a [String],
        }

        #[derive(Deserialize)]
        struct Resp {
            embeddings: Vec<Vec<f32>>,
        }

        let body = Req {
            model: &self.model,
            input: texts,
        };
        let out: Resp = self.endpoint.post("/api/embed", &body).await?;
        Ok(out.embeddings)
    }
}

#[async_trait]
impl EmbeddingModel for HttpEmbeddingModel {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = match self.endpoint.provider {
            LlmProvider::OpenAi => self.openai_embed(texts).await,
            LlmProvider::Ollama => self.ollama_embed(texts).await,
        };
        vectors.map_err(llm_error)
    }
}
