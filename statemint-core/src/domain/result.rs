//! Result and error types for the core library

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core library error type
///
/// Row-level parse problems (a bad date or amount in one cell) are never
/// represented here: they degrade to sentinel values and the row is dropped
/// by the builder.
#[derive(Error, Debug)]
pub enum Error {
    /// File extension is not one the pipeline can parse (client error, no retry)
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// LLM output could not be turned into the expected JSON contract.
    /// Retrying the whole inference call may succeed.
    #[error("Invalid LLM response: {0}")]
    InvalidLlmResponse(String),

    /// Transport-level failure talking to the LLM or embedding endpoint
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an invalid LLM response error
    pub fn invalid_llm_response(msg: impl Into<String>) -> Self {
        Self::InvalidLlmResponse(msg.into())
    }

    /// Whether the caller should report this as its own mistake (4xx-style)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedFileType(_) | Self::Validation(_) | Self::NotFound(_)
        )
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Operation result with optional context (for JSON output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            context: None,
        }
    }

    /// Create a failed result
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: None,
        }
    }

    /// Attach a context entry (e.g. the kind of failure)
    pub fn with_context(mut self, key: &str, value: serde_json::Value) -> Self {
        self.context
            .get_or_insert_with(HashMap::new)
            .insert(key.to_string(), value);
        self
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => {
                let client_error = e.is_client_error();
                Self::fail(e.to_string())
                    .with_context("client_error", serde_json::Value::Bool(client_error))
            }
        }
    }
}
