//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the repository ports
//! - HTTP (OpenAI-compatible or Ollama) for the LLM and embedding ports

pub mod duckdb;
pub mod llm;
