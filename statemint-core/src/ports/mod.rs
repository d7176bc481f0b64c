//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The core domain
//! depends only on these traits, not on concrete implementations.

mod llm;
mod repository;

pub use llm::{EmbeddingModel, LlmClient};
pub use repository::{
    CategoryAssignment, CategoryRepository, HistoricalCategorization, InsertOutcome,
    SourceRepository, StatementSchemaRepository, StatusCounts, TransactionRepository,
};
