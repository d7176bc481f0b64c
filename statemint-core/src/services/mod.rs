//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. The statement
//! pipeline is split into small stages (normalizer, schema cache, cleaner,
//! builder, statistics) that `UploadService` strings together.

pub mod builder;
pub mod categorize;
mod category;
pub mod cleaner;
pub mod json_extract;
pub mod logging;
pub mod migration;
pub mod normalizer;
pub mod parsing;
pub mod schema_cache;
pub mod statement_store;
pub mod statistics;
mod status;
pub mod upload;

pub use builder::{build, BuildOutcome};
pub use categorize::{
    build_chain, CategorizationService, CategorizationSummary, ChainDependencies, FallbackChain,
    TransactionCategorizer,
};
pub use category::CategoryService;
pub use cleaner::{clean, CleanedTable};
pub use json_extract::{extract_json, extract_json_array, extract_json_object};
pub use logging::{EntryPoint, LogEntry, LogEvent, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use normalizer::ColumnNormalizer;
pub use schema_cache::SchemaCache;
pub use statement_store::{StatementStore, StoredStatement};
pub use statistics::StatementStatistics;
pub use status::{StatusService, StatusSummary};
pub use upload::{
    AnalysisResult, ConfirmedSchema, FinalizeRequest, FinalizeResponse, ImportResult,
    UploadService,
};
