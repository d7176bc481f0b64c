//! Statemint Core - bank statement ingestion and categorization
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core entities (RawTable, StatementSchema, Transaction, Category, ...)
//! - **ports**: Trait definitions for external dependencies (repositories, LLM)
//! - **parsers**: CSV and Excel statement parsers
//! - **services**: The statement pipeline and categorization orchestration
//! - **adapters**: Concrete implementations (DuckDB, HTTP LLM clients)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod parsers;
pub mod ports;
pub mod services;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;

use adapters::duckdb::DuckDbRepository;
use adapters::llm::{HttpEmbeddingModel, HttpLlmClient};
use config::Config;
use ports::{EmbeddingModel, LlmClient};
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, OperationResult, Result};
pub use domain::{
    Category, CategoryNode, ColumnMapping, FileType, Source, StatementSchema,
    StatementTransaction, Transaction,
};
pub use services::{EntryPoint, LogEvent, LoggingService};

/// Environment variable overriding the data directory
pub const DATA_DIR_ENV: &str = "STATEMINT_DIR";

/// Main context for Statemint operations
///
/// Holds the database, configuration and all services. Everything lives in
/// one data directory: `statemint.duckdb`, `logs.duckdb`, `settings.json`
/// and the `statements/` upload store.
pub struct StatemintContext {
    pub data_dir: PathBuf,
    pub config: Config,
    pub repository: Arc<DuckDbRepository>,
    pub logger: Option<Arc<LoggingService>>,
    pub upload_service: UploadService,
    pub categorization_service: CategorizationService,
    pub category_service: CategoryService,
    pub status_service: StatusService,
}

impl StatemintContext {
    /// Open the data directory and wire the HTTP model adapters from config
    pub fn new(data_dir: &Path, entry_point: EntryPoint) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let logger = open_event_log(data_dir, entry_point);
        Self::with_logger(data_dir, logger)
    }

    /// Like `new`, sharing an event log the caller already opened
    pub fn with_logger(data_dir: &Path, logger: Option<Arc<LoggingService>>) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let config = Config::load(data_dir)?;

        let llm: Arc<dyn LlmClient> = Arc::new(HttpLlmClient::new(&config.llm)?);
        let embeddings: Option<Arc<dyn EmbeddingModel>> = match &config.llm.embedding_model {
            Some(model) => Some(Arc::new(HttpEmbeddingModel::new(&config.llm, model.clone())?)),
            None => None,
        };

        Self::with_components(data_dir, config, llm, embeddings, logger)
    }

    /// Wire services over explicit model ports
    pub fn with_components(
        data_dir: &Path,
        config: Config,
        llm: Arc<dyn LlmClient>,
        embeddings: Option<Arc<dyn EmbeddingModel>>,
        logger: Option<Arc<LoggingService>>,
    ) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let repository = Arc::new(DuckDbRepository::new(&data_dir.join("statemint.duckdb"))?);

        let normalizer = ColumnNormalizer::new(Arc::clone(&llm))
            .with_max_prompt_rows(config.ingest.max_prompt_rows);
        let schema_cache = SchemaCache::new(repository.clone(), normalizer);
        let store = StatementStore::new(data_dir.join("statements"));
        let mut upload_service = UploadService::new(
            schema_cache,
            repository.clone(),
            repository.clone(),
            repository.clone(),
            store,
        );

        let chain: Arc<dyn TransactionCategorizer> = Arc::new(build_chain(
            &config.categorization,
            ChainDependencies {
                transactions: repository.clone(),
                categories: repository.clone(),
                llm: Some(llm),
                embeddings,
            },
        )?);
        let mut categorization_service = CategorizationService::new(
            repository.clone(),
            repository.clone(),
            Arc::clone(&chain),
            config.categorization.batch_size,
        );
        let category_service = CategoryService::new(repository.clone(), Some(chain));
        let status_service =
            StatusService::new(repository.clone(), repository.clone(), repository.clone());

        if let Some(logger) = &logger {
            upload_service = upload_service.with_logger(Arc::clone(logger));
            categorization_service = categorization_service.with_logger(Arc::clone(logger));
        }

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            config,
            repository,
            logger,
            upload_service,
            categorization_service,
            category_service,
            status_service,
        })
    }

    /// Record an event in the event log, if one is open
    pub fn log_event(&self, event: LogEvent) {
        if let Some(logger) = &self.logger {
            logger.record(event);
        }
    }
}

/// Open `logs.duckdb` in the data directory
///
/// The event log is best-effort; a broken log database must not block imports.
pub fn open_event_log(data_dir: &Path, entry_point: EntryPoint) -> Option<Arc<LoggingService>> {
    match LoggingService::new(data_dir, entry_point, env!("CARGO_PKG_VERSION")) {
        Ok(logger) => Some(Arc::new(logger)),
        Err(e) => {
            warn!(error = %e, "Event log unavailable");
            None
        }
    }
}
