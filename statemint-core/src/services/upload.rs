//! Upload service - analyze a statement file, then finalize it into transactions
//!
//! `analyze` runs the whole read-only pipeline (detect, parse, resolve schema,
//! clean, build, statistics) and parks the file in the statement store.
//! `finalize` takes the human-confirmed schema, persists it and inserts the
//! transactions that are not already stored for the source.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::builder::build;
use super::cleaner::clean;
use super::logging::{record, LogEvent, LoggingService};
use super::schema_cache::SchemaCache;
use super::statement_store::StatementStore;
use super::statistics::StatementStatistics;
use crate::domain::result::{Error, Result};
use crate::domain::{
    statement_hash, ColumnMapping, ConversionModel, FileType, SchemaUpdate, StatementSchema,
    StatementTransaction, Transaction,
};
use crate::parsers::{parse_statement, parser_for};
use crate::ports::{SourceRepository, StatementSchemaRepository, TransactionRepository};

/// Transactions included in an analysis for review
pub const PREVIEW_ROWS: usize = 20;

/// What analyze found in an uploaded file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub statement_id: Uuid,
    pub file_name: String,
    pub file_type: FileType,
    pub statement_schema: StatementSchema,
    pub cache_hit: bool,
    pub statistics: StatementStatistics,
    pub preview: Vec<StatementTransaction>,
    pub rows_dropped: usize,
}

impl AnalysisResult {
    /// Finalize request that accepts the inferred schema unchanged
    pub fn accept(&self, source_id: i64) -> FinalizeRequest {
        FinalizeRequest {
            statement_id: self.statement_id,
            statement_schema: ConfirmedSchema {
                column_mapping: self.statement_schema.column_mapping.clone(),
                start_row: self.statement_schema.start_row,
                header_row: self.statement_schema.header_row,
                file_type: self.file_type,
                source_id,
            },
        }
    }
}

/// Schema as confirmed (possibly corrected) by the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedSchema {
    pub column_mapping: ColumnMapping,
    pub start_row: usize,
    pub header_row: usize,
    pub file_type: FileType,
    pub source_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizeRequest {
    pub statement_id: Uuid,
    pub statement_schema: ConfirmedSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeResponse {
    pub message: String,
    pub transactions_processed: usize,
    pub transactions: Vec<Transaction>,
    pub skipped_duplicates: usize,
}

/// Analyze and finalize in one go with the inferred schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportResult {
    pub analysis: AnalysisResult,
    pub finalize: FinalizeResponse,
}

pub struct UploadService {
    schema_cache: SchemaCache,
    schemas: Arc<dyn StatementSchemaRepository>,
    transactions: Arc<dyn TransactionRepository>,
    sources: Arc<dyn SourceRepository>,
    store: StatementStore,
    logger: Option<Arc<LoggingService>>,
}

impl UploadService {
    pub fn new(
        schema_cache: SchemaCache,
        schemas: Arc<dyn StatementSchemaRepository>,
        transactions: Arc<dyn TransactionRepository>,
        sources: Arc<dyn SourceRepository>,
        store: StatementStore,
    ) -> Self {
        Self {
            schema_cache,
            schemas,
            transactions,
            sources,
            store,
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: Arc<LoggingService>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub async fn analyze(&self, file_name: &str, bytes: &[u8]) -> Result<AnalysisResult> {
        let (file_type, table) = parse_statement(file_name, bytes)?;
        let (schema, cache_hit) = self.schema_cache.resolve(&table, file_type).await?;

        let cleaned = clean(&table, &schema.conversion_model());
        let built = build(&cleaned);
        let statistics = StatementStatistics::calc(&built.transactions);

        let statement_id = self.store.save(file_name, bytes)?;

        let logger = self.logger.as_deref();
        record(
            logger,
            LogEvent::new(if cache_hit { "schema_cache_hit" } else { "schema_cache_miss" })
                .with_file_type(file_type.as_str()),
        );
        if built.rows_dropped > 0 {
            record(
                logger,
                LogEvent::new("rows_dropped")
                    .with_file_type(file_type.as_str())
                    .with_count(built.rows_dropped),
            );
        }
        record(
            logger,
            LogEvent::new("statement_analyzed")
                .with_file_type(file_type.as_str())
                .with_count(statistics.count),
        );
        info!(
            %statement_id,
            cache_hit,
            transactions = statistics.count,
            rows_dropped = built.rows_dropped,
            "Analyzed statement"
        );

        Ok(AnalysisResult {
            statement_id,
            file_name: file_name.to_string(),
            file_type,
            statement_schema: schema,
            cache_hit,
            statistics,
            preview: built.transactions.into_iter().take(PREVIEW_ROWS).collect(),
            rows_dropped: built.rows_dropped,
        })
    }

    pub async fn finalize(&self, request: &FinalizeRequest) -> Result<FinalizeResponse> {
        let confirmed = &request.statement_schema;
        let source_id = confirmed.source_id;
        if self.sources.get_source(source_id).await?.is_none() {
            return Err(Error::not_found(format!("Source {} not found", source_id)));
        }

        let model = ConversionModel::new(
            confirmed.column_mapping.clone(),
            confirmed.header_row,
            confirmed.start_row,
        )?;

        let stored = self.store.load(request.statement_id)?;
        let table = parser_for(confirmed.file_type)?.parse(&stored.bytes)?;

        self.persist_schema(&model, confirmed.file_type, &table.columns, source_id)
            .await?;

        let built = build(&clean(&table, &model));
        let outcome = self
            .transactions
            .insert_unique(source_id, &built.transactions)
            .await?;

        self.store.remove(request.statement_id)?;

        let inserted = outcome.inserted.len();
        let skipped = outcome.duplicates.len();
        record(
            self.logger.as_deref(),
            LogEvent::new("statement_finalized")
                .with_file_type(confirmed.file_type.as_str())
                .with_count(inserted),
        );
        info!(statement_id = %request.statement_id, inserted, skipped, "Finalized statement");

        Ok(FinalizeResponse {
            message: format!(
                "Imported {} transactions ({} duplicates skipped)",
                inserted, skipped
            ),
            transactions_processed: inserted,
            transactions: outcome.inserted,
            skipped_duplicates: skipped,
        })
    }

    /// Analyze, then finalize with the inferred schema bound to `source_id`
    pub async fn import_file(
        &self,
        file_name: &str,
        bytes: &[u8],
        source_id: i64,
    ) -> Result<ImportResult> {
        let analysis = self.analyze(file_name, bytes).await?;
        let finalize = self.finalize(&analysis.accept(source_id)).await?;
        Ok(ImportResult { analysis, finalize })
    }

    /// Finalize request for a stored upload using the schema analyze resolved
    ///
    /// Analyze saves the schema for the file's shape, so this is a cache
    /// lookup and never calls the LLM twice for the same upload.
    pub async fn inferred_request(
        &self,
        statement_id: Uuid,
        source_id: i64,
    ) -> Result<FinalizeRequest> {
        let stored = self.store.load(statement_id)?;
        let (file_type, table) = parse_statement(&stored.file_name, &stored.bytes)?;
        let (schema, _) = self.schema_cache.resolve(&table, file_type).await?;

        Ok(FinalizeRequest {
            statement_id,
            statement_schema: ConfirmedSchema {
                column_mapping: schema.column_mapping,
                start_row: schema.start_row,
                header_row: schema.header_row,
                file_type,
                source_id,
            },
        })
    }

    /// Update the cached schema for this shape, or save one if none exists yet
    async fn persist_schema(
        &self,
        model: &ConversionModel,
        file_type: FileType,
        column_names: &[String],
        source_id: i64,
    ) -> Result<StatementSchema> {
        let hash = statement_hash(column_names, file_type);
        match self.schemas.find_by_hash(&hash).await? {
            Some(existing) => {
                let update = SchemaUpdate {
                    column_mapping: Some(model.column_map.clone()),
                    header_row: Some(model.header_row),
                    start_row: Some(model.start_row),
                    source_id: Some(source_id),
                };
                self.schemas.update(existing.id, &update).await
            }
            None => {
                let mut schema = StatementSchema::from_model(model, file_type, column_names.to_vec());
                schema.source_id = Some(source_id);
                self.schemas.save(&schema).await?;
                Ok(schema)
            }
        }
    }
}
