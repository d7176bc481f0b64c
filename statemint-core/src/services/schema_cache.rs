//! Schema cache - reuse inferred mappings for statement shapes seen before

use std::sync::Arc;

use tracing::{debug, info};

use super::normalizer::ColumnNormalizer;
use crate::domain::result::Result;
use crate::domain::{statement_hash, FileType, RawTable, StatementSchema};
use crate::ports::StatementSchemaRepository;

/// Resolves a table to a schema, consulting the repository before the LLM
pub struct SchemaCache {
    repository: Arc<dyn StatementSchemaRepository>,
    normalizer: ColumnNormalizer,
}

impl SchemaCache {
    pub fn new(repository: Arc<dyn StatementSchemaRepository>, normalizer: ColumnNormalizer) -> Self {
        Self {
            repository,
            normalizer,
        }
    }

    /// Cached schema for the table's shape, or a freshly inferred and saved one
    ///
    /// Returns the schema and whether it came from the cache. Two concurrent
    /// misses for the same shape may both save; lookups keep returning the
    /// first-saved row.
    pub async fn resolve(
        &self,
        table: &RawTable,
        file_type: FileType,
    ) -> Result<(StatementSchema, bool)> {
        let hash = statement_hash(&table.columns, file_type);

        if let Some(schema) = self.repository.find_by_hash(&hash).await? {
            debug!(schema_id = %schema.id, "Schema cache hit");
            return Ok((schema, true));
        }

        let model = self.normalizer.normalize(table).await?;
        let schema = StatementSchema::from_model(&model, file_type, table.columns.clone());
        self.repository.save(&schema).await?;
        info!(schema_id = %schema.id, file_type = %file_type, "Saved new statement schema");

        Ok((schema, false))
    }
}
