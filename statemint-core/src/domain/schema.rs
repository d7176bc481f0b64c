//! Persisted statement schema (cached column mapping per statement shape)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::file_type::FileType;
use super::mapping::{ColumnMapping, ConversionModel};

/// Structural hash of a statement shape
///
/// SHA-256 over the sorted column names joined by `,`, then `|` and the file
/// type name. Column order does not matter; file type does.
pub fn statement_hash(column_names: &[String], file_type: FileType) -> String {
    let mut sorted: Vec<&str> = column_names.iter().map(|c| c.as_str()).collect();
    sorted.sort_unstable();

    let key = format!("{}|{}", sorted.join(","), file_type.as_str());

    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// A column mapping remembered for one statement shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementSchema {
    pub id: Uuid,
    pub statement_hash: String,
    pub column_mapping: ColumnMapping,
    pub header_row: usize,
    pub start_row: usize,
    pub file_type: FileType,
    /// Bound only when a human confirms the mapping during finalize
    pub source_id: Option<i64>,
    pub column_names: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl StatementSchema {
    /// Synthesize a new, unbound schema from a freshly inferred model
    pub fn from_model(
        model: &ConversionModel,
        file_type: FileType,
        column_names: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            statement_hash: statement_hash(&column_names, file_type),
            column_mapping: model.column_map.clone(),
            header_row: model.header_row,
            start_row: model.start_row,
            file_type,
            source_id: None,
            column_names,
            created_at: Utc::now(),
        }
    }

    /// The stored mapping, reused verbatim
    pub fn conversion_model(&self) -> ConversionModel {
        ConversionModel {
            column_map: self.column_mapping.clone(),
            header_row: self.header_row,
            start_row: self.start_row,
        }
    }
}

/// Partial update applied when a mapping is confirmed or adjusted
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaUpdate {
    pub column_mapping: Option<ColumnMapping>,
    pub header_row: Option<usize>,
    pub start_row: Option<usize>,
    pub source_id: Option<i64>,
}

impl SchemaUpdate {
    pub fn apply(&self, schema: &mut StatementSchema) {
        if let Some(mapping) = &self.column_mapping {
            schema.column_mapping = mapping.clone().normalized();
        }
        if let Some(header_row) = self.header_row {
            schema.header_row = header_row;
        }
        if let Some(start_row) = self.start_row {
            schema.start_row = start_row;
        }
        if let Some(source_id) = self.source_id {
            schema.source_id = Some(source_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_hash_ignores_column_order() {
        let a = statement_hash(&cols(&["Date", "Amount", "Memo"]), FileType::Csv);
        let b = statement_hash(&cols(&["Memo", "Date", "Amount"]), FileType::Csv);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_hash_depends_on_file_type() {
        let names = cols(&["Date", "Amount", "Memo"]);
        assert_ne!(
            statement_hash(&names, FileType::Csv),
            statement_hash(&names, FileType::Excel)
        );
    }

    #[test]
    fn test_hash_depends_on_columns() {
        assert_ne!(
            statement_hash(&cols(&["Date", "Amount"]), FileType::Csv),
            statement_hash(&cols(&["Date", "Value"]), FileType::Csv)
        );
    }

    #[test]
    fn test_update_binds_source() {
        let model = ConversionModel::new(ColumnMapping::default(), 0, 1).unwrap();
        let mut schema = StatementSchema::from_model(&model, FileType::Csv, cols(&["Date"]));
        assert!(schema.source_id.is_none());

        SchemaUpdate {
            source_id: Some(7),
            start_row: Some(2),
            ..Default::default()
        }
        .apply(&mut schema);

        assert_eq!(schema.source_id, Some(7));
        assert_eq!(schema.start_row, 2);
        assert_eq!(schema.header_row, 0);
    }
}
