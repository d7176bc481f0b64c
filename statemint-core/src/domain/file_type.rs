//! Statement file type detection

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Kind of statement file, decided purely by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FileType {
    Csv,
    Excel,
    Pdf,
    Unknown,
}

impl FileType {
    /// Classify a file by its (case-insensitive) extension. No I/O.
    pub fn from_file_name(file_name: &str) -> Self {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("csv") => FileType::Csv,
            Some("xlsx") | Some("xls") => FileType::Excel,
            Some("pdf") => FileType::Pdf,
            _ => FileType::Unknown,
        }
    }

    /// Stable name used in statement hashes and persisted schemas
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Csv => "CSV",
            FileType::Excel => "EXCEL",
            FileType::Pdf => "PDF",
            FileType::Unknown => "UNKNOWN",
        }
    }

    /// Parse the persisted name back
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "CSV" => FileType::Csv,
            "EXCEL" => FileType::Excel,
            "PDF" => FileType::Pdf,
            _ => FileType::Unknown,
        }
    }

    /// Whether a tabular parser exists for this type
    pub fn is_supported(&self) -> bool {
        matches!(self, FileType::Csv | FileType::Excel)
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
