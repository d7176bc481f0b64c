//! CSV statement parser

use csv::ReaderBuilder;

use super::StatementParser;
use crate::domain::result::{Error, Result};
use crate::domain::{Cell, RawTable};

const CANDIDATE_DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Reads delimited text. Rows may have differing widths (bank exports often
/// start with a few metadata lines); invalid UTF-8 is replaced rather than fatal.
#[derive(Debug, Default, Clone)]
pub struct CsvStatementParser {
    /// Fixed delimiter; sniffed from the first lines when `None`
    pub delimiter: Option<u8>,
}

impl CsvStatementParser {
    pub fn with_delimiter(delimiter: u8) -> Self {
        Self {
            delimiter: Some(delimiter),
        }
    }
}

impl StatementParser for CsvStatementParser {
    fn parse(&self, bytes: &[u8]) -> Result<RawTable> {
        let delimiter = self.delimiter.unwrap_or_else(|| sniff_delimiter(bytes));

        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(bytes);

        let mut records: Vec<Vec<String>> = Vec::new();
        for result in reader.byte_records() {
            let record = result.map_err(|e| Error::Parse(format!("Failed to read CSV: {}", e)))?;
            let fields: Vec<String> = record
                .iter()
                .map(|f| String::from_utf8_lossy(f).into_owned())
                .collect();
            if fields.iter().all(|f| f.trim().is_empty()) {
                continue;
            }
            records.push(fields);
        }

        let mut iter = records.into_iter();
        let header = iter
            .next()
            .ok_or_else(|| Error::Parse("CSV file is empty".to_string()))?;
        let rows = iter
            .map(|fields| fields.iter().map(|f| Cell::from_text(f)).collect())
            .collect();

        Ok(RawTable::new(header, rows))
    }
}

/// Pick the candidate delimiter that appears most often in the first lines
fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let sample: Vec<&[u8]> = bytes
        .split(|b| *b == b'\n')
        .filter(|line| !line.iter().all(|b| b.is_ascii_whitespace()))
        .take(10)
        .collect();

    CANDIDATE_DELIMITERS
        .iter()
        .copied()
        .map(|d| {
            let count: usize = sample
                .iter()
                .map(|line| line.iter().filter(|b| **b == d).count())
                .sum();
            (d, count)
        })
        .max_by_key(|(d, count)| (*count, *d == b','))
        .filter(|(_, count)| *count > 0)
        .map(|(d, _)| d)
        .unwrap_or(b',')
}
