//! Statement parsers: raw file bytes -> `RawTable`
//!
//! Parsers do not interpret the layout. Metadata lines above the real
//! header stay in the table as data rows; the column normalizer decides where
//! the header is.

mod csv_parser;
mod excel_parser;

pub use csv_parser::CsvStatementParser;
pub use excel_parser::ExcelStatementParser;
pub(crate) use excel_parser::excel_serial_to_datetime;

use crate::domain::result::{Error, Result};
use crate::domain::{FileType, RawTable};

/// Parses one file format into a generic table
pub trait StatementParser: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> Result<RawTable>;
}

/// Pick the parser for a detected file type
pub fn parser_for(file_type: FileType) -> Result<Box<dyn StatementParser>> {
    match file_type {
        FileType::Csv => Ok(Box::new(CsvStatementParser::default())),
        FileType::Excel => Ok(Box::new(ExcelStatementParser)),
        other => Err(Error::UnsupportedFileType(format!(
            "{} files cannot be imported (supported: csv, xlsx, xls)",
            other
        ))),
    }
}

/// Detect the type from the file name and parse in one step
pub fn parse_statement(file_name: &str, bytes: &[u8]) -> Result<(FileType, RawTable)> {
    let file_type = FileType::from_file_name(file_name);
    let table = parser_for(file_type)?.parse(bytes)?;
    Ok((file_type, table))
}
