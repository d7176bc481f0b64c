//! Excel (xlsx/xls) statement parser

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{Duration, NaiveDate, NaiveDateTime};

use super::StatementParser;
use crate::domain::result::{Error, Result};
use crate::domain::{Cell, RawTable};

/// Reads the first worksheet of a workbook
#[derive(Debug, Default, Clone, Copy)]
pub struct ExcelStatementParser;

impl StatementParser for ExcelStatementParser {
    fn parse(&self, bytes: &[u8]) -> Result<RawTable> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| Error::Parse(format!("Failed to open workbook: {}", e)))?;

        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| Error::Parse("Workbook has no worksheets".to_string()))?
            .map_err(|e| Error::Parse(format!("Failed to read worksheet: {}", e)))?;

        let mut rows = range
            .rows()
            .map(|row| row.iter().map(to_cell).collect::<Vec<Cell>>())
            .filter(|row| !row.iter().all(Cell::is_empty));

        let header: Vec<String> = rows
            .next()
            .ok_or_else(|| Error::Parse("Worksheet is empty".to_string()))?
            .iter()
            .map(Cell::display)
            .collect();

        Ok(RawTable::new(header, rows.collect()))
    }
}

fn to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::from_text(s),
        Data::Float(f) => Cell::Number(*f),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(dt) => excel_serial_to_datetime(dt.as_f64())
            .map(Cell::Date)
            .unwrap_or(Cell::Number(dt.as_f64())),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::from_text(s),
        Data::Error(_) => Cell::Empty,
    }
}

/// Serial of 9999-12-31, the last day Excel can represent
const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

/// Convert an Excel serial day number (1900 date system) to a timestamp
///
/// Values outside Excel's date range (account numbers in a date column,
/// say) give `None` rather than a timestamp.
pub(crate) fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || !(1.0..MAX_EXCEL_SERIAL + 1.0).contains(&serial) {
        return None;
    }
    // Day 0 is 1899-12-30 once the 1900 leap-year bug is accounted for
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let days = serial.trunc() as i64;
    let seconds = ((serial - serial.trunc()) * 86_400.0).round() as i64;
    epoch
        .checked_add_signed(Duration::try_days(days)?)?
        .checked_add_signed(Duration::try_seconds(seconds)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{ExcelDateTime, ExcelDateTimeType};

    #[test]
    fn test_serial_conversion() {
        let dt = excel_serial_to_datetime(44927.0).unwrap();
        assert_eq!(dt.date(), NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());

        let noon = excel_serial_to_datetime(44927.5).unwrap();
        assert_eq!(noon.format("%H:%M").to_string(), "12:00");

        assert!(excel_serial_to_datetime(0.0).is_none());
        assert!(excel_serial_to_datetime(f64::NAN).is_none());

        let last = excel_serial_to_datetime(MAX_EXCEL_SERIAL).unwrap();
        assert_eq!(last.date(), NaiveDate::from_ymd_opt(9999, 12, 31).unwrap());
        assert!(excel_serial_to_datetime(MAX_EXCEL_SERIAL + 1.0).is_none());
        assert!(excel_serial_to_datetime(123_456_789_012_345.0).is_none());
        assert!(excel_serial_to_datetime(f64::MAX).is_none());
    }

    #[test]
    fn test_out_of_range_datetime_cell_kept_as_number() {
        let cell = to_cell(&Data::DateTime(ExcelDateTime::new(
            123_456_789_012_345.0,
            ExcelDateTimeType::DateTime,
            false,
        )));
        assert_eq!(cell, Cell::Number(123_456_789_012_345.0));
    }

    #[test]
    fn test_cell_conversion() {
        assert_eq!(to_cell(&Data::Empty), Cell::Empty);
        assert_eq!(to_cell(&Data::String("  ".into())), Cell::Empty);
        assert_eq!(to_cell(&Data::String("Rent".into())), Cell::Text("Rent".into()));
        assert_eq!(to_cell(&Data::Int(7)), Cell::Number(7.0));
        assert_eq!(to_cell(&Data::Float(-12.5)), Cell::Number(-12.5));
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        let err = ExcelStatementParser.parse(b"definitely not a workbook").unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }
}
