//! Transactions cleaner - applies a conversion model to a raw table
//!
//! Cleaning runs as a sequence of small frame transformations:
//! slice -> fuse debit/credit -> rename -> add missing -> normalize values.
//! No step fails on bad cell content; unreadable values become missing.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use super::parsing::{cell_to_amount, cell_to_date, cell_to_text};
use crate::domain::{
    unique_column_names, CanonicalField, Cell, ColumnMapping, ConversionModel, RawTable,
};

/// Working table between cleaning steps
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Frame {
    fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().rposition(|c| c == name)
    }

    fn drop_columns(&mut self, indices: &[usize]) {
        let keep: Vec<bool> = (0..self.columns.len())
            .map(|i| !indices.contains(&i))
            .collect();
        let mut k = keep.iter();
        self.columns.retain(|_| *k.next().unwrap_or(&true));
        for row in &mut self.rows {
            let mut k = keep.iter();
            row.retain(|_| *k.next().unwrap_or(&true));
        }
    }

    fn push_column(&mut self, name: &str, values: Vec<Cell>) {
        self.columns.push(name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
    }
}

/// Amount state after normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanAmount {
    Value(Decimal),
    /// Cell was empty or the column does not exist
    Missing,
    /// Cell had content that is not a number
    Invalid,
}

impl CleanAmount {
    pub fn value(&self) -> Option<Decimal> {
        match self {
            CleanAmount::Value(v) => Some(*v),
            _ => None,
        }
    }
}

/// One row in canonical shape
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedRow {
    pub date: Option<NaiveDate>,
    pub description: String,
    pub amount: CleanAmount,
    pub currency: String,
    pub balance: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CleanedTable {
    pub rows: Vec<CleanedRow>,
}

/// Run every cleaning step for one table
pub fn clean(table: &RawTable, model: &ConversionModel) -> CleanedTable {
    let frame = slice_rows(table, model.header_row, model.start_row);
    let frame = fuse_debit_credit(frame, &model.column_map);
    let frame = rename_columns(frame, &model.column_map);
    let frame = add_missing_columns(frame);
    normalize_values(&frame)
}

/// Take the header from `header_row` and data from `start_row` onward
///
/// Row 0 is the table's own first line; row `n > 0` is `table.rows[n - 1]`.
pub fn slice_rows(table: &RawTable, header_row: usize, start_row: usize) -> Frame {
    let columns = if header_row == 0 {
        table.columns.clone()
    } else {
        match table.row_as_header(header_row - 1) {
            Some(names) => unique_column_names(names, table.column_count()),
            None => {
                warn!(header_row, rows = table.row_count(), "Header row beyond end of table");
                return Frame {
                    columns: table.columns.clone(),
                    rows: Vec::new(),
                };
            }
        }
    };

    let first = start_row.saturating_sub(1).max(header_row);
    let rows = table.rows.iter().skip(first).cloned().collect();
    Frame { columns, rows }
}

/// Derive `amount` from debit/credit columns when no single amount column is mapped
///
/// `amount = credit - debit`, a missing or unreadable side counts as zero.
/// Signs are taken as written, so a debit stored as `-50.00` adds 50.
/// The source columns are dropped.
pub fn fuse_debit_credit(mut frame: Frame, mapping: &ColumnMapping) -> Frame {
    if !mapping.uses_debit_credit() {
        return frame;
    }

    let debit_idx = lookup(&frame, &mapping.debit_amount);
    let credit_idx = lookup(&frame, &mapping.credit_amount);
    if debit_idx.is_none() && credit_idx.is_none() {
        return frame;
    }

    let side = |row: &[Cell], idx: Option<usize>| -> Decimal {
        idx.and_then(|i| row.get(i))
            .and_then(cell_to_amount)
            .unwrap_or(Decimal::ZERO)
    };

    let fused: Vec<Cell> = frame
        .rows
        .iter()
        .map(|row| {
            let amount = side(row, credit_idx) - side(row, debit_idx);
            Cell::Text(amount.normalize().to_string())
        })
        .collect();

    let dropped: Vec<usize> = [debit_idx, credit_idx].into_iter().flatten().collect();
    frame.drop_columns(&dropped);
    frame.push_column(CanonicalField::Amount.as_str(), fused);
    debug!(rows = frame.rows.len(), "Fused debit/credit columns into amount");
    frame
}

/// Keep only mapped columns, renamed to canonical field names
pub fn rename_columns(frame: Frame, mapping: &ColumnMapping) -> Frame {
    let mut picked: Vec<(CanonicalField, usize)> = Vec::new();
    for field in CanonicalField::CLEANED {
        let source = match field {
            CanonicalField::Amount if mapping.uses_debit_credit() => field.as_str(),
            _ => mapping.get(field),
        };
        if source.is_empty() {
            continue;
        }
        match lookup(&frame, source) {
            Some(idx) => picked.push((field, idx)),
            None => warn!(field = field.as_str(), "Mapped column not found in statement"),
        }
    }

    Frame {
        columns: picked.iter().map(|(f, _)| f.as_str().to_string()).collect(),
        rows: frame
            .rows
            .iter()
            .map(|row| {
                picked
                    .iter()
                    .map(|(_, idx)| row.get(*idx).cloned().unwrap_or(Cell::Empty))
                    .collect()
            })
            .collect(),
    }
}

/// Ensure every canonical column exists, filling with empty cells
pub fn add_missing_columns(mut frame: Frame) -> Frame {
    for field in CanonicalField::CLEANED {
        if frame.index_of(field.as_str()).is_none() {
            let empty = vec![Cell::Empty; frame.rows.len()];
            frame.push_column(field.as_str(), empty);
        }
    }
    frame
}

/// Parse dates and amounts of a canonical frame
pub fn normalize_values(frame: &Frame) -> CleanedTable {
    let idx = |field: CanonicalField| frame.index_of(field.as_str());
    let (date_i, desc_i, amount_i, currency_i, balance_i) = (
        idx(CanonicalField::Date),
        idx(CanonicalField::Description),
        idx(CanonicalField::Amount),
        idx(CanonicalField::Currency),
        idx(CanonicalField::Balance),
    );

    let rows = frame
        .rows
        .iter()
        .map(|row| {
            let cell = |i: Option<usize>| i.and_then(|i| row.get(i)).unwrap_or(&Cell::Empty);

            let amount_cell = cell(amount_i);
            let amount = if amount_cell.is_empty() {
                CleanAmount::Missing
            } else {
                cell_to_amount(amount_cell)
                    .map(CleanAmount::Value)
                    .unwrap_or(CleanAmount::Invalid)
            };

            CleanedRow {
                date: cell_to_date(cell(date_i)),
                description: cell_to_text(cell(desc_i)),
                amount,
                currency: cell_to_text(cell(currency_i)),
                balance: cell_to_amount(cell(balance_i)),
            }
        })
        .collect();

    CleanedTable { rows }
}

fn lookup(frame: &Frame, name: &str) -> Option<usize> {
    if name.is_empty() {
        return None;
    }
    frame
        .index_of(name)
        .or_else(|| frame.columns.iter().position(|c| c.eq_ignore_ascii_case(name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn text(s: &str) -> Cell {
        Cell::from_text(s)
    }

    fn table(columns: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| text(c)).collect())
                .collect(),
        )
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_slice_plain_header() {
        let t = table(&["Date", "Amount"], &[&["2023-01-01", "5"], &["2023-01-02", "6"]]);
        let frame = slice_rows(&t, 0, 1);
        assert_eq!(frame.columns, vec!["Date", "Amount"]);
        assert_eq!(frame.rows.len(), 2);
    }

    #[test]
    fn test_slice_header_below_metadata() {
        let t = table(
            &["Statement for", ""],
            &[
                &["Account", "1234"],
                &["Date", "Amount"],
                &["2023-01-01", "5"],
            ],
        );
        let frame = slice_rows(&t, 2, 3);
        assert_eq!(frame.columns, vec!["Date", "Amount"]);
        assert_eq!(frame.rows, vec![vec![text("2023-01-01"), text("5")]]);
    }

    #[test]
    fn test_slice_header_out_of_range() {
        let t = table(&["Date"], &[&["2023-01-01"]]);
        assert!(slice_rows(&t, 5, 6).rows.is_empty());
    }

    #[test]
    fn test_debit_credit_fusion() {
        let mapping = ColumnMapping {
            date: "Date".into(),
            description: "Details".into(),
            debit_amount: "Paid out".into(),
            credit_amount: "Paid in".into(),
            ..Default::default()
        }
        .normalized();
        let t = table(
            &["Date", "Details", "Paid out", "Paid in"],
            &[
                &["2023-01-01", "Salary", "", "1,000.00"],
                &["2023-01-02", "Rent", "500.00", ""],
                &["2023-01-03", "Refund", "-20.00", "20.00"],
                &["2023-01-04", "Reversal", "-50.00", "0.00"],
            ],
        );
        let frame = fuse_debit_credit(slice_rows(&t, 0, 1), &mapping);
        assert_eq!(frame.columns, vec!["Date", "Details", "amount"]);

        let cleaned = clean(&t, &ConversionModel::new(mapping, 0, 1).unwrap());
        let amounts: Vec<_> = cleaned.rows.iter().map(|r| r.amount.value()).collect();
        assert_eq!(
            amounts,
            vec![
                Some(dec("1000")),
                Some(dec("-500")),
                Some(dec("40")),
                Some(dec("50"))
            ]
        );
    }

    #[test]
    fn test_rename_and_defaults() {
        let mapping = ColumnMapping {
            date: "Posted".into(),
            description: "Memo".into(),
            amount: "Amt".into(),
            ..Default::default()
        };
        let t = table(&["Posted", "Memo", "Amt", "Ignored"], &[&["2023-01-01", "Tea", "-2.50", "x"]]);
        let frame = add_missing_columns(rename_columns(slice_rows(&t, 0, 1), &mapping));
        assert_eq!(
            frame.columns,
            vec!["date", "description", "amount", "currency", "balance"]
        );

        let cleaned = normalize_values(&frame);
        let row = &cleaned.rows[0];
        assert_eq!(row.description, "Tea");
        assert_eq!(row.amount, CleanAmount::Value(dec("-2.50")));
        assert_eq!(row.currency, "");
        assert_eq!(row.balance, None);
    }

    #[test]
    fn test_bad_values_do_not_fail() {
        let mapping = ColumnMapping {
            date: "Date".into(),
            description: "Desc".into(),
            amount: "Amount".into(),
            balance: "Balance".into(),
            ..Default::default()
        };
        let t = table(
            &["Date", "Desc", "Amount", "Balance"],
            &[&["not-a-date", "Thing", "abc", "n/a"], &["2023-01-01", "", "", "10"]],
        );
        let cleaned = clean(&t, &ConversionModel::new(mapping, 0, 1).unwrap());
        assert_eq!(cleaned.rows[0].date, None);
        assert_eq!(cleaned.rows[0].amount, CleanAmount::Invalid);
        assert_eq!(cleaned.rows[0].balance, None);
        assert_eq!(cleaned.rows[1].amount, CleanAmount::Missing);
        assert_eq!(cleaned.rows[1].balance, Some(dec("10")));
    }

    #[test]
    fn test_missing_mapped_column_is_tolerated() {
        let mapping = ColumnMapping {
            date: "Date".into(),
            amount: "Nope".into(),
            ..Default::default()
        };
        let t = table(&["Date"], &[&["2023-01-01"]]);
        let cleaned = clean(&t, &ConversionModel::new(mapping, 0, 1).unwrap());
        assert_eq!(cleaned.rows[0].amount, CleanAmount::Missing);
    }
}
