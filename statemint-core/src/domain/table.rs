//! Generic tabular structure produced by statement parsers

use chrono::NaiveDateTime;

/// A loosely-typed scalar cell value
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Date(NaiveDateTime),
}

impl Cell {
    /// Build a cell from raw text, mapping blank strings to `Empty`
    pub fn from_text(s: &str) -> Self {
        if s.trim().is_empty() {
            Cell::Empty
        } else {
            Cell::Text(s.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.trim().is_empty(),
            Cell::Number(n) => n.is_nan(),
            Cell::Date(_) => false,
        }
    }

    /// Compact textual rendering used for prompts and header promotion
    pub fn display(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(n) if n.is_nan() => String::new(),
            Cell::Number(n) => n.to_string(),
            Cell::Date(dt) => {
                if dt.time() == chrono::NaiveTime::MIN {
                    dt.format("%Y-%m-%d").to_string()
                } else {
                    dt.format("%Y-%m-%d %H:%M:%S").to_string()
                }
            }
        }
    }
}

/// Rows × named columns, as read from the statement file
///
/// `columns` holds the file's own first row. Statements that carry
/// metadata lines above the real header keep those lines as data rows; the
/// conversion model's `header_row` says where the real header is.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl RawTable {
    /// Build a table, padding every row to the column count
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let width = rows
            .iter()
            .map(|r| r.len())
            .max()
            .unwrap_or(0)
            .max(columns.len());

        let columns = unique_column_names(columns, width);
        let rows = rows
            .into_iter()
            .map(|mut r| {
                r.resize(width, Cell::Empty);
                r
            })
            .collect();

        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Display strings of a data row, used when a later row is the real header
    pub fn row_as_header(&self, index: usize) -> Option<Vec<String>> {
        self.rows
            .get(index)
            .map(|r| r.iter().map(Cell::display).collect())
    }
}

/// Fill blank header names and disambiguate repeats so every column is addressable
pub(crate) fn unique_column_names(names: Vec<String>, width: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(width);
    for i in 0..width {
        let base = names
            .get(i)
            .map(|n| n.trim().trim_start_matches('\u{feff}').to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("column_{}", i + 1));

        let mut name = base.clone();
        let mut suffix = 2;
        while out.contains(&name) {
            name = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        out.push(name);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_padded_to_widest() {
        let table = RawTable::new(
            vec!["Date".into(), "Amount".into()],
            vec![vec![Cell::from_text("x")], vec![
                Cell::from_text("a"),
                Cell::from_text("b"),
                Cell::from_text("c"),
            ]],
        );
        assert_eq!(table.column_count(), 3);
        assert_eq!(table.columns[2], "column_3");
        assert!(table.rows.iter().all(|r| r.len() == 3));
    }

    #[test]
    fn test_duplicate_and_blank_headers() {
        let names = unique_column_names(
            vec!["Amount".into(), "".into(), "Amount".into(), "\u{feff}Date".into()],
            4,
        );
        assert_eq!(names, vec!["Amount", "column_2", "Amount_2", "Date"]);
    }

    #[test]
    fn test_cell_display() {
        assert_eq!(Cell::Number(12.5).display(), "12.5");
        assert_eq!(Cell::from_text("  "), Cell::Empty);
        let dt = chrono::NaiveDate::from_ymd_opt(2023, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(Cell::Date(dt).display(), "2023-01-02");
    }
}
