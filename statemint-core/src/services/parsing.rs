//! Date and amount parsing for heterogeneous statement cells
//!
//! Every function here is total: bad input yields `None`, never an error.

use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;

use crate::domain::Cell;
use crate::parsers::excel_serial_to_datetime;

/// Tokens banks use for "nothing moved"
const ZERO_TOKENS: [&str; 5] = ["", "0", "00", "0.00", "00.00"];

/// Full timestamp layouts, tried before plain dates
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
];

/// Date layouts, most specific first. Day-first wins over month-first when a
/// value fits both (01/02/2023 is 1 February).
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%d/%m/%Y",
    "%m/%d/%Y",
    "%d-%m-%Y",
    "%m-%d-%Y",
    "%d.%m.%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%b %d %Y",
    "%d-%b-%Y",
    "%d-%b-%y",
    "%d %b %y",
    "%d/%m/%y",
    "%m/%d/%y",
    "%d-%m-%y",
    "%d.%m.%y",
    "%Y%m%d",
];

/// Years outside this window mean a format matched by accident
/// (chrono's `%Y` happily reads "23" as year 23).
const MIN_YEAR: i32 = 1900;
const MAX_YEAR: i32 = 2200;

fn plausible(date: NaiveDate) -> Option<NaiveDate> {
    (MIN_YEAR..=MAX_YEAR).contains(&date.year()).then_some(date)
}

/// Parse a date string in any of the supported layouts
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return plausible(dt.date_naive());
    }

    let attempt = |candidate: &str| -> Option<NaiveDate> {
        DATETIME_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(candidate, fmt).ok())
            .map(|dt| dt.date())
            .and_then(plausible)
            .or_else(|| {
                DATE_FORMATS
                    .iter()
                    .filter_map(|fmt| NaiveDate::parse_from_str(candidate, fmt).ok())
                    .find_map(plausible)
            })
    };

    attempt(s).or_else(|| {
        // "01/02/2023 10:15 AM" and similar: retry with the leading date token
        s.split_whitespace()
            .next()
            .filter(|token| *token != s)
            .and_then(attempt)
    })
}

/// Date from a cell of any kind
pub fn cell_to_date(cell: &Cell) -> Option<NaiveDate> {
    match cell {
        Cell::Empty => None,
        Cell::Date(dt) => plausible(dt.date()),
        Cell::Text(s) => parse_date(s),
        Cell::Number(n) => {
            if n.fract() == 0.0 && (19_000_101.0..=22_001_231.0).contains(n) {
                return parse_date(&format!("{}", *n as i64));
            }
            excel_serial_to_datetime(*n)
                .map(|dt| dt.date())
                .and_then(plausible)
        }
    }
}

/// Normalize a monetary string to an exact decimal
///
/// Handles currency symbols, thousands separators, decimal commas in
/// European layouts (`1.234,56`, `12,50`), leading or trailing minus and
/// parenthesised negatives. Zero tokens map to zero. Returns `None` when no
/// number can be recovered.
pub fn normalize_amount(raw: &str) -> Option<Decimal> {
    let s = raw.trim();
    if ZERO_TOKENS.contains(&s) {
        return Some(Decimal::ZERO);
    }

    let mut negative = false;
    let mut body = s.replace('\u{2212}', "-");

    if body.starts_with('(') && body.ends_with(')') {
        negative = true;
        body = body[1..body.len() - 1].to_string();
    }

    let mut kept: String = body
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-' | '+'))
        .collect();

    if let Some(rest) = kept.strip_suffix('-') {
        negative = !negative;
        kept = rest.to_string();
    }
    if let Some(rest) = kept.strip_prefix('-') {
        negative = !negative;
        kept = rest.to_string();
    } else if let Some(rest) = kept.strip_prefix('+') {
        kept = rest.to_string();
    }

    if kept.contains(['-', '+']) || !kept.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let mut value = Decimal::from_str(&canonical_number(&kept)?).ok()?;
    if negative {
        value = -value;
    }
    Some(value)
}

/// Rewrite digits with `.`/`,` separators into plain `1234.56` form
fn canonical_number(s: &str) -> Option<String> {
    let last_dot = s.rfind('.');
    let last_comma = s.rfind(',');

    let decimal_sep = match (last_dot, last_comma) {
        (Some(d), Some(c)) => Some(if d > c { '.' } else { ',' }),
        (Some(_), None) => (s.matches('.').count() == 1).then_some('.'),
        (None, Some(c)) => {
            let single = s.matches(',').count() == 1;
            let decimals = s.len() - c - 1;
            (single && decimals != 3).then_some(',')
        }
        (None, None) => None,
    };

    if let Some(sep) = decimal_sep {
        if s.matches(sep).count() != 1 {
            return None;
        }
    }

    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '0'..='9' => out.push(ch),
            sep if Some(sep) == decimal_sep => out.push('.'),
            _ => {}
        }
    }

    if out.starts_with('.') {
        out.insert(0, '0');
    }
    if out.ends_with('.') {
        out.pop();
    }
    (!out.is_empty()).then_some(out)
}

/// Amount from a cell; `None` for empty or unreadable cells
pub fn cell_to_amount(cell: &Cell) -> Option<Decimal> {
    match cell {
        Cell::Empty => None,
        Cell::Text(s) => normalize_amount(s),
        Cell::Number(n) if n.is_finite() => Decimal::from_str(&n.to_string()).ok(),
        Cell::Number(_) | Cell::Date(_) => None,
    }
}

/// Text content of a cell for description/currency columns
pub fn cell_to_text(cell: &Cell) -> String {
    cell.display()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_common_date_layouts() {
        assert_eq!(parse_date("2023-01-01"), Some(d(2023, 1, 1)));
        assert_eq!(parse_date("01/02/2023"), Some(d(2023, 2, 1)));
        assert_eq!(parse_date("01-03-2023"), Some(d(2023, 3, 1)));
        assert_eq!(parse_date("2023.01.04"), Some(d(2023, 1, 4)));
        assert_eq!(parse_date("not-a-date"), None);
    }

    #[test]
    fn test_month_first_fallback() {
        assert_eq!(parse_date("12/31/2023"), Some(d(2023, 12, 31)));
    }

    #[test]
    fn test_named_months_and_times() {
        assert_eq!(parse_date("05 Jan 2023"), Some(d(2023, 1, 5)));
        assert_eq!(parse_date("Jan 5, 2023"), Some(d(2023, 1, 5)));
        assert_eq!(parse_date("05-Jan-23"), Some(d(2023, 1, 5)));
        assert_eq!(parse_date("2023-01-05 14:30:00"), Some(d(2023, 1, 5)));
        assert_eq!(parse_date("2023-01-05T14:30:00Z"), Some(d(2023, 1, 5)));
        assert_eq!(parse_date("05/01/2023 14:30"), Some(d(2023, 1, 5)));
    }

    #[test]
    fn test_two_digit_year() {
        assert_eq!(parse_date("05/01/23"), Some(d(2023, 1, 5)));
    }

    #[test]
    fn test_cell_dates() {
        assert_eq!(cell_to_date(&Cell::Number(44927.0)), Some(d(2023, 1, 1)));
        assert_eq!(cell_to_date(&Cell::Number(20230101.0)), Some(d(2023, 1, 1)));
        assert_eq!(cell_to_date(&Cell::Empty), None);
        let dt = d(2023, 6, 1).and_hms_opt(9, 0, 0).unwrap();
        assert_eq!(cell_to_date(&Cell::Date(dt)), Some(d(2023, 6, 1)));
    }

    #[test]
    fn test_numeric_ids_in_date_column() {
        // Card and account numbers end up here when a sheet is mismapped
        assert_eq!(cell_to_date(&Cell::Number(4_111_111_111_111_111.0)), None);
        assert_eq!(cell_to_date(&Cell::Number(123_456_789_012_345.0)), None);
        assert_eq!(cell_to_date(&Cell::Number(-44927.0)), None);
    }

    #[test]
    fn test_zero_tokens() {
        for token in ["0.00", "00", "", "00.00", "0"] {
            assert_eq!(normalize_amount(token), Some(Decimal::ZERO), "token {:?}", token);
        }
    }

    #[test]
    fn test_amount_formats() {
        assert_eq!(normalize_amount("-1,234.56"), Some(dec("-1234.56")));
        assert_eq!(normalize_amount("$1,234.56"), Some(dec("1234.56")));
        assert_eq!(normalize_amount("(50.00)"), Some(dec("-50.00")));
        assert_eq!(normalize_amount("50.00-"), Some(dec("-50.00")));
        assert_eq!(normalize_amount("1.234,56"), Some(dec("1234.56")));
        assert_eq!(normalize_amount("-12,50"), Some(dec("-12.50")));
        assert_eq!(normalize_amount("1,234"), Some(dec("1234")));
        assert_eq!(normalize_amount("1,234,567"), Some(dec("1234567")));
        assert_eq!(normalize_amount("€ 99.90 EUR"), Some(dec("99.90")));
        assert_eq!(normalize_amount("+5"), Some(dec("5")));
    }

    #[test]
    fn test_unparseable_amounts() {
        assert_eq!(normalize_amount("n/a"), None);
        assert_eq!(normalize_amount("12-34"), None);
        assert_eq!(normalize_amount("--"), None);
    }

    #[test]
    fn test_cell_amounts() {
        assert_eq!(cell_to_amount(&Cell::Number(-3.5)), Some(dec("-3.5")));
        assert_eq!(cell_to_amount(&Cell::Number(0.1)), Some(dec("0.1")));
        assert_eq!(cell_to_amount(&Cell::Number(f64::NAN)), None);
        assert_eq!(cell_to_amount(&Cell::Empty), None);
    }
}
