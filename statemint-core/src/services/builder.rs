//! Transactions builder - cleaned rows to canonical statement transactions

use tracing::debug;

use super::cleaner::{CleanedRow, CleanedTable};
use crate::domain::{to_amount_scale, StatementTransaction};

/// Transactions built from a cleaned table, plus how many rows were unusable
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildOutcome {
    pub transactions: Vec<StatementTransaction>,
    pub rows_dropped: usize,
}

/// Convert cleaned rows, keeping order and dropping rows that have no date,
/// no description or no readable amount
pub fn build(cleaned: &CleanedTable) -> BuildOutcome {
    let transactions: Vec<StatementTransaction> =
        cleaned.rows.iter().filter_map(to_transaction).collect();
    let rows_dropped = cleaned.rows.len() - transactions.len();

    if rows_dropped > 0 {
        debug!(rows_dropped, kept = transactions.len(), "Dropped incomplete rows");
    }

    BuildOutcome {
        transactions,
        rows_dropped,
    }
}

fn to_transaction(row: &CleanedRow) -> Option<StatementTransaction> {
    let description = row.description.trim();
    if description.is_empty() {
        return None;
    }
    Some(StatementTransaction {
        date: row.date?,
        description: description.to_string(),
        amount: to_amount_scale(row.amount.value()?),
        currency: row.currency.trim().to_string(),
        balance: row.balance.map(to_amount_scale),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cleaner::CleanAmount;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn row(date: Option<&str>, description: &str, amount: CleanAmount) -> CleanedRow {
        CleanedRow {
            date: date.map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").unwrap()),
            description: description.to_string(),
            amount,
            currency: "GBP".to_string(),
            balance: None,
        }
    }

    #[test]
    fn test_incomplete_rows_dropped() {
        let cleaned = CleanedTable {
            rows: vec![
                row(Some("2023-01-01"), "Salary", CleanAmount::Value(Decimal::new(100000, 2))),
                row(None, "No date", CleanAmount::Value(Decimal::ONE)),
                row(Some("2023-01-02"), "   ", CleanAmount::Value(Decimal::ONE)),
                row(Some("2023-01-03"), "Broken amount", CleanAmount::Invalid),
                row(Some("2023-01-04"), "No amount", CleanAmount::Missing),
                row(Some("2023-01-05"), " Coffee ", CleanAmount::Value(Decimal::new(-350, 2))),
            ],
        };

        let outcome = build(&cleaned);
        assert_eq!(outcome.rows_dropped, 4);
        let descriptions: Vec<_> = outcome
            .transactions
            .iter()
            .map(|t| t.description.as_str())
            .collect();
        assert_eq!(descriptions, vec!["Salary", "Coffee"]);
        assert_eq!(outcome.transactions[1].amount, Decimal::new(-350, 2));
    }

    #[test]
    fn test_empty_table() {
        let outcome = build(&CleanedTable::default());
        assert!(outcome.transactions.is_empty());
        assert_eq!(outcome.rows_dropped, 0);
    }
}
