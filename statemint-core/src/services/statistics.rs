//! Statement statistics - count, total and date range

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::StatementTransaction;

/// Summary of a parsed statement
///
/// An empty statement yields zero count and total with no date range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementStatistics {
    pub count: usize,
    pub total_amount: Decimal,
    pub date_range_start: Option<NaiveDate>,
    pub date_range_end: Option<NaiveDate>,
}

impl StatementStatistics {
    pub fn calc(transactions: &[StatementTransaction]) -> Self {
        Self {
            count: transactions.len(),
            total_amount: transactions.iter().map(|t| t.amount).sum(),
            date_range_start: transactions.iter().map(|t| t.date).min(),
            date_range_end: transactions.iter().map(|t| t.date).max(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(date: &str, amount: Decimal) -> StatementTransaction {
        StatementTransaction {
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            description: "x".into(),
            amount,
            currency: String::new(),
            balance: None,
        }
    }

    #[test]
    fn test_statistics() {
        let txs = vec![
            tx("2023-01-05", Decimal::new(100000, 2)),
            tx("2023-01-01", Decimal::new(-5000, 2)),
            tx("2023-01-09", Decimal::new(-10000, 2)),
        ];
        let stats = StatementStatistics::calc(&txs);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.total_amount, Decimal::new(85000, 2));
        assert_eq!(stats.date_range_start, NaiveDate::from_ymd_opt(2023, 1, 1));
        assert_eq!(stats.date_range_end, NaiveDate::from_ymd_opt(2023, 1, 9));
    }

    #[test]
    fn test_empty_input() {
        let stats = StatementStatistics::calc(&[]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.total_amount, Decimal::ZERO);
        assert_eq!(stats.date_range_start, None);
        assert_eq!(stats.date_range_end, None);
    }
}
