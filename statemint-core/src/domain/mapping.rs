//! Column mapping and conversion model

use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

/// Fixed transaction attributes every statement layout is mapped onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalField {
    Date,
    Description,
    Amount,
    DebitAmount,
    CreditAmount,
    Currency,
    Balance,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 7] = [
        CanonicalField::Date,
        CanonicalField::Description,
        CanonicalField::Amount,
        CanonicalField::DebitAmount,
        CanonicalField::CreditAmount,
        CanonicalField::Currency,
        CanonicalField::Balance,
    ];

    /// Fields that survive into the cleaned table (debit/credit are fused away)
    pub const CLEANED: [CanonicalField; 5] = [
        CanonicalField::Date,
        CanonicalField::Description,
        CanonicalField::Amount,
        CanonicalField::Currency,
        CanonicalField::Balance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalField::Date => "date",
            CanonicalField::Description => "description",
            CanonicalField::Amount => "amount",
            CanonicalField::DebitAmount => "debit_amount",
            CanonicalField::CreditAmount => "credit_amount",
            CanonicalField::Currency => "currency",
            CanonicalField::Balance => "balance",
        }
    }
}

/// Canonical field -> source column name ("" when the statement has no such column)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub amount: String,
    #[serde(default)]
    pub debit_amount: String,
    #[serde(default)]
    pub credit_amount: String,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub balance: String,
}

impl ColumnMapping {
    pub fn get(&self, field: CanonicalField) -> &str {
        match field {
            CanonicalField::Date => &self.date,
            CanonicalField::Description => &self.description,
            CanonicalField::Amount => &self.amount,
            CanonicalField::DebitAmount => &self.debit_amount,
            CanonicalField::CreditAmount => &self.credit_amount,
            CanonicalField::Currency => &self.currency,
            CanonicalField::Balance => &self.balance,
        }
    }

    /// Non-empty (field, source column) pairs in canonical order
    pub fn mapped(&self) -> impl Iterator<Item = (CanonicalField, &str)> {
        CanonicalField::ALL
            .into_iter()
            .map(move |f| (f, self.get(f)))
            .filter(|(_, name)| !name.is_empty())
    }

    /// Whether amount has to be derived from separate debit/credit columns
    pub fn uses_debit_credit(&self) -> bool {
        self.amount.is_empty()
    }

    /// Trim names and enforce the amount vs debit/credit invariant:
    /// when both debit and credit are mapped, `amount` is derived, not read.
    pub fn normalized(mut self) -> Self {
        for field in [
            &mut self.date,
            &mut self.description,
            &mut self.amount,
            &mut self.debit_amount,
            &mut self.credit_amount,
            &mut self.currency,
            &mut self.balance,
        ] {
            *field = field.trim().to_string();
        }
        if !self.debit_amount.is_empty() && !self.credit_amount.is_empty() {
            self.amount.clear();
        }
        self
    }
}

/// How to read one statement layout: mapping plus header/data row positions
///
/// Row numbers count data rows of the parsed table starting at 1; 0 means the
/// table's own first line. `header_row = 0, start_row = 1` is the plain case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionModel {
    pub column_map: ColumnMapping,
    pub header_row: usize,
    pub start_row: usize,
}

impl ConversionModel {
    pub fn new(column_map: ColumnMapping, header_row: usize, start_row: usize) -> Result<Self> {
        if start_row <= header_row {
            return Err(Error::validation(format!(
                "start_row ({}) must be greater than header_row ({})",
                start_row, header_row
            )));
        }
        Ok(Self {
            column_map: column_map.normalized(),
            header_row,
            start_row,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debit_credit_clears_amount() {
        let mapping = ColumnMapping {
            amount: "Amount".into(),
            debit_amount: " Paid out ".into(),
            credit_amount: "Paid in".into(),
            ..Default::default()
        }
        .normalized();
        assert!(mapping.amount.is_empty());
        assert_eq!(mapping.debit_amount, "Paid out");
        assert!(mapping.uses_debit_credit());
    }

    #[test]
    fn test_single_side_keeps_amount() {
        let mapping = ColumnMapping {
            amount: "Amount".into(),
            debit_amount: "Debit".into(),
            ..Default::default()
        }
        .normalized();
        assert_eq!(mapping.amount, "Amount");
    }

    #[test]
    fn test_start_row_must_follow_header() {
        assert!(ConversionModel::new(ColumnMapping::default(), 3, 3).is_err());
        assert!(ConversionModel::new(ColumnMapping::default(), 0, 1).is_ok());
    }

    #[test]
    fn test_mapped_skips_empty() {
        let mapping = ColumnMapping {
            date: "Date".into(),
            description: "Memo".into(),
            ..Default::default()
        };
        let fields: Vec<_> = mapping.mapped().map(|(f, _)| f).collect();
        assert_eq!(fields, vec![CanonicalField::Date, CanonicalField::Description]);
    }

    #[test]
    fn test_missing_keys_deserialize_to_empty() {
        let mapping: ColumnMapping =
            serde_json::from_str(r#"{"date": "Posted", "amount": "Amt"}"#).unwrap();
        assert_eq!(mapping.date, "Posted");
        assert_eq!(mapping.balance, "");
    }
}
