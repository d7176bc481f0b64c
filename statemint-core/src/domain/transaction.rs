//! Transaction domain models

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Decimal places kept for amounts and balances
pub const AMOUNT_SCALE: u32 = 4;

/// Round a money value to the scale it is stored and compared at
pub fn to_amount_scale(value: Decimal) -> Decimal {
    value
        .round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
}

/// One canonical row built from a statement file (not persisted directly)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementTransaction {
    pub date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    pub currency: String,
    pub balance: Option<Decimal>,
}

/// Where a persisted transaction is in the categorization lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategorizationStatus {
    Pending,
    Categorized,
    Failed,
}

impl CategorizationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategorizationStatus::Pending => "pending",
            CategorizationStatus::Categorized => "categorized",
            CategorizationStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "categorized" => CategorizationStatus::Categorized,
            "failed" => CategorizationStatus::Failed,
            _ => CategorizationStatus::Pending,
        }
    }
}

impl fmt::Display for CategorizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted transaction belonging to a source
///
/// Date, description and amount are financial facts and never change after
/// insert; only the categorization fields are mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub source_id: i64,
    pub date: NaiveDate,
    pub description: String,
    pub normalized_description: String,
    pub amount: Decimal,
    pub currency: String,
    pub balance: Option<Decimal>,
    pub category_id: Option<i64>,
    pub sub_category_id: Option<i64>,
    pub categorization_status: CategorizationStatus,
    /// Confidence reported by the strategy that assigned the category
    pub categorization_confidence: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// New pending transaction from a statement row
    pub fn from_statement(source_id: i64, tx: &StatementTransaction) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            source_id,
            date: tx.date,
            description: tx.description.clone(),
            normalized_description: normalize_description(&tx.description),
            amount: to_amount_scale(tx.amount),
            currency: tx.currency.clone(),
            balance: tx.balance.map(to_amount_scale),
            category_id: None,
            sub_category_id: None,
            categorization_status: CategorizationStatus::Pending,
            categorization_confidence: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Lower-case, drop punctuation, collapse whitespace
///
/// Used as the key for historical categorization matches.
pub fn normalize_description(desc: &str) -> String {
    let lowered = desc.to_lowercase();
    let stripped: String = lowered
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
