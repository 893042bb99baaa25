//! Transaction domain model

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single spend (positive amount) or refund (negative amount) made by a user
///
/// Transactions are produced by the ingestion pipeline and never change
/// after they are stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: String,
    /// Calendar day the transaction happened on
    pub date: NaiveDate,
    /// Positive = money spent
    pub amount: Decimal,
    pub category: String,
    pub merchant: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a new transaction with a fresh ID
    pub fn new(
        user_id: impl Into<String>,
        date: NaiveDate,
        amount: Decimal,
        category: impl Into<String>,
        merchant: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            date,
            amount,
            category: Self::normalize_label(&category.into()),
            merchant: merchant.into().trim().to_string(),
            description: None,
            created_at: Utc::now(),
        }
    }

    /// Attach a free-form description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// True if the transaction has a usable merchant name
    pub fn has_merchant(&self) -> bool {
        !self.merchant.is_empty()
    }

    /// Categories are matched case-insensitively against budget keys
    pub fn normalize_label(label: &str) -> String {
        label.trim().to_lowercase()
    }
}

/// Sum the amounts of a set of transactions
pub fn total_amount<'a>(txs: impl IntoIterator<Item = &'a Transaction>) -> Decimal {
    txs.into_iter().map(|tx| tx.amount).sum()
}

/// Two-decimal string used for amounts in trigger payloads
pub fn format_money(amount: Decimal) -> String {
    let mut rounded = amount.round_dp(2);
    rounded.rescale(2);
    rounded.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_is_normalized() {
        let tx = Transaction::new(
            "user-1",
            NaiveDate::from_ymd_opt(2025, 3, 4).unwrap(),
            Decimal::new(1250, 2),
            "  Groceries ",
            " Corner Shop ",
        );
        assert_eq!(tx.category, "groceries");
        assert_eq!(tx.merchant, "Corner Shop");
        assert!(tx.has_merchant());
    }

    #[test]
    fn test_total_amount() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 4).unwrap();
        let txs = vec![
            Transaction::new("u", date, Decimal::new(1000, 2), "food", "a"),
            Transaction::new("u", date, Decimal::new(-250, 2), "food", "b"),
        ];
        assert_eq!(total_amount(&txs), Decimal::new(750, 2));
    }

    #[test]
    fn test_format_money_pads_and_rounds() {
        assert_eq!(format_money(Decimal::from(20)), "20.00");
        assert_eq!(format_money(Decimal::new(12346, 3)), "12.35");
    }
}
