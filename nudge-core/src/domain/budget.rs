//! Budget document

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Spending limit for one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetLimit {
    pub limit: Decimal,
}

/// Per-user budget document: category -> limit
///
/// Stored as JSON, e.g. `{"groceries": {"limit": "400.00"}}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Budget {
    pub categories: HashMap<String, BudgetLimit>,
}

impl Budget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the limit for a category (builder style)
    pub fn with_limit(mut self, category: &str, limit: Decimal) -> Self {
        self.set_limit(category, limit);
        self
    }

    pub fn set_limit(&mut self, category: &str, limit: Decimal) {
        self.categories
            .insert(category.trim().to_lowercase(), BudgetLimit { limit });
    }

    /// Limit for a category, only if it is positive
    pub fn limit_for(&self, category: &str) -> Option<Decimal> {
        self.categories
            .get(&category.trim().to_lowercase())
            .map(|b| b.limit)
            .filter(|limit| *limit > Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_lookup_ignores_case_and_non_positive() {
        let budget = Budget::new()
            .with_limit("Dining", Decimal::new(200, 0))
            .with_limit("fun", Decimal::ZERO);

        assert_eq!(budget.limit_for("dining"), Some(Decimal::new(200, 0)));
        assert_eq!(budget.limit_for("FUN"), None);
        assert_eq!(budget.limit_for("travel"), None);
    }

    #[test]
    fn test_budget_json_shape() {
        let json = r#"{"groceries": {"limit": "400.00"}, "rent": {"limit": 1200}}"#;
        let budget: Budget = serde_json::from_str(json).unwrap();
        assert_eq!(budget.limit_for("groceries"), Some(Decimal::new(40000, 2)));
        assert_eq!(budget.limit_for("rent"), Some(Decimal::new(1200, 0)));
    }
}
