//! Budget alert dedup state and billing periods

use std::fmt;

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

/// A calendar month used to bucket budget alert state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BillingPeriod {
    year: i32,
    month: u32,
}

impl BillingPeriod {
    /// The billing period a date falls into
    pub fn containing(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Parse a `YYYY-MM` key
    pub fn parse(s: &str) -> Result<Self> {
        let first = NaiveDate::parse_from_str(&format!("{}-01", s.trim()), "%Y-%m-%d")
            .map_err(|e| Error::validation(format!("invalid billing period '{}': {}", s, e)))?;
        Ok(Self::containing(first))
    }

    pub fn first_day(&self) -> NaiveDate {
        // year/month always come from a valid date
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or_default()
    }

    /// Last calendar day of the month (28/29/30/31)
    pub fn last_day(&self) -> NaiveDate {
        let first = self.first_day();
        first
            .checked_add_months(Months::new(1))
            .and_then(|next| next.pred_opt())
            .unwrap_or(first)
    }

    /// `YYYY-MM` key used in storage
    pub fn key(&self) -> String {
        format!("{:04}-{:02}", self.year, self.month)
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Identifies the single alert-state row for a user/category/month
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertStateKey {
    pub user_id: String,
    pub category: String,
    pub period: BillingPeriod,
}

impl AlertStateKey {
    pub fn new(user_id: impl Into<String>, category: impl Into<String>, period: BillingPeriod) -> Self {
        Self {
            user_id: user_id.into(),
            category: category.into(),
            period,
        }
    }
}

/// Last alert band reached for a key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetAlertState {
    pub last_percentage: i64,
    pub last_alert_date: DateTime<Utc>,
}

/// Alert state as read from storage, with the version used for compare-and-set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedAlertState {
    pub state: BudgetAlertState,
    pub version: i64,
}
