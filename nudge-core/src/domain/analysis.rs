//! Per-analysis outcomes
//!
//! Every analysis run for a transaction (or for a user inside a job) ends in
//! `Result<Outcome, SkipReason>`. Callers decide how loudly to log each
//! reason; none of them is allowed to stop sibling analyses.

use serde::Serialize;
use thiserror::Error;

use super::result::Error;
use super::trigger::NotificationTrigger;

/// The analyses run for each new transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    SpendingSpike,
    NewMerchant,
    LargeTransaction,
    BudgetThreshold,
}

impl AnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisKind::SpendingSpike => "spending_spike",
            AnalysisKind::NewMerchant => "new_merchant",
            AnalysisKind::LargeTransaction => "large_transaction",
            AnalysisKind::BudgetThreshold => "budget_threshold",
        }
    }
}

/// What a successful analysis decided
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Fired(NotificationTrigger),
    Quiet,
}

impl Outcome {
    pub fn trigger(&self) -> Option<&NotificationTrigger> {
        match self {
            Outcome::Fired(trigger) => Some(trigger),
            Outcome::Quiet => None,
        }
    }

    pub fn is_fired(&self) -> bool {
        matches!(self, Outcome::Fired(_))
    }
}

/// Why an analysis produced nothing
#[derive(Error, Debug)]
pub enum SkipReason {
    /// Not enough history to judge; never an error
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// No budget / preferences configured; never an error
    #[error("missing configuration: {0}")]
    MissingConfiguration(String),

    /// Timeout or lost compare-and-set race
    #[error("transient failure: {0}")]
    Transient(Error),

    #[error("failed: {0}")]
    Failed(Error),
}

impl SkipReason {
    pub fn insufficient(msg: impl Into<String>) -> Self {
        Self::InsufficientData(msg.into())
    }

    pub fn missing(msg: impl Into<String>) -> Self {
        Self::MissingConfiguration(msg.into())
    }

    /// Silent reasons are expected outcomes rather than failures
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            SkipReason::InsufficientData(_) | SkipReason::MissingConfiguration(_)
        )
    }
}

impl From<Error> for SkipReason {
    fn from(err: Error) -> Self {
        if err.is_transient() {
            SkipReason::Transient(err)
        } else {
            SkipReason::Failed(err)
        }
    }
}

/// Result of a single analysis
pub type AnalysisResult = std::result::Result<Outcome, SkipReason>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_keeps_transient_apart() {
        assert!(matches!(SkipReason::from(Error::Timeout(10)), SkipReason::Transient(_)));
        assert!(matches!(
            SkipReason::from(Error::database("disk full")),
            SkipReason::Failed(_)
        ));
        assert!(SkipReason::insufficient("3 transactions").is_silent());
        assert!(!SkipReason::Failed(Error::Other("x".into())).is_silent());
    }
}
