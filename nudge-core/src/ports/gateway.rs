//! Gateway port - datastore abstraction

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::domain::result::Result;
use crate::domain::{
    AlertStateKey, Budget, BudgetAlertState, Goal, GoalSignals, Transaction, UserPreferences,
    VersionedAlertState,
};

/// Filters for transaction queries. Unset fields do not restrict.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    /// Inclusive
    pub start_date: Option<NaiveDate>,
    /// Inclusive
    pub end_date: Option<NaiveDate>,
    pub category: Option<String>,
    pub merchant: Option<String>,
    /// Leave one transaction out (usually the one being analyzed)
    pub exclude_id: Option<Uuid>,
    pub limit: Option<usize>,
    /// Order by date descending instead of ascending
    pub newest_first: bool,
}

impl TransactionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to an inclusive date range
    pub fn between(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn merchant(mut self, merchant: impl Into<String>) -> Self {
        self.merchant = Some(merchant.into());
        self
    }

    pub fn excluding(mut self, id: Uuid) -> Self {
        self.exclude_id = Some(id);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }
}

/// Datastore gateway
///
/// The engine reads everything it needs through this trait and owns only
/// two writes: the versioned budget alert state and the goal celebration
/// flag. Both are conditional so concurrent callers cannot double-fire,
/// and both can be undone when the trigger they guard fails to record.
#[async_trait]
pub trait Gateway: Send + Sync {
    // === Transactions ===

    /// Transactions of one user matching the filter
    async fn get_transactions(
        &self,
        user_id: &str,
        filter: &TransactionFilter,
    ) -> Result<Vec<Transaction>>;

    // === Documents ===

    /// Budget document, `None` if the user never configured one
    async fn get_budget(&self, user_id: &str) -> Result<Option<Budget>>;

    /// Notification preferences, `None` if absent
    async fn get_preferences(&self, user_id: &str) -> Result<Option<UserPreferences>>;

    // === Goals ===

    async fn get_goals(&self, user_id: &str) -> Result<Vec<Goal>>;

    /// Achievement / streak signals from the goal-tracking collaborator
    async fn get_goal_signals(&self, user_id: &str) -> Result<GoalSignals>;

    /// Flip `celebration_sent` from false to true.
    ///
    /// Returns `false` if the flag was already set (someone else celebrated).
    async fn set_goal_celebrated(&self, user_id: &str, goal_id: &str) -> Result<bool>;

    /// Flip `celebration_sent` back from true to false after the milestone
    /// trigger could not be recorded, so a later run celebrates again.
    async fn reset_goal_celebrated(&self, user_id: &str, goal_id: &str) -> Result<bool>;

    // === Budget alert state ===

    async fn get_alert_state(&self, key: &AlertStateKey) -> Result<Option<VersionedAlertState>>;

    /// Compare-and-set write of the alert state.
    ///
    /// `expected_version` is `None` when the caller saw no row. Returns
    /// `false` without writing if the stored version no longer matches.
    /// A new row starts at version 1; every successful write adds one.
    async fn put_alert_state(
        &self,
        key: &AlertStateKey,
        state: &BudgetAlertState,
        expected_version: Option<i64>,
    ) -> Result<bool>;

    /// Undo a claim made by [`Gateway::put_alert_state`] whose trigger was
    /// never recorded.
    ///
    /// Restores `previous` (or removes the row when there was none) only if
    /// the stored version is still `claimed_version`; returns `false` when
    /// another writer has moved on.
    async fn release_alert_state(
        &self,
        key: &AlertStateKey,
        claimed_version: i64,
        previous: Option<&BudgetAlertState>,
    ) -> Result<bool>;

    // === Users ===

    async fn list_active_users(&self) -> Result<Vec<String>>;

    // === Retention ===

    /// Delete at most `limit` triggers older than `cutoff`, returning how many went
    async fn delete_triggers_before(&self, cutoff: DateTime<Utc>, limit: usize) -> Result<u64>;
}
