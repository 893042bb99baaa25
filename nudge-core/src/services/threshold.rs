//! Threshold tracker - budget band crossings with per-period dedup
//!
//! One alert state per (user, category, month). A crossing fires only after
//! the state has been claimed with a compare-and-set on its version, so two
//! concurrent evaluations of the same crossing produce a single trigger.
//! The tracker records its own trigger; if that write fails the claim is
//! released so the next transaction can fire the crossing again.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::{debug, warn};

use crate::domain::result::Error;
use crate::domain::{
    format_money, total_amount, AlertStateKey, AnalysisResult, BillingPeriod, BudgetAlertState,
    NotificationTrigger, Outcome, SkipReason, Transaction, TriggerSource, TriggerType,
};
use crate::ports::{Gateway, TransactionFilter, TriggerLog};
use crate::services::deadline::{record, within};

pub const APPROACHING_PERCENT: i64 = 80;
pub const EXCEEDED_PERCENT: i64 = 100;

/// Number of compare-and-set attempts before giving up as transient
const CAS_ATTEMPTS: usize = 2;

/// Band a new percentage crosses into, given the last alerted percentage.
///
/// Exceeded is checked first: a jump from below 80 straight past 100
/// reports only `exceeded`.
pub fn crossing(percentage: i64, last_percentage: i64) -> Option<&'static str> {
    if percentage >= EXCEEDED_PERCENT && last_percentage < EXCEEDED_PERCENT {
        Some("exceeded")
    } else if percentage >= APPROACHING_PERCENT && last_percentage < APPROACHING_PERCENT {
        Some("approaching")
    } else {
        None
    }
}

/// `round(100 * spent / limit)`, half away from zero
pub fn percentage_of(spent: Decimal, limit: Decimal) -> Option<i64> {
    if limit <= Decimal::ZERO {
        return None;
    }
    spent
        .checked_mul(Decimal::ONE_HUNDRED)?
        .checked_div(limit)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

pub struct ThresholdTracker {
    gateway: Arc<dyn Gateway>,
    log: Arc<dyn TriggerLog>,
    timeout: Duration,
}

impl ThresholdTracker {
    pub fn new(gateway: Arc<dyn Gateway>, log: Arc<dyn TriggerLog>, timeout: Duration) -> Self {
        Self {
            gateway,
            log,
            timeout,
        }
    }

    /// Evaluate the category budget of `tx` for the month it falls in.
    ///
    /// A fired trigger is already in the log when this returns.
    pub async fn evaluate(&self, tx: &Transaction) -> AnalysisResult {
        let budget = within(self.timeout, self.gateway.get_budget(&tx.user_id)).await?;
        let limit = budget
            .and_then(|b| b.limit_for(&tx.category))
            .ok_or_else(|| SkipReason::missing(format!("no budget for '{}'", tx.category)))?;

        let period = BillingPeriod::containing(tx.date);
        let filter = TransactionFilter::new()
            .between(period.first_day(), period.last_day())
            .category(&tx.category);
        let spent_txs =
            within(self.timeout, self.gateway.get_transactions(&tx.user_id, &filter)).await?;
        let spent = total_amount(&spent_txs);

        let percentage = percentage_of(spent, limit).ok_or_else(|| {
            SkipReason::Failed(Error::validation(format!(
                "cannot compute percentage of {} against {}",
                spent, limit
            )))
        })?;

        let key = AlertStateKey::new(&tx.user_id, &tx.category, period);

        for attempt in 1..=CAS_ATTEMPTS {
            let current = within(self.timeout, self.gateway.get_alert_state(&key)).await?;
            let last = current.as_ref().map(|c| c.state.last_percentage).unwrap_or(0);

            let Some(template) = crossing(percentage, last) else {
                return Ok(Outcome::Quiet);
            };

            let state = BudgetAlertState {
                last_percentage: percentage,
                last_alert_date: Utc::now(),
            };
            let expected = current.as_ref().map(|c| c.version);
            let previous = current.map(|c| c.state);
            let claimed = within(
                self.timeout,
                self.gateway.put_alert_state(&key, &state, expected),
            )
            .await?;

            if claimed {
                let trigger = NotificationTrigger::new(
                    &tx.user_id,
                    TriggerType::SpendingAlert,
                    template,
                    TriggerSource::TransactionEvent,
                )
                .with("category", tx.category.as_str())
                .with("percentage", percentage)
                .with("amount_spent", format_money(spent))
                .with("budget_limit", format_money(limit));

                if let Err(e) = record(self.log.as_ref(), self.timeout, &trigger).await {
                    let claimed_version = expected.map_or(1, |v| v + 1);
                    self.release(&key, claimed_version, previous.as_ref()).await;
                    return Err(SkipReason::Transient(e));
                }
                return Ok(Outcome::Fired(trigger));
            }

            debug!(
                user_id = %tx.user_id,
                category = %tx.category,
                period = %period,
                attempt,
                "Alert state changed underneath us, re-reading"
            );
        }

        Err(SkipReason::Transient(Error::Conflict(format!(
            "alert state {}/{}/{}",
            tx.user_id, tx.category, period
        ))))
    }

    async fn release(
        &self,
        key: &AlertStateKey,
        claimed_version: i64,
        previous: Option<&BudgetAlertState>,
    ) {
        let released = within(
            self.timeout,
            self.gateway.release_alert_state(key, claimed_version, previous),
        )
        .await;
        match released {
            Ok(true) => debug!(
                user_id = %key.user_id,
                category = %key.category,
                period = %key.period,
                "Released alert state after failed append"
            ),
            Ok(false) => debug!(
                user_id = %key.user_id,
                category = %key.category,
                period = %key.period,
                "Alert state moved on before release"
            ),
            Err(e) => warn!(
                user_id = %key.user_id,
                category = %key.category,
                period = %key.period,
                error = %e,
                "Could not release alert state"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::duckdb::DuckDbGateway;
    use crate::domain::result::Result;
    use crate::domain::Budget;
    use async_trait::async_trait;
    use chrono::NaiveDate;

    fn tx(amount: i64, day: u32) -> Transaction {
        Transaction::new(
            "u1",
            NaiveDate::from_ymd_opt(2024, 2, day).unwrap(),
            Decimal::from(amount),
            "dining",
            "Cafe",
        )
    }

    fn setup(limit: Option<i64>) -> (Arc<DuckDbGateway>, ThresholdTracker) {
        let gateway = Arc::new(DuckDbGateway::in_memory().unwrap());
        if let Some(limit) = limit {
            gateway
                .put_budget("u1", &Budget::new().with_limit("dining", Decimal::from(limit)))
                .unwrap();
        }
        let tracker =
            ThresholdTracker::new(gateway.clone(), gateway.clone(), Duration::from_secs(5));
        (gateway, tracker)
    }

    #[test]
    fn test_crossing_bands() {
        assert_eq!(crossing(79, 0), None);
        assert_eq!(crossing(80, 0), Some("approaching"));
        assert_eq!(crossing(95, 85), None);
        assert_eq!(crossing(100, 85), Some("exceeded"));
        assert_eq!(crossing(110, 60), Some("exceeded"));
        assert_eq!(crossing(150, 110), None);
    }

    #[test]
    fn test_percentage_rounds_half_away_from_zero() {
        assert_eq!(percentage_of(Decimal::new(7950, 2), Decimal::from(100)), Some(80));
        assert_eq!(percentage_of(Decimal::new(7949, 2), Decimal::from(100)), Some(79));
        assert_eq!(percentage_of(Decimal::from(5), Decimal::ZERO), None);
    }

    #[tokio::test]
    async fn test_no_budget_is_missing_configuration() {
        let (gateway, tracker) = setup(None);
        let t = tx(500, 3);
        gateway.insert_transaction(&t).unwrap();

        let result = tracker.evaluate(&t).await;
        assert!(matches!(result, Err(SkipReason::MissingConfiguration(_))));
    }

    #[tokio::test]
    async fn test_each_band_fires_once_per_month() {
        let (gateway, tracker) = setup(Some(100));
        let mut fired = Vec::new();

        for (amount, day) in [(50, 1), (35, 2), (5, 3), (15, 4), (20, 5)] {
            let t = tx(amount, day);
            gateway.insert_transaction(&t).unwrap();
            if let Ok(Outcome::Fired(trigger)) = tracker.evaluate(&t).await {
                fired.push(trigger.template_key);
            }
        }

        assert_eq!(fired, vec!["approaching", "exceeded"]);
    }

    #[tokio::test]
    async fn test_jump_past_both_bands_fires_exceeded_only() {
        let (gateway, tracker) = setup(Some(100));
        let first = tx(60, 1);
        gateway.insert_transaction(&first).unwrap();
        assert!(matches!(tracker.evaluate(&first).await, Ok(Outcome::Quiet)));

        let second = tx(50, 2);
        gateway.insert_transaction(&second).unwrap();
        let trigger = match tracker.evaluate(&second).await {
            Ok(Outcome::Fired(trigger)) => trigger,
            other => panic!("expected a trigger, got {:?}", other),
        };
        assert_eq!(trigger.template_key, "exceeded");
        assert_eq!(trigger.data["percentage"], 110);
        assert_eq!(trigger.data["amount_spent"], "110.00");
        assert_eq!(trigger.data["budget_limit"], "100.00");

        let third = tx(1, 3);
        gateway.insert_transaction(&third).unwrap();
        assert!(matches!(tracker.evaluate(&third).await, Ok(Outcome::Quiet)));
    }

    #[tokio::test]
    async fn test_new_month_resets_bands() {
        let (gateway, tracker) = setup(Some(100));
        let feb = tx(90, 20);
        gateway.insert_transaction(&feb).unwrap();
        assert!(tracker.evaluate(&feb).await.unwrap().is_fired());

        let march = Transaction::new(
            "u1",
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            Decimal::from(85),
            "dining",
            "Cafe",
        );
        gateway.insert_transaction(&march).unwrap();
        let outcome = tracker.evaluate(&march).await.unwrap();
        assert_eq!(outcome.trigger().unwrap().template_key, "approaching");
    }

    struct DownLog;

    #[async_trait]
    impl TriggerLog for DownLog {
        async fn append_trigger(&self, _trigger: &NotificationTrigger) -> Result<()> {
            Err(Error::Timeout(1))
        }

        async fn recent_triggers(
            &self,
            _user_id: Option<&str>,
            _limit: usize,
        ) -> Result<Vec<NotificationTrigger>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_failed_append_releases_fresh_claim() {
        let (gateway, tracker) = setup(Some(100));
        let broken =
            ThresholdTracker::new(gateway.clone(), Arc::new(DownLog), Duration::from_secs(5));

        let first = tx(85, 1);
        gateway.insert_transaction(&first).unwrap();
        assert!(matches!(
            broken.evaluate(&first).await,
            Err(SkipReason::Transient(Error::Timeout(1)))
        ));
        let key = AlertStateKey::new("u1", "dining", BillingPeriod::containing(first.date));
        assert!(gateway.load_alert_state(&key).unwrap().is_none());

        let second = tx(5, 2);
        gateway.insert_transaction(&second).unwrap();
        let outcome = tracker.evaluate(&second).await.unwrap();
        assert_eq!(outcome.trigger().unwrap().template_key, "approaching");

        let logged = gateway.load_recent_triggers(Some("u1"), 10).unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].data["percentage"], 90);
    }

    #[tokio::test]
    async fn test_failed_append_restores_previous_band() {
        let (gateway, tracker) = setup(Some(100));
        let broken =
            ThresholdTracker::new(gateway.clone(), Arc::new(DownLog), Duration::from_secs(5));

        let first = tx(85, 1);
        gateway.insert_transaction(&first).unwrap();
        assert!(tracker.evaluate(&first).await.unwrap().is_fired());

        let second = tx(20, 2);
        gateway.insert_transaction(&second).unwrap();
        assert!(broken.evaluate(&second).await.is_err());

        let key = AlertStateKey::new("u1", "dining", BillingPeriod::containing(first.date));
        let stored = gateway.load_alert_state(&key).unwrap().unwrap();
        assert_eq!(stored.state.last_percentage, 85);

        let third = tx(1, 3);
        gateway.insert_transaction(&third).unwrap();
        let outcome = tracker.evaluate(&third).await.unwrap();
        assert_eq!(outcome.trigger().unwrap().template_key, "exceeded");
    }
}
