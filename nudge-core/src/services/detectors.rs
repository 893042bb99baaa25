//! Anomaly detectors
//!
//! The scoring functions are pure: they take the triggering transaction
//! and whatever history the loader fetched, and decide. `AnomalyDetectors`
//! does the fetching.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Days;
use rust_decimal::Decimal;

use crate::domain::{
    format_money, total_amount, AnalysisResult, NotificationTrigger, Outcome, SkipReason, Transaction,
    TriggerSource, TriggerType,
};
use crate::ports::{Gateway, TransactionFilter};
use crate::services::deadline::within;

/// Trailing window for the spike detector in calendar days, transaction date included
pub const SPIKE_WINDOW_DAYS: u64 = 30;
/// Fewest transactions either statistical detector will judge
pub const MIN_HISTORY: usize = 5;
/// Comparison set size for the large-transaction detector
pub const LARGE_TX_LOOKBACK: usize = 20;

const SPIKE_FACTOR: Decimal = Decimal::TWO;
const SPIKE_FLOOR: Decimal = Decimal::from_parts(50, 0, 0, false, 0);
const LARGE_TX_FACTOR: Decimal = Decimal::from_parts(3, 0, 0, false, 0);
const LARGE_TX_FLOOR: Decimal = Decimal::ONE_HUNDRED;

/// Day total on the transaction date against the average active day.
///
/// `window` holds the user's transactions in `[date - 29, date]`,
/// including `tx` itself.
pub fn detect_spending_spike(tx: &Transaction, window: &[Transaction]) -> AnalysisResult {
    if window.len() < MIN_HISTORY {
        return Err(SkipReason::insufficient(format!(
            "{} transactions in the last {} days",
            window.len(),
            SPIKE_WINDOW_DAYS
        )));
    }

    let active_days: HashSet<_> = window.iter().map(|t| t.date).collect();
    let avg_daily = total_amount(window) / Decimal::from(active_days.len());
    let today_total = total_amount(window.iter().filter(|t| t.date == tx.date));

    if today_total > SPIKE_FACTOR * avg_daily && today_total > SPIKE_FLOOR {
        let trigger = NotificationTrigger::new(
            &tx.user_id,
            TriggerType::UnusualPattern,
            "spending_spike",
            TriggerSource::TransactionEvent,
        )
        .with("amount", format_money(today_total))
        .with("category", tx.category.as_str())
        .with("date", tx.date.to_string());
        Ok(Outcome::Fired(trigger))
    } else {
        Ok(Outcome::Quiet)
    }
}

/// Fires when the user has never paid this merchant before
pub fn detect_new_merchant(tx: &Transaction, prior_count: usize) -> AnalysisResult {
    if !tx.has_merchant() {
        return Err(SkipReason::insufficient("transaction has no merchant"));
    }
    if prior_count > 0 {
        return Ok(Outcome::Quiet);
    }

    let trigger = NotificationTrigger::new(
        &tx.user_id,
        TriggerType::UnusualPattern,
        "new_merchant",
        TriggerSource::TransactionEvent,
    )
    .with("merchant", tx.merchant.as_str())
    .with("category", tx.category.as_str())
    .with("amount", format_money(tx.amount));
    Ok(Outcome::Fired(trigger))
}

/// Amount against the average of recent same-category transactions
pub fn detect_large_transaction(tx: &Transaction, comparisons: &[Transaction]) -> AnalysisResult {
    if comparisons.len() < MIN_HISTORY {
        return Err(SkipReason::insufficient(format!(
            "{} earlier '{}' transactions",
            comparisons.len(),
            tx.category
        )));
    }

    let avg = total_amount(comparisons) / Decimal::from(comparisons.len());

    if tx.amount > LARGE_TX_FACTOR * avg && tx.amount > LARGE_TX_FLOOR {
        let trigger = NotificationTrigger::new(
            &tx.user_id,
            TriggerType::UnusualPattern,
            "large_transaction",
            TriggerSource::TransactionEvent,
        )
        .with("amount", format_money(tx.amount))
        .with("category", tx.category.as_str())
        .with("avg_amount", format_money(avg));
        Ok(Outcome::Fired(trigger))
    } else {
        Ok(Outcome::Quiet)
    }
}

/// Loads history through the gateway and runs the scoring functions
pub struct AnomalyDetectors {
    gateway: Arc<dyn Gateway>,
    timeout: Duration,
}

impl AnomalyDetectors {
    pub fn new(gateway: Arc<dyn Gateway>, timeout: Duration) -> Self {
        Self { gateway, timeout }
    }

    pub async fn spending_spike(&self, tx: &Transaction) -> AnalysisResult {
        let start = tx
            .date
            .checked_sub_days(Days::new(SPIKE_WINDOW_DAYS - 1))
            .unwrap_or(tx.date);
        let filter = TransactionFilter::new().between(start, tx.date);
        let mut window =
            within(self.timeout, self.gateway.get_transactions(&tx.user_id, &filter)).await?;

        // The event may be delivered before the store sees the row
        if !window.iter().any(|t| t.id == tx.id) {
            window.push(tx.clone());
        }

        detect_spending_spike(tx, &window)
    }

    pub async fn new_merchant(&self, tx: &Transaction) -> AnalysisResult {
        if !tx.has_merchant() {
            return detect_new_merchant(tx, 0);
        }
        let filter = TransactionFilter::new()
            .merchant(&tx.merchant)
            .excluding(tx.id)
            .limit(1);
        let prior = within(self.timeout, self.gateway.get_transactions(&tx.user_id, &filter)).await?;
        detect_new_merchant(tx, prior.len())
    }

    pub async fn large_transaction(&self, tx: &Transaction) -> AnalysisResult {
        let filter = TransactionFilter::new()
            .category(&tx.category)
            .excluding(tx.id)
            .newest_first()
            .limit(LARGE_TX_LOOKBACK);
        let comparisons =
            within(self.timeout, self.gateway.get_transactions(&tx.user_id, &filter)).await?;
        detect_large_transaction(tx, &comparisons)
    }
}
