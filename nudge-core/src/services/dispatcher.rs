//! Trigger dispatcher - entry point for each new transaction
//!
//! Runs the three anomaly detectors and the threshold tracker side by side.
//! Each analysis ends on its own; a failing one is logged and counted but
//! never stops the others, and nothing is returned to the caller as an error.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{AnalysisKind, AnalysisResult, NotificationTrigger, Outcome, SkipReason, Transaction};
use crate::ports::{Gateway, TriggerLog};
use crate::services::deadline::record;
use crate::services::detectors::AnomalyDetectors;
use crate::services::threshold::ThresholdTracker;

/// Everything one dispatch decided
#[derive(Debug)]
pub struct DispatchReport {
    pub transaction_id: Uuid,
    pub user_id: String,
    pub results: Vec<(AnalysisKind, AnalysisResult)>,
}

/// Counts for logs and CLI output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchCounts {
    pub fired: usize,
    pub quiet: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl DispatchReport {
    pub fn counts(&self) -> DispatchCounts {
        let mut counts = DispatchCounts::default();
        for (_, result) in &self.results {
            match result {
                Ok(Outcome::Fired(_)) => counts.fired += 1,
                Ok(Outcome::Quiet) => counts.quiet += 1,
                Err(reason) if reason.is_silent() => counts.skipped += 1,
                Err(_) => counts.failed += 1,
            }
        }
        counts
    }

    /// Triggers that made it into the log
    pub fn triggers(&self) -> impl Iterator<Item = &NotificationTrigger> {
        self.results
            .iter()
            .filter_map(|(_, result)| result.as_ref().ok().and_then(Outcome::trigger))
    }

    pub fn result(&self, kind: AnalysisKind) -> Option<&AnalysisResult> {
        self.results
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, result)| result)
    }
}

pub struct TriggerDispatcher {
    detectors: AnomalyDetectors,
    tracker: ThresholdTracker,
    log: Arc<dyn TriggerLog>,
    timeout: Duration,
}

impl TriggerDispatcher {
    pub fn new(gateway: Arc<dyn Gateway>, log: Arc<dyn TriggerLog>, timeout: Duration) -> Self {
        Self {
            detectors: AnomalyDetectors::new(Arc::clone(&gateway), timeout),
            tracker: ThresholdTracker::new(gateway, Arc::clone(&log), timeout),
            log,
            timeout,
        }
    }

    /// Analyze a freshly created transaction and record any triggers
    pub async fn on_transaction_created(&self, tx: &Transaction) -> DispatchReport {
        // The tracker records its own trigger so it can release its claim
        let (spike, merchant, large, threshold) = tokio::join!(
            self.settle(
                tx,
                AnalysisKind::SpendingSpike,
                self.recorded(self.detectors.spending_spike(tx)),
            ),
            self.settle(
                tx,
                AnalysisKind::NewMerchant,
                self.recorded(self.detectors.new_merchant(tx)),
            ),
            self.settle(
                tx,
                AnalysisKind::LargeTransaction,
                self.recorded(self.detectors.large_transaction(tx)),
            ),
            self.settle(tx, AnalysisKind::BudgetThreshold, self.tracker.evaluate(tx)),
        );

        let report = DispatchReport {
            transaction_id: tx.id,
            user_id: tx.user_id.clone(),
            results: vec![
                (AnalysisKind::SpendingSpike, spike),
                (AnalysisKind::NewMerchant, merchant),
                (AnalysisKind::LargeTransaction, large),
                (AnalysisKind::BudgetThreshold, threshold),
            ],
        };

        let counts = report.counts();
        debug!(
            user_id = %tx.user_id,
            transaction_id = %tx.id,
            fired = counts.fired,
            skipped = counts.skipped,
            failed = counts.failed,
            "Transaction analyzed"
        );
        report
    }

    /// Append the trigger of a fired detector; a failed append is transient
    async fn recorded<F>(&self, analysis: F) -> AnalysisResult
    where
        F: std::future::Future<Output = AnalysisResult>,
    {
        let outcome = analysis.await?;
        if let Outcome::Fired(trigger) = &outcome {
            record(self.log.as_ref(), self.timeout, trigger)
                .await
                .map_err(SkipReason::Transient)?;
        }
        Ok(outcome)
    }

    /// Await one analysis and log how it ended
    async fn settle<F>(&self, tx: &Transaction, kind: AnalysisKind, analysis: F) -> AnalysisResult
    where
        F: std::future::Future<Output = AnalysisResult>,
    {
        let result = analysis.await;

        match &result {
            Ok(Outcome::Fired(trigger)) => info!(
                user_id = %tx.user_id,
                analysis = kind.as_str(),
                trigger = %trigger.kind(),
                "Trigger recorded"
            ),
            Ok(Outcome::Quiet) => {}
            Err(reason) if reason.is_silent() => debug!(
                user_id = %tx.user_id,
                analysis = kind.as_str(),
                reason = %reason,
                "Analysis skipped"
            ),
            Err(reason) => warn!(
                user_id = %tx.user_id,
                analysis = kind.as_str(),
                error = %reason,
                "Analysis failed"
            ),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::duckdb::DuckDbGateway;
    use crate::domain::{Budget, TriggerType};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn setup() -> (Arc<DuckDbGateway>, TriggerDispatcher) {
        let gateway = Arc::new(DuckDbGateway::in_memory().unwrap());
        let dispatcher = TriggerDispatcher::new(
            gateway.clone(),
            gateway.clone(),
            Duration::from_secs(5),
        );
        (gateway, dispatcher)
    }

    fn tx(amount: i64, day: u32, category: &str, merchant: &str) -> Transaction {
        Transaction::new(
            "u1",
            NaiveDate::from_ymd_opt(2024, 5, day).unwrap(),
            Decimal::from(amount),
            category,
            merchant,
        )
    }

    #[tokio::test]
    async fn test_first_transaction_only_flags_new_merchant() {
        let (gateway, dispatcher) = setup();
        let t = tx(25, 3, "coffee", "Blue Bottle");
        gateway.insert_transaction(&t).unwrap();

        let report = dispatcher.on_transaction_created(&t).await;
        let counts = report.counts();

        assert_eq!(counts.fired, 1);
        assert_eq!(counts.skipped, 3);
        assert_eq!(counts.failed, 0);
        assert!(report.result(AnalysisKind::NewMerchant).unwrap().is_ok());

        let logged = gateway.load_recent_triggers(Some("u1"), 10).unwrap();
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].kind(), "unusual_pattern/new_merchant");
    }

    #[tokio::test]
    async fn test_threshold_and_merchant_fire_together() {
        let (gateway, dispatcher) = setup();
        gateway
            .put_budget("u1", &Budget::new().with_limit("dining", Decimal::from(100)))
            .unwrap();

        let t = tx(85, 7, "dining", "Bistro");
        gateway.insert_transaction(&t).unwrap();
        let report = dispatcher.on_transaction_created(&t).await;

        let mut kinds: Vec<_> = report.triggers().map(|t| t.kind()).collect();
        kinds.sort();
        assert_eq!(
            kinds,
            vec!["spending_alert/approaching", "unusual_pattern/new_merchant"]
        );
        assert!(report
            .triggers()
            .all(|t| t.trigger_type != TriggerType::WeeklySummary));
        assert_eq!(gateway.count_triggers().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_contended_store_times_out_every_analysis() {
        let gateway = Arc::new(DuckDbGateway::in_memory().unwrap());
        let dispatcher = TriggerDispatcher::new(
            gateway.clone(),
            gateway.clone(),
            Duration::from_millis(50),
        );
        let t = tx(40, 9, "dining", "Bistro");
        gateway.insert_transaction(&t).unwrap();

        let holder = gateway.hold_lock(Duration::from_millis(600));
        let started = std::time::Instant::now();
        let report = dispatcher.on_transaction_created(&t).await;
        let elapsed = started.elapsed();
        holder.join().unwrap();

        assert!(elapsed < Duration::from_millis(500), "took {:?}", elapsed);
        assert_eq!(report.counts().failed, 4);
        for (_, result) in &report.results {
            assert!(matches!(
                result,
                Err(SkipReason::Transient(crate::domain::result::Error::Timeout(50)))
            ));
        }
    }
}
