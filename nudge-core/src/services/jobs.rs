//! Scheduled jobs - daily encouragement, weekly summaries, monthly retention

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::domain::result::{Error, Result};
use crate::domain::{
    format_money, total_amount, Budget, NotificationTrigger, Transaction, TriggerSource,
    TriggerType,
};
use crate::ports::{Gateway, TransactionFilter, TriggerLog};
use crate::services::deadline::{record, within};
use crate::services::fanout::{FanOut, FanOutTally, UserOutcome};
use crate::services::threshold::percentage_of;

/// Rate reported when the user has a budget but no category has a limit
const RATE_WITHOUT_LIMITS: i64 = 75;
/// Rate reported when the budget is missing or could not be read
const RATE_WITHOUT_BUDGET: i64 = 50;
/// Rates at or above this get the positive weekly template
const POSITIVE_RATE: i64 = 70;
/// Weekly window length, today included
const WEEK_DAYS: u64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Daily,
    Weekly,
    Monthly,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Daily => "daily",
            JobKind::Weekly => "weekly",
            JobKind::Monthly => "monthly",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one job run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub job: JobKind,
    pub users: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub triggers_emitted: usize,
    /// Rows removed by retention (monthly only)
    pub deleted: u64,
}

impl JobSummary {
    fn from_tally(job: JobKind, tally: FanOutTally) -> Self {
        Self {
            job,
            users: tally.users,
            succeeded: tally.succeeded,
            skipped: tally.skipped,
            failed: tally.failed,
            triggers_emitted: tally.triggers_emitted,
            deleted: 0,
        }
    }
}

/// What each per-user unit needs; cloned into every spawned task
#[derive(Clone)]
struct UserJob {
    gateway: Arc<dyn Gateway>,
    log: Arc<dyn TriggerLog>,
    timeout: Duration,
}

impl UserJob {
    async fn append(&self, trigger: NotificationTrigger) -> Result<()> {
        record(self.log.as_ref(), self.timeout, &trigger).await
    }

    async fn daily(self, user_id: String) -> Result<UserOutcome> {
        let prefs = within(self.timeout, self.gateway.get_preferences(&user_id))
            .await?
            .unwrap_or_default();
        if !prefs.allows(TriggerType::Encouragement.as_str()) {
            return Ok(UserOutcome::Skipped);
        }

        let signals = within(self.timeout, self.gateway.get_goal_signals(&user_id)).await?;
        let trigger = if !signals.recent_achievements.is_empty() {
            NotificationTrigger::new(
                &user_id,
                TriggerType::Encouragement,
                "achievement",
                TriggerSource::DailyJob,
            )
            .with("achievements", signals.recent_achievements.clone())
        } else if signals.has_active_streak() {
            NotificationTrigger::new(
                &user_id,
                TriggerType::GoalAchievement,
                "streak",
                TriggerSource::DailyJob,
            )
            .with("streak_days", signals.current_streak_days)
        } else {
            NotificationTrigger::new(
                &user_id,
                TriggerType::Encouragement,
                "daily",
                TriggerSource::DailyJob,
            )
        };
        self.append(trigger).await?;
        let mut triggers = 1;

        let goals = within(self.timeout, self.gateway.get_goals(&user_id)).await?;
        for goal in goals.iter().filter(|g| g.awaiting_celebration()) {
            // Claim first; a concurrent run that loses the flip stays quiet
            let claimed = within(
                self.timeout,
                self.gateway.set_goal_celebrated(&user_id, &goal.goal_id),
            )
            .await?;
            if !claimed {
                continue;
            }
            let trigger = NotificationTrigger::new(
                &user_id,
                TriggerType::GoalAchievement,
                "milestone",
                TriggerSource::DailyJob,
            )
            .with("goal_id", goal.goal_id.as_str())
            .with("goal_name", goal.name.as_str());

            if let Err(e) = self.append(trigger).await {
                // Hand the goal back so the next run celebrates it
                let reset = within(
                    self.timeout,
                    self.gateway.reset_goal_celebrated(&user_id, &goal.goal_id),
                )
                .await;
                if let Err(reset_err) = reset {
                    warn!(
                        user_id = %user_id,
                        goal_id = %goal.goal_id,
                        error = %reset_err,
                        "Could not reset celebration flag"
                    );
                }
                return Err(e);
            }
            triggers += 1;
        }

        Ok(UserOutcome::Processed { triggers })
    }

    async fn weekly(self, user_id: String, today: NaiveDate) -> Result<UserOutcome> {
        let prefs = within(self.timeout, self.gateway.get_preferences(&user_id))
            .await?
            .unwrap_or_default();
        if !prefs.allows(TriggerType::WeeklySummary.as_str()) {
            return Ok(UserOutcome::Skipped);
        }

        let start = today
            .checked_sub_days(Days::new(WEEK_DAYS - 1))
            .ok_or_else(|| Error::validation(format!("no week before {}", today)))?;
        let filter = TransactionFilter::new().between(start, today);
        let txs = within(self.timeout, self.gateway.get_transactions(&user_id, &filter)).await?;
        if txs.is_empty() {
            return Ok(UserOutcome::Skipped);
        }

        let success_rate = match within(self.timeout, self.gateway.get_budget(&user_id)).await {
            Ok(Some(budget)) => budget_success_rate(&budget, &txs),
            Ok(None) => RATE_WITHOUT_BUDGET,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Budget unreadable, using neutral rate");
                RATE_WITHOUT_BUDGET
            }
        };
        let template = if success_rate >= POSITIVE_RATE {
            "positive"
        } else {
            "encouraging"
        };

        let mut trigger = NotificationTrigger::new(
            &user_id,
            TriggerType::WeeklySummary,
            template,
            TriggerSource::WeeklyJob,
        )
        .with("total_spent", format_money(total_amount(&txs)))
        .with("success_rate", success_rate)
        .with("transaction_count", txs.len());
        if let Some(category) = top_category(&txs) {
            trigger = trigger.with("top_category", category);
        }

        self.append(trigger).await?;
        Ok(UserOutcome::Processed { triggers: 1 })
    }
}

/// Share of budgeted categories whose spend stayed within the limit, 0..=100.
///
/// Every category with a limit counts, zero included.
pub fn budget_success_rate(budget: &Budget, txs: &[Transaction]) -> i64 {
    let limited: Vec<(String, Decimal)> = budget
        .categories
        .iter()
        .map(|(name, b)| (Transaction::normalize_label(name), b.limit))
        .collect();
    if limited.is_empty() {
        return RATE_WITHOUT_LIMITS;
    }

    let within_limit = limited
        .iter()
        .filter(|(category, limit)| {
            total_amount(txs.iter().filter(|t| &t.category == category)) <= *limit
        })
        .count();

    percentage_of(Decimal::from(within_limit), Decimal::from(limited.len()))
        .unwrap_or(RATE_WITHOUT_LIMITS)
}

/// Category with the largest spend; ties go to the alphabetically first
pub fn top_category(txs: &[Transaction]) -> Option<String> {
    let mut by_category: BTreeMap<&str, Decimal> = BTreeMap::new();
    for tx in txs {
        *by_category.entry(tx.category.as_str()).or_default() += tx.amount;
    }

    let mut top: Option<(&str, Decimal)> = None;
    for (category, spent) in by_category {
        if top.map_or(true, |(_, best)| spent > best) {
            top = Some((category, spent));
        }
    }
    top.map(|(category, _)| category.to_string())
}

/// Runs the scheduled jobs over all active users
pub struct JobService {
    gateway: Arc<dyn Gateway>,
    log: Arc<dyn TriggerLog>,
    fanout: FanOut,
    gateway_timeout: Duration,
    retention_months: u32,
    retention_batch_size: usize,
}

impl JobService {
    pub fn new(gateway: Arc<dyn Gateway>, log: Arc<dyn TriggerLog>, config: &Config) -> Self {
        Self {
            gateway,
            log,
            fanout: FanOut::new(config.worker_pool_size, config.user_timeout()),
            gateway_timeout: config.gateway_timeout(),
            retention_months: config.retention_months,
            retention_batch_size: config.retention_batch_size,
        }
    }

    fn user_job(&self) -> UserJob {
        UserJob {
            gateway: Arc::clone(&self.gateway),
            log: Arc::clone(&self.log),
            timeout: self.gateway_timeout,
        }
    }

    async fn active_users(&self) -> Result<Vec<String>> {
        within(self.gateway_timeout, self.gateway.list_active_users()).await
    }

    /// Encouragement and goal milestones for every active user
    pub async fn run_daily(&self) -> Result<JobSummary> {
        let users = self.active_users().await?;
        let job = self.user_job();
        let tally = self
            .fanout
            .run(JobKind::Daily.as_str(), users, move |user_id| {
                job.clone().daily(user_id)
            })
            .await;

        let summary = JobSummary::from_tally(JobKind::Daily, tally);
        log_summary(&summary);
        Ok(summary)
    }

    /// Weekly summaries for the seven days ending today
    pub async fn run_weekly(&self) -> Result<JobSummary> {
        self.run_weekly_at(Utc::now().date_naive()).await
    }

    pub async fn run_weekly_at(&self, today: NaiveDate) -> Result<JobSummary> {
        let users = self.active_users().await?;
        let job = self.user_job();
        let tally = self
            .fanout
            .run(JobKind::Weekly.as_str(), users, move |user_id| {
                job.clone().weekly(user_id, today)
            })
            .await;

        let summary = JobSummary::from_tally(JobKind::Weekly, tally);
        log_summary(&summary);
        Ok(summary)
    }

    /// Delete triggers older than the retention window
    pub async fn run_monthly(&self) -> Result<JobSummary> {
        self.run_monthly_at(Utc::now()).await
    }

    pub async fn run_monthly_at(&self, now: DateTime<Utc>) -> Result<JobSummary> {
        let cutoff = now
            .checked_sub_months(Months::new(self.retention_months))
            .ok_or_else(|| Error::validation(format!("no retention cutoff before {}", now)))?;

        let mut deleted = 0;
        loop {
            let batch = within(
                self.gateway_timeout,
                self.gateway
                    .delete_triggers_before(cutoff, self.retention_batch_size),
            )
            .await?;
            deleted += batch;
            if batch < self.retention_batch_size as u64 {
                break;
            }
        }

        let summary = JobSummary {
            job: JobKind::Monthly,
            users: 0,
            succeeded: 0,
            skipped: 0,
            failed: 0,
            triggers_emitted: 0,
            deleted,
        };
        log_summary(&summary);
        Ok(summary)
    }
}

fn log_summary(summary: &JobSummary) {
    info!(
        job = %summary.job,
        users = summary.users,
        succeeded = summary.succeeded,
        skipped = summary.skipped,
        failed = summary.failed,
        triggers = summary.triggers_emitted,
        deleted = summary.deleted,
        "Job finished"
    );
}
