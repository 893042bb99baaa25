//! Bounded per-user fan-out for scheduled jobs

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::domain::result::Result;
use crate::services::deadline::within;

/// How one user's share of a job ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserOutcome {
    Processed { triggers: usize },
    /// Nothing to do for this user (disabled type, no data)
    Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanOutTally {
    pub users: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub triggers_emitted: usize,
}

/// Runs one unit of work per user, at most `pool_size` at a time
#[derive(Debug, Clone, Copy)]
pub struct FanOut {
    pool_size: usize,
    user_timeout: Duration,
}

impl FanOut {
    pub fn new(pool_size: usize, user_timeout: Duration) -> Self {
        Self {
            pool_size: pool_size.max(1),
            user_timeout,
        }
    }

    /// Process every user. Errors, timeouts and panics are counted per user
    /// and never cut the batch short.
    pub async fn run<F, Fut>(&self, job: &'static str, users: Vec<String>, work: F) -> FanOutTally
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<UserOutcome>> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.pool_size));
        let mut tasks = JoinSet::new();
        let mut tally = FanOutTally {
            users: users.len(),
            ..FanOutTally::default()
        };

        for user_id in users {
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(job, user_id = %user_id, error = %e, "Worker pool closed");
                    tally.failed += 1;
                    continue;
                }
            };

            let unit = work(user_id.clone());
            let limit = self.user_timeout;
            tasks.spawn(async move {
                let _permit = permit;
                let result = within(limit, unit).await;
                (user_id, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((user_id, Ok(UserOutcome::Processed { triggers }))) => {
                    debug!(job, user_id = %user_id, triggers, "User processed");
                    tally.succeeded += 1;
                    tally.triggers_emitted += triggers;
                }
                Ok((user_id, Ok(UserOutcome::Skipped))) => {
                    debug!(job, user_id = %user_id, "User skipped");
                    tally.skipped += 1;
                }
                Ok((user_id, Err(e))) => {
                    error!(job, user_id = %user_id, error = %e, "User failed");
                    tally.failed += 1;
                }
                Err(e) => {
                    error!(job, error = %e, "User task aborted");
                    tally.failed += 1;
                }
            }
        }

        tally
    }
}
