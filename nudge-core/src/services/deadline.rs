//! Time limits for gateway and log calls, and the single write retry

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::domain::result::{Error, Result};
use crate::domain::NotificationTrigger;
use crate::ports::TriggerLog;

/// Await `fut`, turning an elapsed deadline into `Error::Timeout`
pub(crate) async fn within<T, F>(limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(limit.as_millis() as u64)),
    }
}

/// Append a trigger under a deadline, retrying once after a transient failure
pub(crate) async fn record(
    log: &dyn TriggerLog,
    limit: Duration,
    trigger: &NotificationTrigger,
) -> Result<()> {
    match within(limit, log.append_trigger(trigger)).await {
        Err(e) if e.is_transient() => {
            warn!(
                user_id = %trigger.user_id,
                trigger = %trigger.kind(),
                error = %e,
                "Trigger append failed, retrying once"
            );
            within(limit, log.append_trigger(trigger)).await
        }
        other => other,
    }
}
