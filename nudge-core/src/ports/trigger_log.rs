//! Notification trigger log port

use async_trait::async_trait;

use crate::domain::result::Result;
use crate::domain::NotificationTrigger;

/// Append-only log of notification decisions.
///
/// The delivery collaborator reads from here; entries are never updated.
#[async_trait]
pub trait TriggerLog: Send + Sync {
    async fn append_trigger(&self, trigger: &NotificationTrigger) -> Result<()>;

    /// Most recent triggers first, optionally for one user
    async fn recent_triggers(
        &self,
        user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<NotificationTrigger>>;
}
