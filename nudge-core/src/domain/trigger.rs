//! Notification trigger - the decision record handed to delivery

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

/// Kind of notification being requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    SpendingAlert,
    UnusualPattern,
    Encouragement,
    GoalAchievement,
    WeeklySummary,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::SpendingAlert => "spending_alert",
            TriggerType::UnusualPattern => "unusual_pattern",
            TriggerType::Encouragement => "encouragement",
            TriggerType::GoalAchievement => "goal_achievement",
            TriggerType::WeeklySummary => "weekly_summary",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "spending_alert" => Some(TriggerType::SpendingAlert),
            "unusual_pattern" => Some(TriggerType::UnusualPattern),
            "encouragement" => Some(TriggerType::Encouragement),
            "goal_achievement" => Some(TriggerType::GoalAchievement),
            "weekly_summary" => Some(TriggerType::WeeklySummary),
            _ => None,
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What produced the trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    TransactionEvent,
    DailyJob,
    WeeklyJob,
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::TransactionEvent => "transaction_event",
            TriggerSource::DailyJob => "daily_job",
            TriggerSource::WeeklyJob => "weekly_job",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "transaction_event" => Some(TriggerSource::TransactionEvent),
            "daily_job" => Some(TriggerSource::DailyJob),
            "weekly_job" => Some(TriggerSource::WeeklyJob),
            _ => None,
        }
    }
}

/// A recorded decision that a notification should be delivered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationTrigger {
    pub id: Uuid,
    pub user_id: String,
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    pub template_key: String,
    pub data: Map<String, JsonValue>,
    pub timestamp: DateTime<Utc>,
    pub source: TriggerSource,
}

impl NotificationTrigger {
    pub fn new(
        user_id: impl Into<String>,
        trigger_type: TriggerType,
        template_key: impl Into<String>,
        source: TriggerSource,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            trigger_type,
            template_key: template_key.into(),
            data: Map::new(),
            timestamp: Utc::now(),
            source,
        }
    }

    /// Add a payload field
    pub fn with(mut self, key: &str, value: impl Into<JsonValue>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    /// Override the timestamp (used when replaying or backdating)
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// `type/template_key`, handy for logs and assertions
    pub fn kind(&self) -> String {
        format!("{}/{}", self.trigger_type, self.template_key)
    }
}
