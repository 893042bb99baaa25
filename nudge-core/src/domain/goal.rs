//! Savings goals and goal-tracking signals

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    Active,
    Completed,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalStatus::Active => "active",
            GoalStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(GoalStatus::Active),
            "completed" => Some(GoalStatus::Completed),
            _ => None,
        }
    }
}

/// A user goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub goal_id: String,
    pub user_id: String,
    pub name: String,
    pub status: GoalStatus,
    /// Set once the completion has been announced
    pub celebration_sent: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Goal {
    pub fn new(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            goal_id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            name: name.into(),
            status: GoalStatus::Active,
            celebration_sent: false,
            completed_at: None,
        }
    }

    /// Mark the goal completed now
    pub fn complete(mut self) -> Self {
        self.status = GoalStatus::Completed;
        self.completed_at = Some(Utc::now());
        self
    }

    /// Completed but not yet celebrated
    pub fn awaiting_celebration(&self) -> bool {
        self.status == GoalStatus::Completed && !self.celebration_sent
    }
}

/// Progress signals supplied by the goal-tracking collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GoalSignals {
    /// Names of goals achieved recently
    pub recent_achievements: Vec<String>,
    pub current_streak_days: u32,
}

impl GoalSignals {
    pub fn has_active_streak(&self) -> bool {
        self.current_streak_days > 0
    }
}
