//! Core domain entities
//!
//! All business entities are defined here. These are pure data structures
//! with validation logic - no I/O or external dependencies.

pub mod alert_state;
pub mod analysis;
mod budget;
mod goal;
mod preferences;
pub mod result;
mod transaction;
mod trigger;
mod user;

pub use alert_state::{AlertStateKey, BillingPeriod, BudgetAlertState, VersionedAlertState};
pub use analysis::{AnalysisKind, AnalysisResult, Outcome, SkipReason};
pub use budget::{Budget, BudgetLimit};
pub use goal::{Goal, GoalSignals, GoalStatus};
pub use preferences::{NotificationSettings, TypeSetting, UserPreferences};
pub use transaction::{format_money, total_amount, Transaction};
pub use trigger::{NotificationTrigger, TriggerSource, TriggerType};
pub use user::User;
