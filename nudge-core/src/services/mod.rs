//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

mod deadline;
pub mod detectors;
mod dispatcher;
mod fanout;
mod jobs;
pub mod migration;
pub mod threshold;

pub use detectors::AnomalyDetectors;
pub use dispatcher::{DispatchCounts, DispatchReport, TriggerDispatcher};
pub use fanout::{FanOut, FanOutTally, UserOutcome};
pub use jobs::{budget_success_rate, top_category, JobKind, JobService, JobSummary};
pub use migration::{MigrationResult, MigrationService};
pub use threshold::ThresholdTracker;
