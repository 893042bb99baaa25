//! Nudge Core - transaction-triggered spending alerts
//!
//! This crate implements the alert engine following hexagonal architecture:
//!
//! - **domain**: Core entities (Transaction, Budget, NotificationTrigger, etc.)
//! - **ports**: Trait definitions for external dependencies (Gateway, TriggerLog)
//! - **services**: Detectors, threshold tracking, dispatch and scheduled jobs
//! - **adapters**: Concrete implementations (DuckDB)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use adapters::duckdb::DuckDbGateway;
use config::Config;
use services::{JobService, TriggerDispatcher};

// Re-export commonly used types at crate root
pub use domain::result::Error;
pub use domain::{
    Budget, Goal, GoalSignals, NotificationTrigger, Transaction, TriggerType, User,
    UserPreferences,
};
pub use services::{DispatchReport, JobSummary};

/// Database file inside the nudge directory
pub const DB_FILENAME: &str = "nudge.duckdb";

/// Main context for Nudge operations
///
/// Holds the configuration, the database gateway, and the two entry points:
/// the per-transaction dispatcher and the scheduled jobs.
pub struct NudgeContext {
    pub config: Config,
    pub gateway: Arc<DuckDbGateway>,
    pub dispatcher: TriggerDispatcher,
    pub jobs: JobService,
}

impl NudgeContext {
    /// Create a new context rooted at `nudge_dir`
    pub fn new(nudge_dir: &Path) -> Result<Self> {
        let config = Config::load(nudge_dir)?;

        let db_path = nudge_dir.join(DB_FILENAME);
        let gateway = Arc::new(DuckDbGateway::new(&db_path)?);

        // Initialize schema
        gateway.ensure_schema()?;

        let dispatcher = TriggerDispatcher::new(
            gateway.clone(),
            gateway.clone(),
            config.gateway_timeout(),
        );
        let jobs = JobService::new(gateway.clone(), gateway.clone(), &config);

        Ok(Self {
            config,
            gateway,
            dispatcher,
            jobs,
        })
    }
}
