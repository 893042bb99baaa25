//! CLI command implementations

pub mod budget;
pub mod goal;
pub mod ingest;
pub mod prefs;
pub mod run;
pub mod triggers;
pub mod user;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

use nudge_core::NudgeContext;

/// Get the nudge directory from environment or default
pub fn get_nudge_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("NUDGE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".nudge"))
        .context("Could not find home directory (set NUDGE_DIR)")
}

/// Get or create nudge context
pub fn get_context() -> Result<NudgeContext> {
    let nudge_dir = get_nudge_dir()?;

    // Create directory if it doesn't exist
    std::fs::create_dir_all(&nudge_dir)
        .with_context(|| format!("Failed to create nudge directory: {:?}", nudge_dir))?;

    NudgeContext::new(&nudge_dir).context("Failed to initialize nudge context")
}

pub fn parse_amount(value: &str) -> Result<Decimal> {
    Decimal::from_str(value.trim()).with_context(|| format!("Invalid amount: {}", value))
}

pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .with_context(|| format!("Invalid date (expected YYYY-MM-DD): {}", value))
}
