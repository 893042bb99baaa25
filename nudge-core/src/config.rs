//! Configuration management
//!
//! Engine tunables live in `settings.json` inside the nudge directory:
//! ```json
//! {
//!   "engine": { "workerPoolSize": 20, "gatewayTimeoutMs": 5000, ... },
//!   ...
//! }
//! ```
//! Keys this crate does not manage are preserved when saving.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_WORKER_POOL_SIZE: usize = 20;
pub const DEFAULT_GATEWAY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_USER_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_RETENTION_MONTHS: u32 = 3;
pub const DEFAULT_RETENTION_BATCH_SIZE: usize = 500;

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    engine: EngineSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EngineSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    worker_pool_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    gateway_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retention_months: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retention_batch_size: Option<usize>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Engine configuration (resolved view of settings + environment)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Max users processed at once by scheduled jobs
    pub worker_pool_size: usize,
    /// Per gateway call
    pub gateway_timeout_ms: u64,
    /// Per user inside a scheduled job
    pub user_timeout_ms: u64,
    pub retention_months: u32,
    pub retention_batch_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            gateway_timeout_ms: DEFAULT_GATEWAY_TIMEOUT_MS,
            user_timeout_ms: DEFAULT_USER_TIMEOUT_MS,
            retention_months: DEFAULT_RETENTION_MONTHS,
            retention_batch_size: DEFAULT_RETENTION_BATCH_SIZE,
        }
    }
}

impl Config {
    /// Load config from the nudge directory
    ///
    /// Environment variables win over the file:
    /// `NUDGE_WORKER_POOL_SIZE`, `NUDGE_GATEWAY_TIMEOUT_MS`, `NUDGE_USER_TIMEOUT_MS`.
    pub fn load(nudge_dir: &Path) -> Result<Self> {
        let raw = read_settings(nudge_dir)?;
        let defaults = Self::default();

        let config = Self {
            worker_pool_size: env_override("NUDGE_WORKER_POOL_SIZE")
                .or(raw.engine.worker_pool_size)
                .unwrap_or(defaults.worker_pool_size),
            gateway_timeout_ms: env_override("NUDGE_GATEWAY_TIMEOUT_MS")
                .or(raw.engine.gateway_timeout_ms)
                .unwrap_or(defaults.gateway_timeout_ms),
            user_timeout_ms: env_override("NUDGE_USER_TIMEOUT_MS")
                .or(raw.engine.user_timeout_ms)
                .unwrap_or(defaults.user_timeout_ms),
            retention_months: raw
                .engine
                .retention_months
                .unwrap_or(defaults.retention_months),
            retention_batch_size: raw
                .engine
                .retention_batch_size
                .unwrap_or(defaults.retention_batch_size),
        };

        config.validate()?;
        Ok(config)
    }

    /// Save engine settings, keeping everything else in the file
    pub fn save(&self, nudge_dir: &Path) -> Result<()> {
        let settings_path = nudge_dir.join("settings.json");
        let mut settings = read_settings(nudge_dir)?;

        settings.engine.worker_pool_size = Some(self.worker_pool_size);
        settings.engine.gateway_timeout_ms = Some(self.gateway_timeout_ms);
        settings.engine.user_timeout_ms = Some(self.user_timeout_ms);
        settings.engine.retention_months = Some(self.retention_months);
        settings.engine.retention_batch_size = Some(self.retention_batch_size);

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)
            .with_context(|| format!("Failed to write {}", settings_path.display()))?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.worker_pool_size == 0 {
            anyhow::bail!("workerPoolSize must be at least 1");
        }
        if self.retention_batch_size == 0 {
            anyhow::bail!("retentionBatchSize must be at least 1");
        }
        if self.retention_months == 0 {
            anyhow::bail!("retentionMonths must be at least 1");
        }
        Ok(())
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }

    pub fn user_timeout(&self) -> Duration {
        Duration::from_millis(self.user_timeout_ms)
    }
}

fn read_settings(nudge_dir: &Path) -> Result<SettingsFile> {
    let settings_path = nudge_dir.join("settings.json");
    if !settings_path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(&settings_path)
        .with_context(|| format!("Failed to read {}", settings_path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid settings file {}", settings_path.display()))
}

fn env_override<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_without_settings_file() {
        let dir = tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.retention_months, DEFAULT_RETENTION_MONTHS);
        assert_eq!(config.retention_batch_size, DEFAULT_RETENTION_BATCH_SIZE);
    }

    #[test]
    fn test_reads_engine_section_and_preserves_other_keys() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{"engine": {"retentionMonths": 6, "retentionBatchSize": 50}, "ui": {"theme": "dark"}}"#,
        )
        .unwrap();

        let mut config = Config::load(dir.path()).unwrap();
        assert_eq!(config.retention_months, 6);
        assert_eq!(config.retention_batch_size, 50);

        config.retention_months = 12;
        config.save(dir.path()).unwrap();

        let saved: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("settings.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(saved["engine"]["retentionMonths"], 12);
        assert_eq!(saved["ui"]["theme"], "dark");
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{"engine": {"retentionBatchSize": 0}}"#,
        )
        .unwrap();
        assert!(Config::load(dir.path()).is_err());
    }
}
