use std::{fs, path::Path, path::PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::scheduler::SamplingMode;

const BACKEND_URL_ENV: &str = "SENSING_CORE_BACKEND_URL";

/// Duty-cycle and unlock window timings for the sampling scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Length of the sampling window opened by a device unlock.
    pub unlock_sample_ms: u64,
    /// On-phase of the periodic duty cycle.
    pub periodic_on_ms: u64,
    /// Delay from the end of one on-phase to the start of the next.
    pub periodic_cycle_ms: u64,
    /// Delay of the first periodic window after a mode is entered.
    pub periodic_start_delay_ms: u64,
    /// Local hour at which a paused study resumes.
    pub resume_hour: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            unlock_sample_ms: 60_000,
            periodic_on_ms: 60_000,
            periodic_cycle_ms: 300_000,
            periodic_start_delay_ms: 0,
            resume_hour: 6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub base_url: String,
    pub batch_size: usize,
    /// Readings newer than `now - cutoff_lag_ms` are not drained yet.
    pub cutoff_lag_ms: i64,
    pub request_timeout_ms: u64,
    /// Period of the background upload pass.
    pub interval_ms: u64,
    pub retry_initial_ms: u64,
    pub retry_max_ms: u64,
    /// Unsynced readings older than this are reported as stale.
    pub stale_after_ms: i64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".into(),
            batch_size: 60,
            cutoff_lag_ms: 60_000,
            request_timeout_ms: 30_000,
            interval_ms: 24 * 60 * 60 * 1000,
            retry_initial_ms: 30_000,
            retry_max_ms: 60 * 60 * 1000,
            stale_after_ms: 2 * 24 * 60 * 60 * 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub interval_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_ms: 15 * 60 * 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub database_path: PathBuf,
    pub preferences_path: PathBuf,
    pub recordings_dir: PathBuf,
    /// Policy the strategy front-end starts with.
    pub strategy: SamplingMode,
    pub scheduler: SchedulerConfig,
    pub upload: UploadConfig,
    pub health: HealthConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("sensing.sqlite3"),
            preferences_path: PathBuf::from("preferences.json"),
            recordings_dir: PathBuf::from("recordings"),
            strategy: SamplingMode::UnlockAndPeriodic,
            scheduler: SchedulerConfig::default(),
            upload: UploadConfig::default(),
            health: HealthConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Places every on-disk artifact under `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            database_path: dir.join("sensing.sqlite3"),
            preferences_path: dir.join("preferences.json"),
            recordings_dir: dir.join("recordings"),
            ..Self::default()
        }
    }

    /// Reads a JSON config file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read config from {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("invalid config file {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env();
        Ok(config)
    }

    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(BACKEND_URL_ENV) {
            if !url.is_empty() {
                self.upload.base_url = url;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "strategy": "periodic", "upload": { "batch_size": 10 } }"#,
        )
        .unwrap();

        let config = CoreConfig::load(&path).unwrap();
        assert_eq!(config.strategy, SamplingMode::Periodic);
        assert_eq!(config.upload.batch_size, 10);
        assert_eq!(config.upload.cutoff_lag_ms, 60_000);
        assert_eq!(config.scheduler.periodic_cycle_ms, 300_000);
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.scheduler.unlock_sample_ms, 60_000);
        assert_eq!(config.health.interval_ms, 900_000);
        assert_eq!(config.strategy, SamplingMode::UnlockAndPeriodic);
    }
}
