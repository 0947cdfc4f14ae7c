//! Promise manager configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{PledgeError, Result};

/// Default database location, relative to the working directory
pub const DEFAULT_DATABASE_PATH: &str = ".pledge/promises.db";

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PledgeConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Age after which a record is swept
    pub stale_after_secs: u64,

    /// Periodic sweep interval; `None` sweeps only on startup/housekeeping signals
    pub sweep_interval_secs: Option<u64>,

    /// Sweep when the startup signal arrives
    pub sweep_on_startup: bool,
}

impl Default for PledgeConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            stale_after_secs: 86_400, // 1 day
            sweep_interval_secs: Some(3_600),
            sweep_on_startup: true,
        }
    }
}

impl PledgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    /// Set the sweep threshold. Stored in whole seconds, rounded up, so a
    /// sub-second threshold never becomes zero.
    pub fn with_stale_after(mut self, threshold: Duration) -> Self {
        self.stale_after_secs = whole_secs_ceil(threshold);
        self
    }

    /// Set the periodic sweep interval, rounded up to whole seconds
    pub fn with_sweep_interval(mut self, interval: Option<Duration>) -> Self {
        self.sweep_interval_secs = interval.map(whole_secs_ceil);
        self
    }

    pub fn with_sweep_on_startup(mut self, enabled: bool) -> Self {
        self.sweep_on_startup = enabled;
        self
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sweep_interval_secs == Some(0) {
            return Err(PledgeError::InvalidConfig(
                "sweep_interval_secs must be positive".to_string(),
            ));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(PledgeError::InvalidConfig(
                "database_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn whole_secs_ceil(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}
