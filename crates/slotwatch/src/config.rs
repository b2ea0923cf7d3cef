/// Service configuration
use crate::waitlist::{DailySchedule, DriverConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV_VAR: &str = "SLOTWATCH_CONFIG";

/// Top-level configuration, read from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Path of the SQLite database file
    pub db_path: String,
    pub address: String,
    pub port: u16,
    pub schedule: ScheduleConfig,
    /// Time budget for reconciling a single class
    pub class_timeout_secs: u64,
    /// One of trace, debug, info, warn, error
    pub log_level: String,
}

/// Time of day (UTC) of the daily reconciliation run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub enabled: bool,
    pub hour: u32,
    pub minute: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            db_path: "studio.db".to_string(),
            address: "127.0.0.1".to_string(),
            port: 8088,
            schedule: ScheduleConfig::default(),
            class_timeout_secs: 30,
            log_level: "info".to_string(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hour: 0,
            minute: 0,
        }
    }
}

impl ServiceConfig {
    /// Loads the configuration from a JSON file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    /// * `Ok(ServiceConfig)` - Loaded configuration, defaults if the file does not exist
    /// * `Err` - If the file can't be read or parsed
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: ServiceConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Resolves the config path from `SLOTWATCH_CONFIG` or the first argument
    pub fn load_from_env() -> anyhow::Result<Self> {
        let path = std::env::var(CONFIG_ENV_VAR)
            .ok()
            .or_else(|| std::env::args().nth(1));

        match path {
            Some(path) => Self::load_from_file(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            class_timeout: Duration::from_secs(self.class_timeout_secs.max(1)),
        }
    }

    /// Falls back to midnight for an out-of-range hour or minute.
    pub fn daily_schedule(&self) -> DailySchedule {
        DailySchedule::new(self.schedule.hour, self.schedule.minute).unwrap_or_default()
    }

    pub fn log_level(&self) -> Level {
        self.log_level.parse().unwrap_or(Level::INFO)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ServiceConfig =
            serde_json::from_str(r#"{ "port": 9000, "schedule": { "hour": 3 } }"#).unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.schedule.hour, 3);
        assert_eq!(config.schedule.minute, 0);
        assert!(config.schedule.enabled);
        assert_eq!(config.db_path, "studio.db");
    }

    #[test]
    fn test_invalid_schedule_falls_back_to_midnight() {
        let mut config = ServiceConfig::default();
        config.schedule.hour = 25;
        assert_eq!(config.daily_schedule(), DailySchedule::midnight());
    }

    #[test]
    fn test_log_level_parsing() {
        let mut config = ServiceConfig::default();
        config.log_level = "debug".to_string();
        assert_eq!(config.log_level(), Level::DEBUG);
        config.log_level = "loud".to_string();
        assert_eq!(config.log_level(), Level::INFO);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = ServiceConfig::load_from_file(Path::new("/nonexistent/slotwatch.json")).unwrap();
        assert_eq!(config.port, 8088);
    }
}
