// File: ./src/config.rs
// Handles application settings loading, saving, and defaults.
use crate::context::AppContext;
use crate::model::parse_time_of_day;
use crate::storage::LocalStorage;
use anyhow::{Error, Result};
use chrono::NaiveTime;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::fs;
use std::str::FromStr;

fn default_true() -> bool {
    true
}
fn default_earliest_time() -> String {
    "12:00".to_string()
}
fn default_max_sleep_mins() -> u32 {
    60
}
fn default_store_poll_secs() -> u32 {
    5
}
fn default_app_name() -> String {
    "LinCal".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Earliest notification time given to newly added calendars. Format "H:MM".
    #[serde(default = "default_earliest_time")]
    pub default_earliest_notification_time: String,
    #[serde(default = "default_true")]
    pub default_earliest_notification_time_enabled: bool,

    /// Upper bound for how long the driver sleeps between cycles.
    #[serde(default = "default_max_sleep_mins")]
    pub max_sleep_mins: u32,

    /// How often the daemon checks the calendar store for changes made by other commands.
    #[serde(default = "default_store_poll_secs")]
    pub store_poll_secs: u32,

    #[serde(default = "default_app_name")]
    pub notification_app_name: String,

    /// One of off, error, warn, info, debug, trace.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_earliest_notification_time: default_earliest_time(),
            default_earliest_notification_time_enabled: true,
            max_sleep_mins: 60,
            store_poll_secs: default_store_poll_secs(),
            notification_app_name: default_app_name(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load the settings from disk.
    /// Returns a contextualized error if reading or parsing fails.
    pub fn load(ctx: &dyn AppContext) -> Result<Self> {
        let path = ctx.get_settings_file_path()?;

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found"));
        }

        let contents = fs::read_to_string(&path).map_err(|e| {
            anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e)
        })?;

        let config: Config = toml::from_str(&contents).map_err(|e| {
            anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e)
        })?;

        Ok(config)
    }

    /// Like `load`, but a missing file yields the defaults.
    pub fn load_or_default(ctx: &dyn AppContext) -> Result<Self> {
        match Self::load(ctx) {
            Ok(c) => Ok(c),
            Err(e) if Self::is_missing_config_error(&e) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    /// Detects whether an error means the settings file was missing, either by
    /// our explicit message or by an io NotFound somewhere in the chain.
    pub fn is_missing_config_error(err: &Error) -> bool {
        if err.to_string().contains("Config file not found") {
            return true;
        }

        for cause in err.chain() {
            if let Some(io_err) = cause.downcast_ref::<std::io::Error>()
                && io_err.kind() == std::io::ErrorKind::NotFound
            {
                return true;
            }
        }

        false
    }

    pub fn save(&self, ctx: &dyn AppContext) -> Result<()> {
        let path = ctx.get_settings_file_path()?;
        LocalStorage::with_lock(&path, || {
            let toml_str = toml::to_string_pretty(self)?;
            LocalStorage::atomic_write(&path, toml_str)?;
            Ok(())
        })?;
        Ok(())
    }

    /// The configured default earliest notification time, falling back to 12:00
    /// when the stored string is malformed.
    pub fn earliest_notification_time(&self) -> NaiveTime {
        parse_time_of_day(&self.default_earliest_notification_time).unwrap_or_else(|| {
            log::warn!(
                "Invalid default_earliest_notification_time '{}', using 12:00",
                self.default_earliest_notification_time
            );
            NaiveTime::from_hms_opt(12, 0, 0).unwrap_or(NaiveTime::MIN)
        })
    }

    pub fn log_level_filter(&self) -> LevelFilter {
        LevelFilter::from_str(&self.log_level).unwrap_or(LevelFilter::Info)
    }
}
