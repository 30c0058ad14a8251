//! # Engine Configuration
//!
//! Configuration management for the deduction engine and health monitor.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     LARDER_DB_PATH=./data/larder.db                                    │
//! │     LARDER_MONITOR_STORE_ID=store-001                                  │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/pos/larder.toml (Linux)                                  │
//! │     ~/Library/Application Support/com.larder.pos/larder.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     3 apply attempts, 60s monitor interval, 60 minute window           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # larder.toml
//! [database]
//! path = "./larder.db"
//! max_connections = 5
//!
//! [deduction]
//! max_apply_attempts = 3
//!
//! [monitor]
//! interval_secs = 60
//! window_minutes = 60
//! store_id = "store-001"   # omit to watch every store
//! alert_channel_capacity = 64
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use larder_core::DEFAULT_MAX_APPLY_ATTEMPTS;
use larder_db::DbConfig;

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Database Settings
// =============================================================================

/// Where the ledger lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// Pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./larder.db")
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseSettings {
    /// Pool configuration for these settings.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.path).max_connections(self.max_connections)
    }
}

// =============================================================================
// Deduction Settings
// =============================================================================

/// Sale line application policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeductionSettings {
    /// Optimistic update attempts per pair before the line is rolled back.
    #[serde(default = "default_max_apply_attempts")]
    pub max_apply_attempts: u32,
}

fn default_max_apply_attempts() -> u32 {
    DEFAULT_MAX_APPLY_ATTEMPTS
}

impl Default for DeductionSettings {
    fn default() -> Self {
        DeductionSettings {
            max_apply_attempts: default_max_apply_attempts(),
        }
    }
}

// =============================================================================
// Monitor Settings
// =============================================================================

/// Health monitor schedule and scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Seconds between health checks.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// How far back each check looks, in minutes.
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u64,

    /// Restrict checks to one store. `None` watches every store.
    #[serde(default)]
    pub store_id: Option<String>,

    /// Buffered alerts before the monitor starts dropping them.
    #[serde(default = "default_alert_channel_capacity")]
    pub alert_channel_capacity: usize,
}

fn default_interval_secs() -> u64 {
    60
}

fn default_window_minutes() -> u64 {
    60
}

fn default_alert_channel_capacity() -> usize {
    64
}

impl Default for MonitorSettings {
    fn default() -> Self {
        MonitorSettings {
            interval_secs: default_interval_secs(),
            window_minutes: default_window_minutes(),
            store_id: None,
            alert_channel_capacity: default_alert_channel_capacity(),
        }
    }
}

impl MonitorSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_minutes.saturating_mul(60))
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete engine configuration.
///
/// ## Example Config File
/// ```toml
/// [database]
/// path = "/var/lib/larder/larder.db"
///
/// [deduction]
/// max_apply_attempts = 5
///
/// [monitor]
/// interval_secs = 30
/// store_id = "store-downtown"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LarderConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub deduction: DeductionSettings,

    #[serde(default)]
    pub monitor: MonitorSettings,
}

impl LarderConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (larder.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> EngineResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| EngineError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.database.max_connections == 0 {
            return Err(EngineError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.deduction.max_apply_attempts == 0 {
            return Err(EngineError::InvalidConfig(
                "deduction.max_apply_attempts must be greater than 0".into(),
            ));
        }

        if self.monitor.interval_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "monitor.interval_secs must be greater than 0".into(),
            ));
        }

        if self.monitor.window_minutes == 0 {
            return Err(EngineError::InvalidConfig(
                "monitor.window_minutes must be greater than 0".into(),
            ));
        }

        if self.monitor.alert_channel_capacity == 0 {
            return Err(EngineError::InvalidConfig(
                "monitor.alert_channel_capacity must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from any key lookup; unparseable values are ignored.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("LARDER_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(attempts) = lookup("LARDER_MAX_APPLY_ATTEMPTS") {
            match attempts.parse::<u32>() {
                Ok(n) => self.deduction.max_apply_attempts = n,
                Err(_) => warn!(value = %attempts, "Ignoring invalid LARDER_MAX_APPLY_ATTEMPTS"),
            }
        }

        if let Some(secs) = lookup("LARDER_MONITOR_INTERVAL_SECS") {
            match secs.parse::<u64>() {
                Ok(n) => self.monitor.interval_secs = n,
                Err(_) => warn!(value = %secs, "Ignoring invalid LARDER_MONITOR_INTERVAL_SECS"),
            }
        }

        if let Some(minutes) = lookup("LARDER_MONITOR_WINDOW_MINUTES") {
            match minutes.parse::<u64>() {
                Ok(n) => self.monitor.window_minutes = n,
                Err(_) => {
                    warn!(value = %minutes, "Ignoring invalid LARDER_MONITOR_WINDOW_MINUTES")
                }
            }
        }

        if let Some(store) = lookup("LARDER_MONITOR_STORE_ID") {
            debug!(store_id = %store, "Overriding monitor store from environment");
            self.monitor.store_id = if store.trim().is_empty() {
                None
            } else {
                Some(store)
            };
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "larder", "pos")
            .map(|dirs| dirs.config_dir().join("larder.toml"))
    }
}
