//! # Engine Configuration
//!
//! Store settings the engine needs at checkout time.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TALLY_STORE_NAME="Corner Shop"                                     │
//! │     TALLY_TAX_RATE=0.0825                                              │
//! │     TALLY_DB_PATH=/var/lib/tally/tally.db                              │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tally-pos/tally.toml (Linux)                             │
//! │     ~/Library/Application Support/com.tally.pos/tally.toml (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     tax_rate = 0, tally.db in the working directory                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # tally.toml
//! store_name = "Corner Shop"
//! tax_rate = "0.10"          # decimal fraction, quoted
//! database_path = "/var/lib/tally/tally.db"
//! max_connections = 5
//! busy_timeout_secs = 5
//! acquire_timeout_secs = 10
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use tally_core::TaxRate;
use tally_db::DbConfig;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Printed at the top of every receipt.
    #[serde(default = "default_store_name")]
    pub store_name: String,

    /// Sales tax applied once to the cart subtotal.
    #[serde(default)]
    pub tax_rate: TaxRate,

    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a write waits for SQLite's lock before `Unavailable`.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,

    /// How long a caller waits for a pooled connection.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

fn default_store_name() -> String {
    "Tally Store".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("tally.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout() -> u64 {
    5
}

fn default_acquire_timeout() -> u64 {
    10
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            store_name: default_store_name(),
            tax_rate: TaxRate::zero(),
            database_path: default_database_path(),
            max_connections: default_max_connections(),
            busy_timeout_secs: default_busy_timeout(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (`tally.toml`)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                config = Self::from_file(&path)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML file without applying the environment.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_connections must be greater than 0".into(),
            ));
        }

        if self.store_name.trim().is_empty() {
            return Err(ConfigError::Invalid("store_name must not be empty".into()));
        }

        TaxRate::from_fraction(self.tax_rate.as_decimal())
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        Ok(())
    }

    /// Applies environment variable overrides.
    ///
    /// An unparsable `TALLY_TAX_RATE` is an error, never a fallback.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(name) = std::env::var("TALLY_STORE_NAME") {
            debug!(store_name = %name, "Overriding store name from environment");
            self.store_name = name;
        }

        if let Ok(rate) = std::env::var("TALLY_TAX_RATE") {
            debug!(tax_rate = %rate, "Overriding tax rate from environment");
            self.tax_rate = rate
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("TALLY_TAX_RATE: {}", e)))?;
        }

        if let Ok(path) = std::env::var("TALLY_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database_path = PathBuf::from(path);
        }

        if let Ok(max) = std::env::var("TALLY_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(max) => self.max_connections = max,
                Err(_) => warn!(value = %max, "Ignoring unparsable TALLY_MAX_CONNECTIONS"),
            }
        }

        Ok(())
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tally", "pos")
            .map(|dirs| dirs.config_dir().join("tally.toml"))
    }

    /// Pool settings derived from this config.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database_path)
            .max_connections(self.max_connections)
            .busy_timeout(Duration::from_secs(self.busy_timeout_secs))
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_secs))
    }
}
