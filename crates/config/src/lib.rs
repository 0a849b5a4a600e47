//! cdcflow Configuration
//!
//! TOML-based configuration with environment overrides and sensible
//! defaults. An empty file (or no file at all) is a valid configuration
//! that consumes `cdc-events-sub` in project `local-dev` and writes to
//! dataset `raw`.
//!
//! # Loading
//!
//! ```ignore
//! use cdcflow_config::Config;
//!
//! let config = Config::load(Some("cdcflow.toml"))?;
//! ```
//!
//! `load` reads the file, applies environment overrides (see the `env`
//! module docs) and validates the result. `FromStr` parses and validates
//! without consulting the environment.
//!
//! # Example Config
//!
//! ```toml
//! [pipeline]
//! project_id = "acme-prod"
//! subscription_id = "cdc-events-sub"
//! dataset_id = "raw"
//! batch_size = 100
//! flush_interval = "5s"
//!
//! [bus]
//! type = "pubsub"
//!
//! [warehouse]
//! type = "bigquery"
//!
//! [log]
//! level = "info"
//! ```

mod bus;
mod env;
mod error;
mod logging;
mod metrics;
mod pipeline;
mod validation;
mod warehouse;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use bus::{BusConfig, DEFAULT_PUBSUB_ENDPOINT, FileBusConfig, PubSubConfig};
pub use error::{ConfigError, Result};
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput};
pub use metrics::{MetricsConfig, MetricsFormat};
pub use pipeline::{
    DEFAULT_DATASET_ID, DEFAULT_PROJECT_ID, DEFAULT_SUBSCRIPTION_ID, PipelineConfig,
};
pub use validation::is_identifier;
pub use warehouse::{
    BigQueryConfig, ClickHouseConfig, DEFAULT_BIGQUERY_ENDPOINT, StdoutConfig, WarehouseConfig,
};

use serde::Deserialize;

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Subscription, dataset and flush thresholds
    pub pipeline: PipelineConfig,

    /// Message bus transport
    pub bus: BusConfig,

    /// Warehouse backend
    pub warehouse: WarehouseConfig,

    /// Logging configuration
    pub log: LogConfig,

    /// Metrics reporting configuration
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration the way the binary does
    ///
    /// Reads `path` when given (defaults otherwise), applies environment
    /// overrides from the process environment, then validates.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, contains invalid TOML, an
    /// override cannot be parsed, or the result fails validation.
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        Self::load_with_env(path, |name| std::env::var(name).ok())
    }

    /// Load configuration with an explicit variable lookup
    pub fn load_with_env<P, F>(path: Option<P>, lookup: F) -> Result<Self>
    where
        P: AsRef<Path>,
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => {
                let contents = read_file(path.as_ref())?;
                toml::from_str(&contents).map_err(ConfigError::ParseError)?
            }
            None => Config::default(),
        };

        env::apply(&mut config, lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file without environment overrides
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or contains invalid TOML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = read_file(path.as_ref())?;
        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    ///
    /// Prefer using the `FromStr` trait implementation.
    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.display().to_string(),
        source: e,
    })
}
