//! Configuration validation
//!
//! Validates values that deserialize fine but cannot run:
//! - Zero thresholds (a zero flush interval would spin the timer)
//! - Ack deadlines outside the range Pub/Sub accepts
//! - Empty identifiers and dataset names that are not identifiers
//! - Missing transport and backend locations

use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::{BusConfig, Config, WarehouseConfig};

/// Pub/Sub accepts ack deadlines between 10 and 600 seconds
const MIN_ACK_DEADLINE: Duration = Duration::from_secs(10);
const MAX_ACK_DEADLINE: Duration = Duration::from_secs(600);

/// Longest accepted flush interval
const MAX_FLUSH_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

const MIN_METRICS_INTERVAL: Duration = Duration::from_secs(1);

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_pipeline(config)?;
    validate_bus(config)?;
    validate_warehouse(config)?;
    validate_metrics(config)?;
    Ok(())
}

/// Whether `name` is usable as a warehouse identifier
pub fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn validate_pipeline(config: &Config) -> Result<()> {
    let p = &config.pipeline;

    if p.project_id.trim().is_empty() {
        return Err(ConfigError::missing_field("pipeline", "project_id"));
    }
    if p.subscription_id.trim().is_empty() {
        return Err(ConfigError::missing_field("pipeline", "subscription_id"));
    }
    if !is_identifier(&p.dataset_id) {
        return Err(ConfigError::invalid_value(
            "pipeline",
            "dataset_id",
            format!("'{}' must contain only letters, digits and '_'", p.dataset_id),
        ));
    }
    if p.batch_size == 0 {
        return Err(ConfigError::invalid_value(
            "pipeline",
            "batch_size",
            "must be greater than 0",
        ));
    }
    if p.flush_interval.is_zero() {
        return Err(ConfigError::invalid_value(
            "pipeline",
            "flush_interval",
            "must be greater than 0",
        ));
    }
    if p.flush_interval > MAX_FLUSH_INTERVAL {
        return Err(ConfigError::invalid_value(
            "pipeline",
            "flush_interval",
            format!("{:?} exceeds the maximum of 24h", p.flush_interval),
        ));
    }
    if p.max_outstanding_messages == 0 {
        return Err(ConfigError::invalid_value(
            "pipeline",
            "max_outstanding_messages",
            "must be greater than 0",
        ));
    }
    if p.ack_deadline < MIN_ACK_DEADLINE || p.ack_deadline > MAX_ACK_DEADLINE {
        return Err(ConfigError::invalid_value(
            "pipeline",
            "ack_deadline",
            format!(
                "{:?} is outside the accepted range of 10s to 600s",
                p.ack_deadline
            ),
        ));
    }
    if p.max_pending_flushes == 0 {
        return Err(ConfigError::invalid_value(
            "pipeline",
            "max_pending_flushes",
            "must be greater than 0",
        ));
    }
    if p.workers == Some(0) {
        return Err(ConfigError::invalid_value(
            "pipeline",
            "workers",
            "must be greater than 0",
        ));
    }

    Ok(())
}

fn validate_bus(config: &Config) -> Result<()> {
    match &config.bus {
        BusConfig::Pubsub(pubsub) => {
            if pubsub.endpoint.trim().is_empty() {
                return Err(ConfigError::missing_field("bus", "endpoint"));
            }
            if pubsub.max_messages_per_pull == 0 {
                return Err(ConfigError::invalid_value(
                    "bus",
                    "max_messages_per_pull",
                    "must be greater than 0",
                ));
            }
        }
        BusConfig::File(file) => {
            if file.path.trim().is_empty() {
                return Err(ConfigError::missing_field("bus", "path"));
            }
        }
    }
    Ok(())
}

fn validate_warehouse(config: &Config) -> Result<()> {
    match &config.warehouse {
        WarehouseConfig::Bigquery(bq) => {
            if bq.endpoint.trim().is_empty() {
                return Err(ConfigError::missing_field("warehouse", "endpoint"));
            }
        }
        WarehouseConfig::Clickhouse(ch) => {
            if ch.url.trim().is_empty() {
                return Err(ConfigError::missing_field("warehouse", "url"));
            }
        }
        WarehouseConfig::Stdout(_) => {}
    }
    Ok(())
}

fn validate_metrics(config: &Config) -> Result<()> {
    if config.metrics.enabled && config.metrics.interval < MIN_METRICS_INTERVAL {
        return Err(ConfigError::invalid_value(
            "metrics",
            "interval",
            "must be at least 1s",
        ));
    }
    Ok(())
}
