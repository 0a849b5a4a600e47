//! Environment overrides
//!
//! Deployments configure the engine mostly through environment variables.
//! Overrides are applied on top of the file (or defaults) before
//! validation. Variables that are set but empty are ignored.
//!
//! | Variable | Field |
//! |---|---|
//! | `CDCFLOW_PROJECT_ID` | `pipeline.project_id` |
//! | `CDCFLOW_SUBSCRIPTION` | `pipeline.subscription_id` |
//! | `CDCFLOW_DATASET` | `pipeline.dataset_id` |
//! | `CDCFLOW_BATCH_SIZE` | `pipeline.batch_size` |
//! | `CDCFLOW_FLUSH_INTERVAL` | `pipeline.flush_interval` (seconds or humantime) |
//! | `CDCFLOW_MAX_OUTSTANDING_MESSAGES` | `pipeline.max_outstanding_messages` |
//! | `CDCFLOW_ACK_DEADLINE` | `pipeline.ack_deadline` (seconds or humantime) |
//! | `CDCFLOW_WORKERS` | `pipeline.workers` |
//! | `CDCFLOW_LOG_LEVEL` | `log.level` |
//! | `CDCFLOW_ACCESS_TOKEN` | Pub/Sub and BigQuery bearer token, when not set in the file |
//! | `PUBSUB_EMULATOR_HOST` | Pub/Sub endpoint `http://<host>` |
//!
//! Older deployments set `GCP_PROJECT_ID`, `CDC_SUBSCRIPTION` and
//! `BQ_DATASET_RAW`. They are read when the matching `CDCFLOW_*` variable
//! is unset.

use std::str::FromStr;
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::{BusConfig, Config, LogLevel, WarehouseConfig};

pub const PROJECT_ID: &str = "CDCFLOW_PROJECT_ID";
pub const SUBSCRIPTION: &str = "CDCFLOW_SUBSCRIPTION";
pub const DATASET: &str = "CDCFLOW_DATASET";
pub const BATCH_SIZE: &str = "CDCFLOW_BATCH_SIZE";
pub const FLUSH_INTERVAL: &str = "CDCFLOW_FLUSH_INTERVAL";
pub const MAX_OUTSTANDING_MESSAGES: &str = "CDCFLOW_MAX_OUTSTANDING_MESSAGES";
pub const ACK_DEADLINE: &str = "CDCFLOW_ACK_DEADLINE";
pub const WORKERS: &str = "CDCFLOW_WORKERS";
pub const LOG_LEVEL: &str = "CDCFLOW_LOG_LEVEL";
pub const ACCESS_TOKEN: &str = "CDCFLOW_ACCESS_TOKEN";
pub const PUBSUB_EMULATOR_HOST: &str = "PUBSUB_EMULATOR_HOST";

pub const LEGACY_PROJECT_ID: &str = "GCP_PROJECT_ID";
pub const LEGACY_SUBSCRIPTION: &str = "CDC_SUBSCRIPTION";
pub const LEGACY_DATASET: &str = "BQ_DATASET_RAW";

/// Apply overrides from a variable lookup
///
/// The lookup is injected so overrides can be exercised without touching
/// the process environment.
pub(crate) fn apply<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(v) = get(PROJECT_ID).or_else(|| get(LEGACY_PROJECT_ID)) {
        config.pipeline.project_id = v.trim().to_string();
    }
    if let Some(v) = get(SUBSCRIPTION).or_else(|| get(LEGACY_SUBSCRIPTION)) {
        config.pipeline.subscription_id = v.trim().to_string();
    }
    if let Some(v) = get(DATASET).or_else(|| get(LEGACY_DATASET)) {
        config.pipeline.dataset_id = v.trim().to_string();
    }
    if let Some(v) = get(BATCH_SIZE) {
        config.pipeline.batch_size = parse_number(BATCH_SIZE, &v)?;
    }
    if let Some(v) = get(FLUSH_INTERVAL) {
        config.pipeline.flush_interval = parse_duration(FLUSH_INTERVAL, &v)?;
    }
    if let Some(v) = get(MAX_OUTSTANDING_MESSAGES) {
        config.pipeline.max_outstanding_messages = parse_number(MAX_OUTSTANDING_MESSAGES, &v)?;
    }
    if let Some(v) = get(ACK_DEADLINE) {
        config.pipeline.ack_deadline = parse_duration(ACK_DEADLINE, &v)?;
    }
    if let Some(v) = get(WORKERS) {
        config.pipeline.workers = Some(parse_number(WORKERS, &v)?);
    }
    if let Some(v) = get(LOG_LEVEL) {
        config.log.level =
            LogLevel::from_str(&v).map_err(|e| ConfigError::invalid_env(LOG_LEVEL, &v, e))?;
    }

    if let BusConfig::Pubsub(pubsub) = &mut config.bus {
        if let Some(host) = get(PUBSUB_EMULATOR_HOST) {
            pubsub.endpoint = format!("http://{}", host.trim());
        }
        if pubsub.access_token.is_none() {
            pubsub.access_token = get(ACCESS_TOKEN);
        }
    }

    if let WarehouseConfig::Bigquery(bq) = &mut config.warehouse
        && bq.access_token.is_none()
    {
        bq.access_token = get(ACCESS_TOKEN);
    }

    Ok(())
}

fn parse_number(var: &'static str, value: &str) -> Result<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid_env(var, value, "expected a non-negative integer"))
}

/// Parse `5`, `5.0` (seconds) or a humantime string like `1500ms`
fn parse_duration(var: &'static str, value: &str) -> Result<Duration> {
    let trimmed = value.trim();

    if let Ok(secs) = trimmed.parse::<f64>() {
        return Duration::try_from_secs_f64(secs)
            .map_err(|e| ConfigError::invalid_env(var, value, e.to_string()));
    }

    humantime_serde::re::humantime::parse_duration(trimmed)
        .map_err(|e| ConfigError::invalid_env(var, value, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_no_vars_keeps_defaults() {
        let mut config = Config::default();
        apply(&mut config, lookup(&[])).unwrap();
        assert_eq!(config.pipeline.batch_size, 100);
        assert_eq!(config.pipeline.project_id, "local-dev");
    }

    #[test]
    fn test_pipeline_overrides() {
        let mut config = Config::default();
        apply(
            &mut config,
            lookup(&[
                (PROJECT_ID, "acme"),
                (SUBSCRIPTION, "orders-sub"),
                (DATASET, "landing"),
                (BATCH_SIZE, "250"),
                (FLUSH_INTERVAL, "2.5"),
                (MAX_OUTSTANDING_MESSAGES, "50"),
                (ACK_DEADLINE, "2m"),
                (WORKERS, "8"),
                (LOG_LEVEL, "debug"),
            ]),
        )
        .unwrap();

        assert_eq!(config.pipeline.project_id, "acme");
        assert_eq!(config.pipeline.subscription_id, "orders-sub");
        assert_eq!(config.pipeline.dataset_id, "landing");
        assert_eq!(config.pipeline.batch_size, 250);
        assert_eq!(config.pipeline.flush_interval, Duration::from_millis(2500));
        assert_eq!(config.pipeline.max_outstanding_messages, 50);
        assert_eq!(config.pipeline.ack_deadline, Duration::from_secs(120));
        assert_eq!(config.pipeline.workers, Some(8));
        assert_eq!(config.log.level, LogLevel::Debug);
    }

    #[test]
    fn test_legacy_names_are_fallbacks() {
        let mut config = Config::default();
        apply(
            &mut config,
            lookup(&[
                (LEGACY_PROJECT_ID, "acme"),
                (LEGACY_SUBSCRIPTION, "cdc-events-sub"),
                (LEGACY_DATASET, "raw_cdc"),
            ]),
        )
        .unwrap();
        assert_eq!(config.pipeline.project_id, "acme");
        assert_eq!(config.pipeline.subscription_id, "cdc-events-sub");
        assert_eq!(config.pipeline.dataset_id, "raw_cdc");

        let mut config = Config::default();
        apply(
            &mut config,
            lookup(&[(PROJECT_ID, "current"), (LEGACY_PROJECT_ID, "legacy")]),
        )
        .unwrap();
        assert_eq!(config.pipeline.project_id, "current");
    }

    #[test]
    fn test_empty_values_ignored() {
        let mut config = Config::default();
        apply(&mut config, lookup(&[(BATCH_SIZE, "  "), (PROJECT_ID, "")])).unwrap();
        assert_eq!(config.pipeline.batch_size, 100);
        assert_eq!(config.pipeline.project_id, "local-dev");
    }

    #[test]
    fn test_invalid_number() {
        let mut config = Config::default();
        let err = apply(&mut config, lookup(&[(BATCH_SIZE, "lots")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { var, .. } if var == BATCH_SIZE));
    }

    #[test]
    fn test_invalid_duration() {
        let mut config = Config::default();
        let err = apply(&mut config, lookup(&[(FLUSH_INTERVAL, "-1")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn test_emulator_and_token() {
        let mut config = Config::default();
        apply(
            &mut config,
            lookup(&[(PUBSUB_EMULATOR_HOST, "localhost:8085"), (ACCESS_TOKEN, "tok")]),
        )
        .unwrap();

        let BusConfig::Pubsub(pubsub) = &config.bus else {
            panic!("expected pubsub");
        };
        assert_eq!(pubsub.endpoint, "http://localhost:8085");
        assert_eq!(pubsub.access_token.as_deref(), Some("tok"));

        let WarehouseConfig::Bigquery(bq) = &config.warehouse else {
            panic!("expected bigquery");
        };
        assert_eq!(bq.access_token.as_deref(), Some("tok"));
    }

    #[test]
    fn test_file_token_wins() {
        let mut config: Config = toml::from_str(
            r#"
[bus]
type = "pubsub"
access_token = "from-file"
"#,
        )
        .unwrap();
        apply(&mut config, lookup(&[(ACCESS_TOKEN, "from-env")])).unwrap();
        let BusConfig::Pubsub(pubsub) = &config.bus else {
            panic!("expected pubsub");
        };
        assert_eq!(pubsub.access_token.as_deref(), Some("from-file"));
    }
}
