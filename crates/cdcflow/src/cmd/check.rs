//! Check command
//!
//! Loads the configuration exactly as `serve` would (file, environment
//! overrides, validation) and prints the effective settings. Credentials
//! are reported as set or unset, never printed.
//!
//! # Usage
//!
//! ```bash
//! cdcflow check --config cdcflow.toml
//! ```

use std::path::Path;

use anyhow::Result;
use cdcflow_config::{BusConfig, Config, WarehouseConfig};
use owo_colors::OwoColorize;

/// Print the effective configuration
pub fn run(config: &Config, path: Option<&Path>) -> Result<()> {
    let source = path
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(defaults)".to_string());

    println!();
    println!("{}", "cdcflow configuration".bold());
    println!("{}", "─".repeat(50));
    println!("{:<24}{}", "Config", source.dimmed());
    println!("{}", "─".repeat(50));

    for (section, entries) in settings(config) {
        println!();
        println!("{}", format!("[{section}]").cyan());
        for (key, value) in entries {
            println!("  {key:<22}{value}");
        }
    }

    println!();
    println!("{} configuration is valid", "✓".green());
    Ok(())
}

type Section = (&'static str, Vec<(&'static str, String)>);

/// Effective settings grouped by section
fn settings(config: &Config) -> Vec<Section> {
    let pipeline = &config.pipeline;
    let workers = match pipeline.workers {
        Some(n) => n.to_string(),
        None => format!("auto ({})", pipeline.effective_workers()),
    };

    let mut sections = vec![(
        "pipeline",
        vec![
            ("project_id", pipeline.project_id.clone()),
            ("subscription_id", pipeline.subscription_id.clone()),
            ("dataset_id", pipeline.dataset_id.clone()),
            ("batch_size", pipeline.batch_size.to_string()),
            ("flush_interval", format!("{:?}", pipeline.flush_interval)),
            ("max_outstanding", pipeline.max_outstanding_messages.to_string()),
            ("ack_deadline", format!("{:?}", pipeline.ack_deadline)),
            ("workers", workers),
            ("max_pending_flushes", pipeline.max_pending_flushes.to_string()),
            ("shutdown_timeout", format!("{:?}", pipeline.shutdown_timeout)),
        ],
    )];

    let bus = match &config.bus {
        BusConfig::Pubsub(pubsub) => vec![
            ("type", config.bus.type_name().to_string()),
            ("endpoint", pubsub.endpoint.clone()),
            ("access_token", presence(pubsub.access_token.as_deref())),
            ("max_messages_per_pull", pubsub.max_messages_per_pull.to_string()),
        ],
        BusConfig::File(file) => vec![
            ("type", config.bus.type_name().to_string()),
            ("path", file.path.clone()),
        ],
    };
    sections.push(("bus", bus));

    let warehouse = match &config.warehouse {
        WarehouseConfig::Bigquery(bq) => vec![
            ("type", config.warehouse.type_name().to_string()),
            ("endpoint", bq.endpoint.clone()),
            ("access_token", presence(bq.access_token.as_deref())),
            ("retry_attempts", bq.retry_attempts.to_string()),
        ],
        WarehouseConfig::Clickhouse(ch) => vec![
            ("type", config.warehouse.type_name().to_string()),
            ("url", ch.url.clone()),
            ("username", ch.username.clone()),
            ("password", presence(Some(ch.password.as_str()))),
            ("retry_attempts", ch.retry_attempts.to_string()),
        ],
        WarehouseConfig::Stdout(stdout) => vec![
            ("type", config.warehouse.type_name().to_string()),
            ("color", stdout.color.to_string()),
        ],
    };
    sections.push(("warehouse", warehouse));

    sections.push((
        "log",
        vec![
            ("level", config.log.level.as_str().to_string()),
            ("format", format!("{:?}", config.log.format).to_lowercase()),
            ("output", format!("{:?}", config.log.output).to_lowercase()),
        ],
    ));
    sections.push((
        "metrics",
        vec![
            ("enabled", config.metrics.enabled.to_string()),
            ("interval", format!("{:?}", config.metrics.interval)),
            ("format", format!("{:?}", config.metrics.format).to_lowercase()),
        ],
    ));

    sections
}

fn presence(secret: Option<&str>) -> String {
    match secret {
        Some(s) if !s.is_empty() => "(set)".to_string(),
        _ => "(not set)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn lookup<'a>(sections: &'a [Section], section: &str, key: &str) -> Option<&'a str> {
        sections
            .iter()
            .find(|(name, _)| *name == section)?
            .1
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn test_default_settings() {
        let sections = settings(&Config::default());
        assert_eq!(lookup(&sections, "pipeline", "batch_size"), Some("100"));
        assert_eq!(lookup(&sections, "pipeline", "flush_interval"), Some("5s"));
        assert_eq!(lookup(&sections, "bus", "type"), Some("pubsub"));
        assert_eq!(lookup(&sections, "bus", "access_token"), Some("(not set)"));
        assert_eq!(lookup(&sections, "warehouse", "type"), Some("bigquery"));
    }

    #[test]
    fn test_secrets_are_not_printed() {
        let config = Config::from_str(
            r#"
[warehouse]
type = "clickhouse"
url = "http://clickhouse:8123"
password = "hunter2"
"#,
        )
        .unwrap();
        let sections = settings(&config);
        assert_eq!(lookup(&sections, "warehouse", "password"), Some("(set)"));
        assert!(
            sections
                .iter()
                .flat_map(|(_, entries)| entries)
                .all(|(_, value)| !value.contains("hunter2"))
        );
    }

    #[test]
    fn test_file_bus_settings() {
        let config = Config::from_str(
            r#"
[bus]
type = "file"
path = "changes.jsonl"
"#,
        )
        .unwrap();
        let sections = settings(&config);
        assert_eq!(lookup(&sections, "bus", "type"), Some("file"));
        assert_eq!(lookup(&sections, "bus", "path"), Some("changes.jsonl"));
    }
}
