//! JSON metrics formatter
//!
//! Formats metrics as one JSON object per report, carrying both the
//! cumulative totals and the rates for the period.
//!
//! # Example Output
//!
//! ```json
//! {"type":"metrics","period_secs":30,"engine":{"messages_per_sec":1200,"rows_processed":35000,...},"bus":[...],"sinks":[...]}
//! ```

use super::MetricsFormatter;
use crate::{CollectedMetrics, MetricsRates, PipelineSnapshot};
use serde::Serialize;

/// JSON metrics formatter
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter;

impl JsonFormatter {
    /// Create a new JSON formatter
    pub fn new() -> Self {
        Self
    }
}

#[derive(Serialize)]
struct ReportJson<'a> {
    #[serde(rename = "type")]
    report_type: &'static str,
    period_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    engine: Option<EngineJson>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    bus: Vec<SourceJson<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkJson<'a>>,
}

#[derive(Serialize)]
struct EngineJson {
    messages_per_sec: u64,
    rows_per_sec: u64,
    #[serde(flatten)]
    totals: PipelineSnapshot,
}

#[derive(Serialize)]
struct SourceJson<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    source_type: &'a str,
    messages_per_sec: u64,
    acks_per_sec: u64,
    outstanding: u64,
    errors: u64,
}

#[derive(Serialize)]
struct SinkJson<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    sink_type: &'a str,
    rows_per_sec: u64,
    rows_rejected: u64,
    failures: u64,
}

impl MetricsFormatter for JsonFormatter {
    fn format_unified(&self, metrics: &CollectedMetrics, rates: Option<&MetricsRates>) -> String {
        let Some(rates) = rates else {
            return r#"{"type":"metrics","status":"collecting_baseline"}"#.to_string();
        };

        let report = ReportJson {
            report_type: "metrics",
            period_secs: rates.elapsed.as_secs(),
            engine: rates
                .pipeline
                .as_ref()
                .zip(metrics.pipeline)
                .map(|(r, totals)| EngineJson {
                    messages_per_sec: r.messages_per_sec as u64,
                    rows_per_sec: r.rows_per_sec as u64,
                    totals,
                }),
            bus: rates
                .sources
                .iter()
                .map(|s| SourceJson {
                    id: &s.id,
                    source_type: &s.source_type,
                    messages_per_sec: s.messages_per_sec as u64,
                    acks_per_sec: s.acks_per_sec as u64,
                    outstanding: s.outstanding,
                    errors: s.errors,
                })
                .collect(),
            sinks: rates
                .sinks
                .iter()
                .map(|s| SinkJson {
                    id: &s.id,
                    sink_type: &s.sink_type,
                    rows_per_sec: s.rows_per_sec as u64,
                    rows_rejected: s.rows_rejected,
                    failures: s.failures,
                })
                .collect(),
        };

        serde_json::to_string(&report)
            .unwrap_or_else(|e| format!(r#"{{"type":"metrics","error":"{e}"}}"#))
    }
}
