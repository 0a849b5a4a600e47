//! Human-readable metrics formatter
//!
//! # Example Output
//!
//! ```text
//! [metrics] engine: 1.2K/s in | 1.1K/s written | buffered: 42 | flushes: 12 | parse err: 0 | failed: 0
//! [metrics] bus: cdc-events-sub (1.2K/s, 37 outstanding)
//! [metrics] sinks: raw (1.1K/s, ok)
//! ```

use super::{MetricsFormatter, format_count, format_rate};
use crate::{CollectedMetrics, MetricsRates};
use std::fmt::Write;

/// Human-readable metrics formatter
#[derive(Debug, Clone, Default)]
pub struct HumanFormatter;

impl HumanFormatter {
    /// Create a new human formatter
    pub fn new() -> Self {
        Self
    }

    fn format_pipeline(&self, rates: &MetricsRates) -> Option<String> {
        let p = rates.pipeline.as_ref()?;

        Some(format!(
            "[metrics] engine: {} in | {} written | buffered: {} | flushes: {} | parse err: {} | failed: {}",
            format_rate(p.messages_per_sec),
            format_rate(p.rows_per_sec),
            format_count(p.rows_buffered),
            p.flushes,
            p.parse_errors,
            p.rows_failed,
        ))
    }

    fn format_sources(&self, rates: &MetricsRates) -> Option<String> {
        if rates.sources.is_empty() {
            return None;
        }

        let mut output = String::from("[metrics] bus:");
        for (i, source) in rates.sources.iter().enumerate() {
            if i > 0 {
                output.push_str(" |");
            }
            let _ = write!(
                output,
                " {} ({}, {} outstanding",
                source.id,
                format_rate(source.messages_per_sec),
                source.outstanding,
            );
            if source.errors > 0 {
                let _ = write!(output, ", {} err", source.errors);
            }
            output.push(')');
        }
        Some(output)
    }

    fn format_sinks(&self, rates: &MetricsRates) -> Option<String> {
        if rates.sinks.is_empty() {
            return None;
        }

        let mut output = String::from("[metrics] sinks:");
        for (i, sink) in rates.sinks.iter().enumerate() {
            if i > 0 {
                output.push_str(" |");
            }
            let _ = write!(output, " {} ({}", sink.id, format_rate(sink.rows_per_sec));
            if sink.failures > 0 || sink.rows_rejected > 0 {
                let _ = write!(
                    output,
                    ", {} failed batches, {} rejected rows",
                    sink.failures, sink.rows_rejected
                );
            } else {
                output.push_str(", ok");
            }
            output.push(')');
        }
        Some(output)
    }
}

impl MetricsFormatter for HumanFormatter {
    fn format_unified(&self, _metrics: &CollectedMetrics, rates: Option<&MetricsRates>) -> String {
        let Some(rates) = rates else {
            return "[metrics] collecting baseline...".to_string();
        };

        let lines: Vec<String> = [
            self.format_pipeline(rates),
            self.format_sources(rates),
            self.format_sinks(rates),
        ]
        .into_iter()
        .flatten()
        .collect();

        if lines.is_empty() {
            "[metrics] no activity".to_string()
        } else {
            lines.join("\n")
        }
    }
}
