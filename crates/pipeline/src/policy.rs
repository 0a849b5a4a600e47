//! Flush policy
//!
//! Buffered rows are flushed when either threshold is reached: the total
//! row count across all tables, or the time since the previous flush.
//! Both comparisons are inclusive.

use std::fmt;
use std::time::Duration;

use cdcflow_config::PipelineConfig;

/// Why a flush happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlushTrigger {
    /// Total buffered rows reached the batch size
    Size,
    /// The flush interval elapsed since the previous flush
    Interval,
    /// Final flush while draining
    Shutdown,
}

impl FlushTrigger {
    /// Label used in logs and metrics
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::Interval => "interval",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Size-or-time flush decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushPolicy {
    batch_size: usize,
    flush_interval: Duration,
}

impl FlushPolicy {
    /// Create a policy; a zero batch size is treated as one
    pub fn new(batch_size: usize, flush_interval: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            flush_interval,
        }
    }

    /// Policy from the pipeline configuration
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.batch_size, config.flush_interval)
    }

    /// Row-count threshold
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Time threshold
    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// True when `total_buffered >= batch_size` or `since_last_flush >= flush_interval`
    pub fn should_flush(&self, total_buffered: usize, since_last_flush: Duration) -> bool {
        self.evaluate(total_buffered, since_last_flush).is_some()
    }

    /// Which threshold fired, size taking precedence
    pub fn evaluate(&self, total_buffered: usize, since_last_flush: Duration) -> Option<FlushTrigger> {
        if total_buffered >= self.batch_size {
            Some(FlushTrigger::Size)
        } else if since_last_flush >= self.flush_interval {
            Some(FlushTrigger::Interval)
        } else {
            None
        }
    }
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// Decide whether buffered rows are due for a flush under `config`
pub fn should_flush(total_buffered: usize, since_last_flush: Duration, config: &PipelineConfig) -> bool {
    FlushPolicy::from_config(config).should_flush(total_buffered, since_last_flush)
}
