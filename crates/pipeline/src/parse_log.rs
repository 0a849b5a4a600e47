//! Rate-limited logging of unparseable messages
//!
//! A poison producer can put thousands of malformed events on the bus per
//! second. Each one is counted, but only one warning per interval is
//! written, carrying the number suppressed since the last one.
//!
//! ```ignore
//! let log = ParseErrorLog::new(Duration::from_secs(10));
//! if let Err(e) = parse(message.data()) {
//!     log.record(message.id(), &e, message.data());
//! }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use cdcflow_protocol::ParseError;
use parking_lot::Mutex;
use tokio::time::Instant;

/// Default interval between parse-error warnings
pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Maximum payload bytes quoted in a warning
pub const MAX_PAYLOAD_LOG_LENGTH: usize = 256;

/// Rate-limited parse-error reporter
#[derive(Debug)]
pub struct ParseErrorLog {
    min_interval: Duration,
    last_log_time: Mutex<Option<Instant>>,
    suppressed: AtomicU64,
    total: AtomicU64,
}

impl ParseErrorLog {
    /// Log at most once per `min_interval`
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_log_time: Mutex::new(None),
            suppressed: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    /// Count a parse failure and warn if the interval has passed
    ///
    /// Returns true if a warning was written.
    pub fn record(&self, message_id: &str, error: &ParseError, payload: &[u8]) -> bool {
        let total = self.total.fetch_add(1, Ordering::Relaxed) + 1;

        let due = {
            let mut last = self.last_log_time.lock();
            let now = Instant::now();
            match *last {
                Some(at) if now.duration_since(at) < self.min_interval => false,
                _ => {
                    *last = Some(now);
                    true
                }
            }
        };

        if !due {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let suppressed = self.suppressed.swap(0, Ordering::Relaxed);
        tracing::warn!(
            message_id,
            kind = error.kind(),
            error = %error,
            payload = %truncate_payload(payload),
            suppressed,
            total_parse_errors = total,
            "dropping unparseable message"
        );
        true
    }

    /// Failures recorded since creation
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Failures not yet reported in a warning
    pub fn suppressed(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }
}

impl Default for ParseErrorLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_INTERVAL)
    }
}

fn truncate_payload(payload: &[u8]) -> String {
    if payload.len() > MAX_PAYLOAD_LOG_LENGTH {
        format!(
            "{}... (truncated from {} bytes)",
            String::from_utf8_lossy(&payload[..MAX_PAYLOAD_LOG_LENGTH]),
            payload.len()
        )
    } else {
        String::from_utf8_lossy(payload).into_owned()
    }
}
