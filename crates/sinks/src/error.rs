//! Sink errors

use thiserror::Error;

/// Errors from warehouse backends and the batch writer
///
/// Any `Err` from a batch write is a total failure: none of the batch's
/// rows can be assumed written. Per-row rejections are not errors; they
/// are reported in [`crate::InsertOutcome`].
#[derive(Debug, Error)]
pub enum SinkError {
    /// HTTP transport failure
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// ClickHouse client error
    #[error("clickhouse error: {0}")]
    ClickHouse(#[from] clickhouse::error::Error),

    /// Non-success response from a warehouse API
    #[error("warehouse returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// Source table name cannot be used as a destination identifier
    #[error("invalid table name '{0}': expected [A-Za-z0-9_]+")]
    InvalidTableName(String),

    /// Row could not be encoded for the backend
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local output failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Destination table could not be created
    #[error("failed to provision table '{table}': {message}")]
    Provision {
        /// Destination table
        table: String,
        /// Backend message
        message: String,
    },
}

impl SinkError {
    /// Create a Provision error
    pub fn provision(table: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provision {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Whether repeating the same call may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status()
                        .is_some_and(|s| s.is_server_error() || s.as_u16() == 429)
            }
            Self::ClickHouse(e) => matches!(
                e,
                clickhouse::error::Error::Network(_) | clickhouse::error::Error::TimedOut
            ),
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
