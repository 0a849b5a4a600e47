//! Bus error types

use thiserror::Error;

/// Result type for bus operations
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors raised by bus subscribers
#[derive(Debug, Error)]
pub enum BusError {
    /// The subscription could not be established
    #[error("subscription '{subscription}' is unavailable: {reason}")]
    SubscriptionUnavailable {
        /// Subscription identifier or path
        subscription: String,
        /// Why it is unavailable
        reason: String,
    },

    /// Transport failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response from the bus API
    #[error("{operation} returned {status}: {body}")]
    Status {
        /// API operation (pull, acknowledge, ...)
        operation: &'static str,
        /// HTTP status code
        status: u16,
        /// Response body (truncated)
        body: String,
    },

    /// Replay file could not be read
    #[error("failed to read '{path}': {source}")]
    Io {
        /// File path
        path: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// A single-use subscriber was subscribed twice
    #[error("subscriber '{0}' is already subscribed")]
    AlreadySubscribed(String),
}

impl BusError {
    /// Create a SubscriptionUnavailable error
    pub fn unavailable(subscription: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SubscriptionUnavailable {
            subscription: subscription.into(),
            reason: reason.into(),
        }
    }

    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status()
                        .is_some_and(|s| s.is_server_error() || s.as_u16() == 429)
            }
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_message() {
        let err = BusError::unavailable("projects/p/subscriptions/s", "404 Not Found");
        let msg = err.to_string();
        assert!(msg.contains("projects/p/subscriptions/s"));
        assert!(msg.contains("404"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_status_transience() {
        let server = BusError::Status {
            operation: "pull",
            status: 503,
            body: String::new(),
        };
        let throttled = BusError::Status {
            operation: "pull",
            status: 429,
            body: String::new(),
        };
        let denied = BusError::Status {
            operation: "pull",
            status: 403,
            body: String::new(),
        };
        assert!(server.is_transient());
        assert!(throttled.is_transient());
        assert!(!denied.is_transient());
    }
}
