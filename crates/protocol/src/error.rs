//! Parse error types
//!
//! Errors that can occur when decoding a change-event message body.

use thiserror::Error;

/// Errors that can occur while parsing a change-event envelope
///
/// Every variant is non-retriable: redelivering the same body yields the
/// same error, so callers acknowledge and drop the message.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Body is not valid UTF-8 JSON
    #[error("malformed JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    /// Top-level JSON value is not an object
    #[error("envelope is not a JSON object (found {found})")]
    NotAnObject {
        /// JSON type that was found
        found: &'static str,
    },

    /// A row image is present but is neither an object nor null
    #[error("'{field}' image must be an object or null (found {found})")]
    InvalidImage {
        /// `before` or `after`
        field: &'static str,
        /// JSON type that was found
        found: &'static str,
    },

    /// Neither a before nor an after image is present
    #[error("envelope has neither a 'before' nor an 'after' image")]
    MissingImage,
}

impl ParseError {
    /// Stable label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedJson(_) => "malformed_json",
            Self::NotAnObject { .. } => "not_an_object",
            Self::InvalidImage { .. } => "invalid_image",
            Self::MissingImage => "missing_image",
        }
    }

    #[inline]
    pub(crate) fn not_an_object(found: &'static str) -> Self {
        Self::NotAnObject { found }
    }

    #[inline]
    pub(crate) fn invalid_image(field: &'static str, found: &'static str) -> Self {
        Self::InvalidImage { field, found }
    }
}
