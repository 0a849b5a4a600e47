//! Engine error types

use cdcflow_bus::BusError;
use thiserror::Error;

/// Errors that stop the engine
///
/// Per-message and per-flush failures are not errors here: they are
/// counted, logged and survived.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The subscription could not be opened
    #[error("failed to subscribe: {0}")]
    Subscribe(#[from] BusError),

    /// The flusher task panicked; rows it held may be lost
    #[error("flusher task failed: {0}")]
    Flusher(String),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
