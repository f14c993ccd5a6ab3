//! Model Error Types

use thiserror::Error;

/// Errors while decoding or interpreting model data
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    /// Payload could not be deserialized
    #[error("Decode error: {0}")]
    Decode(String),

    /// Required sub-message absent from the event
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Stored value does not map to a known variant
    #[error("Invalid data format: {0}")]
    InvalidFormat(String),
}
