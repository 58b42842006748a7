//! Registry error types
//!
//! All registry failures are local to one request: they reject the offending
//! payload and leave stored state untouched.

use thiserror::Error;

use super::types::ValueShape;

/// Errors that can occur when mutating or querying the registry
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    /// Required fields missing or unusable
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Reading layout differs from the channel's established layout
    #[error("Shape mismatch on channel '{channel}': expected {expected}, found {found}")]
    ShapeMismatch {
        channel: String,
        expected: ValueShape,
        found: ValueShape,
    },

    /// Requested node has never been seen
    #[error("Node not found: {0}")]
    UnknownNode(String),
}

/// Result type alias for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;
