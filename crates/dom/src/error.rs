//! Error types for workspace operations
//!
//! Simple, flat error hierarchy. One variant per failure kind a request can hit.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DomError>;

/// Generic reason reported for every failed Remove when detailed errors are off.
pub const GENERIC_REMOVE_REASON: &str = "Failed to remove node";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Selector error: {0}")]
    SelectorError(String),

    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Collection is empty, nothing to remove")]
    EmptyCollection,

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl DomError {
    /// Response label for this failure kind
    pub fn reason(&self) -> &'static str {
        match self {
            DomError::ParseError(_) => "Failed to parse html",
            DomError::SelectorError(_) => "Invalid selector",
            DomError::InvalidScope(_) => "Invalid scope",
            DomError::InvalidHandle(_) => "Internal error",
            DomError::EmptyCollection => GENERIC_REMOVE_REASON,
            DomError::SerializationError(_) => "Failed to serialize",
        }
    }

    /// True when the error points at a bug in pipeline composition, not at bad input
    pub fn is_internal(&self) -> bool {
        matches!(self, DomError::InvalidHandle(_))
    }
}
