//! Error handling for the cannibalization audit

use thiserror::Error;

use crate::model::Dimension;

/// Result type alias for audit operations
pub type Result<T> = std::result::Result<T, AuditError>;

/// Main error type for audit operations
#[derive(Error, Debug)]
pub enum AuditError {
    /// A raw row carried a different number of keys than requested dimensions
    #[error("row {row}: expected {expected} dimension keys, found {actual}")]
    ShapeMismatch {
        row: usize,
        expected: usize,
        actual: usize,
    },

    /// The dataset lacks a dimension the aggregation groups on
    #[error("dataset has no '{0}' dimension")]
    MissingDimension(Dimension),

    /// The requested dimension list cannot be used
    #[error("invalid dimension list: {0}")]
    InvalidDimensions(String),

    /// IO-related errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
