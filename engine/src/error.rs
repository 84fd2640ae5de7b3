//! Error types for the Vantage engine.

use crate::{CollectionName, RecordId};
use thiserror::Error;

/// All possible errors from the Vantage engine.
///
/// Query construction errors (`CollectionNotFound`, `UnknownField`,
/// `UnsortableField`) indicate a malformed [`QuerySpec`](crate::QuerySpec)
/// and are programmer errors: they surface synchronously from
/// `perform_fetch` and are not retried at runtime.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Query construction errors
    #[error("collection not found: {0}")]
    CollectionNotFound(CollectionName),

    #[error("unknown field '{field}' in collection '{collection}'")]
    UnknownField {
        collection: CollectionName,
        field: String,
    },

    #[error("field '{field}' in collection '{collection}' is not sortable")]
    UnsortableField {
        collection: CollectionName,
        field: String,
    },

    // Write validation errors
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("missing required field: {0}")]
    MissingRequiredField(String),

    #[error("type mismatch for field '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: String,
        got: String,
    },

    #[error("record not found: {0}")]
    RecordNotFound(RecordId),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
