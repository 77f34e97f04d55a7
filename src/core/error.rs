//! Typed error handling for the holdfast storage core
//!
//! The taxonomy mirrors the failure classes of the persistence layer:
//!
//! - Argument errors ([`StoreError::MissingArgument`], [`StoreError::OutOfRange`]):
//!   rejected synchronously before any storage work happens
//! - Invalid-state errors ([`StoreError::InvalidState`]): ordering applied with
//!   no keys, transaction misuse, unregistered entity types
//! - Validation errors ([`StoreError::Validation`]): structured field map,
//!   recoverable by the caller
//! - Storage-engine errors ([`StoreError::Conflict`]): concurrency conflicts
//!   and integrity violations, propagated unchanged
//!
//! Cancellation is not an error here: dropping an in-flight future aborts the
//! operation without touching committed state.

use std::collections::BTreeMap;
use std::fmt;

/// The main error type for the holdfast storage core
#[derive(Debug, Clone)]
pub enum StoreError {
    /// A required argument was missing or empty
    MissingArgument {
        argument: String,
    },

    /// An operation was issued in a state that does not allow it
    InvalidState {
        message: String,
    },

    /// A numeric argument was outside its allowed range
    OutOfRange {
        argument: String,
        message: String,
    },

    /// Field-level validation failed
    Validation(ValidationFailure),

    /// The storage engine rejected the operation
    Conflict {
        message: String,
    },
}

impl StoreError {
    pub(crate) fn missing_argument(argument: &str) -> Self {
        StoreError::MissingArgument {
            argument: argument.to_string(),
        }
    }

    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        StoreError::InvalidState {
            message: message.into(),
        }
    }

    pub(crate) fn out_of_range(argument: &str, message: impl Into<String>) -> Self {
        StoreError::OutOfRange {
            argument: argument.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn conflict(message: impl Into<String>) -> Self {
        StoreError::Conflict {
            message: message.into(),
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            StoreError::MissingArgument { .. } => "MISSING_ARGUMENT",
            StoreError::InvalidState { .. } => "INVALID_STATE",
            StoreError::OutOfRange { .. } => "OUT_OF_RANGE",
            StoreError::Validation(_) => "VALIDATION_FAILED",
            StoreError::Conflict { .. } => "CONFLICT",
        }
    }

    /// Get additional structured details for the error, when any exist
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            StoreError::Validation(failure) => Some(serde_json::json!({
                "fields": failure.errors(),
            })),
            StoreError::OutOfRange { argument, message } => Some(serde_json::json!({
                "argument": argument,
                "message": message,
            })),
            _ => None,
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::MissingArgument { argument } => {
                write!(f, "Missing required argument: {}", argument)
            }
            StoreError::InvalidState { message } => {
                write!(f, "Invalid operation: {}", message)
            }
            StoreError::OutOfRange { argument, message } => {
                write!(f, "Argument '{}' out of range: {}", argument, message)
            }
            StoreError::Validation(failure) => write!(f, "{}", failure),
            StoreError::Conflict { message } => {
                write!(f, "Storage conflict: {}", message)
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Validation(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<ValidationFailure> for StoreError {
    fn from(failure: ValidationFailure) -> Self {
        StoreError::Validation(failure)
    }
}

/// A failed validation: a map from snake_case field path to the messages
/// reported for that field.
///
/// Batch validation prefixes each key with the zero-based index of the
/// failing item, e.g. `[2].field_name`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Validation failed")]
pub struct ValidationFailure {
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationFailure {
    pub fn new(errors: BTreeMap<String, Vec<String>>) -> Self {
        Self { errors }
    }

    /// The field path → messages map
    pub fn errors(&self) -> &BTreeMap<String, Vec<String>> {
        &self.errors
    }

    /// Messages reported for one field path
    pub fn messages_for(&self, field: &str) -> Option<&[String]> {
        self.errors.get(field).map(Vec::as_slice)
    }
}

/// A specialized Result type for holdfast operations
pub type StoreResult<T> = Result<T, StoreError>;
