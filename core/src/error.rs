//! Error types for the reconciliation core.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Error taxonomy for the ownership and subscription core.
///
/// Errors are organized by how callers must react to them: validation
/// and conflict errors require caller correction and are never retried
/// by the system itself; store errors are transient and retried with
/// bounded attempts; processor errors abort the enclosing operation so
/// no local state is partially committed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Missing or invalid input (blank rejection reason, unresolved
    /// catalog title, malformed payload).
    #[error("validation failed: {message}")]
    Validation {
        /// What was wrong with the input
        message: String,
    },

    /// A state invariant would be violated (transferring a copy in
    /// active use, illegal workflow transition).
    #[error("conflict: {message}")]
    Conflict {
        /// The conflicting condition
        message: String,
    },

    /// A referenced entity does not exist.
    #[error("{entity} not found")]
    NotFound {
        /// Kind of entity that was missing
        entity: &'static str,
    },

    /// Store round-trip failure or visibility race. Retryable.
    #[error("store error: {0}")]
    Store(String),

    /// The external payment processor call failed. The enclosing
    /// operation must abort rather than partially commit.
    #[error("payment processor error: {0}")]
    Processor(String),
}

impl CoreError {
    /// Build a validation error from any displayable message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Build a conflict error from any displayable message.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Build a not-found error for an entity kind.
    #[must_use]
    pub const fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    /// Build a transient store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Returns `true` if the error is worth retrying locally.
    ///
    /// Only store round-trip failures qualify; validation and conflict
    /// errors require caller correction, and processor failures are
    /// surfaced so the idempotent sender retries the whole delivery.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_))
    }

    /// Returns `true` if the error is due to caller input or state the
    /// caller can observe, and should map to a 4xx response.
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::Conflict { .. } | Self::NotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_are_retryable() {
        assert!(CoreError::store("connection reset").is_retryable());
        assert!(!CoreError::validation("blank reason").is_retryable());
        assert!(!CoreError::conflict("copy in use").is_retryable());
    }

    #[test]
    fn user_errors_are_classified() {
        assert!(CoreError::validation("bad input").is_user_error());
        assert!(CoreError::not_found("Member").is_user_error());
        assert!(!CoreError::Processor("timeout".into()).is_user_error());
    }
}
