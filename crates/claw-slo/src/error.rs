//! Error types for the claw-slo crate.
//!
//! Errors fall into two families with different retry semantics:
//! - [`ValidationError`]: the SLO definition itself is malformed. Retrying
//!   without a spec change cannot help.
//! - [`StoreError`]: a lookup or write against an object store failed. These
//!   are surfaced to the caller, which re-delivers the object with backoff.

use thiserror::Error;

/// Reasons an SLO entry is rejected by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// One of name, objective, total query or error query is empty.
    #[error("required field name, objective, total query or error query is missing")]
    MissingField,

    /// A query template does not contain the window placeholder.
    #[error("SLI queries must contain the ${{window}} placeholder")]
    MissingPlaceholder,

    /// The objective is not a number in the accepted range.
    #[error("failed to parse SLO objective: {reason}")]
    InvalidObjective {
        /// Why the objective was rejected.
        reason: String,
    },
}

/// Failures reported by an object store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// No object exists under the given key.
    #[error("{kind} {key} not found")]
    NotFound {
        /// Kind of the object that was looked up.
        kind: String,
        /// `namespace/name` key of the object.
        key: String,
    },

    /// An object with the given key already exists.
    #[error("{kind} {key} already exists")]
    AlreadyExists {
        /// Kind of the object.
        kind: String,
        /// `namespace/name` key of the object.
        key: String,
    },

    /// Optimistic concurrency check failed.
    #[error("conflict on {key}: expected resource version {expected}, found {actual}")]
    Conflict {
        /// `namespace/name` key of the object.
        key: String,
        /// The resource version the writer based its change on.
        expected: String,
        /// The resource version currently stored.
        actual: String,
    },

    /// The store could not be reached or rejected the request.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Creates a not found error.
    #[must_use]
    pub fn not_found(kind: impl Into<String>, key: impl std::fmt::Display) -> Self {
        Self::NotFound {
            kind: kind.into(),
            key: key.to_string(),
        }
    }

    /// Returns true if this error means the object does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Errors that can occur while generating or converging SLO rules.
#[derive(Debug, Error)]
pub enum SloError {
    /// An SLO entry failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The source object has no SLO entries.
    #[error("no slos defined, skip reconciliation")]
    NoSlos,

    /// An object store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A duration literal is not a valid rule duration.
    #[error("invalid duration: {value}")]
    InvalidDuration {
        /// The rejected literal.
        value: String,
    },

    /// Invalid operator configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl SloError {
    /// Returns true if the caller should re-deliver the object later.
    ///
    /// Only store failures are transient. A missing object is not retried,
    /// and validation failures need a spec change first.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Store(err) => !err.is_not_found(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for SloError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type for SLO operations.
pub type Result<T> = std::result::Result<T, SloError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_messages() {
        assert_eq!(
            ValidationError::MissingField.to_string(),
            "required field name, objective, total query or error query is missing"
        );
        assert_eq!(
            ValidationError::MissingPlaceholder.to_string(),
            "SLI queries must contain the ${window} placeholder"
        );
        let err = ValidationError::InvalidObjective {
            reason: "invalid float literal".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to parse SLO objective: invalid float literal"
        );
    }

    #[test]
    fn validation_error_is_transparent() {
        let err: SloError = ValidationError::MissingField.into();
        assert_eq!(
            err.to_string(),
            "required field name, objective, total query or error query is missing"
        );
    }

    #[test]
    fn no_slos_message() {
        assert_eq!(
            SloError::NoSlos.to_string(),
            "no slos defined, skip reconciliation"
        );
    }

    #[test]
    fn conflict_display() {
        let err = StoreError::Conflict {
            key: "default/api".to_string(),
            expected: "3".to_string(),
            actual: "4".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "conflict on default/api: expected resource version 3, found 4"
        );
    }

    #[test]
    fn retryable_only_for_transient_store_errors() {
        assert!(SloError::Store(StoreError::Unavailable("timeout".into())).is_retryable());
        assert!(
            SloError::Store(StoreError::Conflict {
                key: "default/api".to_string(),
                expected: "1".to_string(),
                actual: "2".to_string(),
            })
            .is_retryable()
        );
        assert!(
            !SloError::Store(StoreError::not_found("PrometheusRule", "default/api")).is_retryable()
        );
        assert!(!SloError::Validation(ValidationError::MissingPlaceholder).is_retryable());
        assert!(!SloError::NoSlos.is_retryable());
    }

    #[test]
    fn error_from_serde_json() {
        let json_err = serde_json::from_str::<String>("invalid json");
        assert!(json_err.is_err());
        let err: SloError = json_err.unwrap_err().into();
        assert!(matches!(err, SloError::Serialization(_)));
    }
}
