//! Error types for the PowerMax reconciler
//!
//! Call-level errors only. Per-field mutation failures are data (see
//! [`crate::reconcile::FieldChange`]) and per-field mapping skips are
//! diagnostics (see [`crate::mapping::MappingSkip`]); neither surfaces here
//! unless a caller explicitly asks for an aggregate report.

use std::time::Duration;
use thiserror::Error;

/// Unified error type for the reconciler
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Mapping Errors
    // =========================================================================
    #[error("Mapping error for {kind}: {reason}")]
    Mapping { kind: String, reason: String },

    #[error("Invalid attribute value: {0}")]
    InvalidAttribute(String),

    // =========================================================================
    // Reconcile Errors
    // =========================================================================
    #[error("Desired configuration for {kind} could not be decoded: {reason}")]
    DesiredDecode { kind: String, reason: String },

    #[error("Cannot resolve identifier for {kind}: {reason}")]
    IdentifierUnresolved { kind: String, reason: String },

    #[error("Partial update of {kind}/{id}: {report}")]
    PartialUpdate {
        kind: String,
        id: String,
        report: String,
    },

    // =========================================================================
    // Backend Errors
    // =========================================================================
    #[error("Resource not found: {kind}/{name}")]
    ResourceNotFound { kind: String, name: String },

    #[error("Resource already exists: {kind}/{name}")]
    ResourceExists { kind: String, name: String },

    #[error("Backend unavailable: {backend}")]
    BackendUnavailable { backend: String },

    #[error("Backend operation failed: {operation} on {resource}: {reason}")]
    BackendOperationFailed {
        operation: String,
        resource: String,
        reason: String,
    },

    // =========================================================================
    // Parse Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    // =========================================================================
    // IO Errors
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What re-running a failed command can achieve.
/// Nothing is retried automatically; this only shapes what the CLI reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Re-run once the array is reachable again
    RetryWithBackoff,
    /// Re-run after the array has had time to settle
    RetryAfter(Duration),
    /// The same input fails the same way; fix it first
    FixInput,
}

impl Error {
    /// Classify this error for the caller
    pub fn action(&self) -> ErrorAction {
        match self {
            Error::BackendUnavailable { .. } | Error::Io(_) => ErrorAction::RetryWithBackoff,

            // Some fields went through; the rest may succeed once the array settles
            Error::PartialUpdate { .. } => ErrorAction::RetryAfter(Duration::from_secs(30)),

            Error::ResourceNotFound { .. } | Error::IdentifierUnresolved { .. } => {
                ErrorAction::RetryAfter(Duration::from_secs(60))
            }

            Error::Configuration(_)
            | Error::DesiredDecode { .. }
            | Error::InvalidAttribute(_)
            | Error::Mapping { .. }
            | Error::JsonParse(_)
            | Error::YamlParse(_) => ErrorAction::FixInput,

            _ => ErrorAction::RetryWithBackoff,
        }
    }

    /// Whether re-running the same input can succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self.action(), ErrorAction::FixInput)
    }

    /// Shorthand used by backend adapters when a mutation is rejected
    pub fn backend(
        operation: impl Into<String>,
        resource: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Error::BackendOperationFailed {
            operation: operation.into(),
            resource: resource.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for the reconciler
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_actions() {
        let err = Error::PartialUpdate {
            kind: "host".into(),
            id: "h1".into(),
            report: "failed: name".into(),
        };
        assert_eq!(err.action(), ErrorAction::RetryAfter(Duration::from_secs(30)));

        let err = Error::DesiredDecode {
            kind: "host".into(),
            reason: "initiators: expected list".into(),
        };
        assert_eq!(err.action(), ErrorAction::FixInput);

        let err = Error::IdentifierUnresolved {
            kind: "storage_group".into(),
            reason: "observed state has no name".into(),
        };
        assert_eq!(err.action(), ErrorAction::RetryAfter(Duration::from_secs(60)));
    }

    #[test]
    fn test_error_retryable() {
        let unavailable = Error::BackendUnavailable {
            backend: "000197900123".into(),
        };
        assert!(unavailable.is_retryable());
        assert!(!Error::Configuration("invalid".into()).is_retryable());
        assert!(!Error::InvalidAttribute("size: expected number".into()).is_retryable());
    }

    #[test]
    fn test_backend_shorthand_message() {
        let err = Error::backend("rename_host", "h1", "name in use");
        assert_eq!(
            err.to_string(),
            "Backend operation failed: rename_host on h1: name in use"
        );
    }
}
