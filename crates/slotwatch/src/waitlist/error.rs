//! Error types for the waiting-list reconciler.

use thiserror::Error;

/// Failures raised by a studio store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying database call failed
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored document could not be encoded or decoded
    #[error("Malformed document: {0}")]
    Document(#[from] serde_json::Error),

    /// The store's connection lock was poisoned by a panicking writer
    #[error("Store unavailable: {message}")]
    Unavailable { message: String },
}

/// Errors that can occur while reconciling a class.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ReconcileError {
    /// A store read or write failed
    #[error("Store error: {message}")]
    Store { message: String },

    /// A conditional write lost to a concurrent reconciliation, twice
    #[error("Concurrent write conflict on notification {tag}")]
    Conflict { tag: String },

    /// Reconciliation of a single class exceeded its time budget
    #[error("Reconciliation of class {class_id} timed out after {elapsed_secs:.1}s")]
    Timeout { class_id: String, elapsed_secs: f64 },

    /// The requested class does not exist
    #[error("Class not found: {class_id}")]
    ClassNotFound { class_id: String },
}

impl ReconcileError {
    /// Returns true if a later run is expected to succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReconcileError::Store { .. }
                | ReconcileError::Conflict { .. }
                | ReconcileError::Timeout { .. }
        )
    }
}

impl From<StoreError> for ReconcileError {
    fn from(err: StoreError) -> Self {
        ReconcileError::Store {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_are_retryable() {
        let err: ReconcileError = StoreError::Unavailable {
            message: "poisoned".to_string(),
        }
        .into();
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "Store error: Store unavailable: poisoned");
    }

    #[test]
    fn test_missing_class_is_not_retryable() {
        let err = ReconcileError::ClassNotFound {
            class_id: "c1".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_timeout_reports_elapsed_time() {
        let err = ReconcileError::Timeout {
            class_id: "c1".to_string(),
            elapsed_secs: 30.04,
        };
        assert!(err.is_retryable());
        assert_eq!(err.clone(), err);
        assert_eq!(
            err.to_string(),
            "Reconciliation of class c1 timed out after 30.0s"
        );
    }
}
