//! Explicit reconciliation triggers.
//!
//! These are the only HTTP routes that run the reconciler on demand; read
//! endpoints never do.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::server::types::ApiErrorType;
use crate::types::WaitlistState;
use crate::waitlist::{slot_tag, ClassOutcome, ReconcileError, SlotReconciler};

/// Converts a ReconcileError to an API response.
pub(crate) fn reconcile_error_to_response(error: ReconcileError) -> Response {
    let (status, message) = match &error {
        ReconcileError::ClassNotFound { .. } => (StatusCode::NOT_FOUND, "Class not found"),
        ReconcileError::Conflict { .. } => (
            StatusCode::CONFLICT,
            "Notification is being updated concurrently, retry later",
        ),
        ReconcileError::Timeout { .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Reconciliation timed out",
        ),
        ReconcileError::Store { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to reconcile waiting list",
        ),
    };

    ApiErrorType::from((status, message, Some(error.to_string()))).into_response()
}

/// Report of the reconciliation that follows an admin mutation.
///
/// Failures are reported in the body and never fail the mutation itself.
pub(crate) fn reconciliation_report(result: Result<ClassOutcome, ReconcileError>) -> Value {
    match result {
        Ok(outcome) => json!({ "ok": true, "outcome": outcome }),
        Err(e) => {
            warn!(error = %e, "Reconciliation after mutation failed");
            json!({
                "ok": false,
                "error": e.to_string(),
                "retryable": e.is_retryable(),
            })
        }
    }
}

/// POST /reconcile
///
/// Runs the full reconciliation over every class, like the daily job.
pub async fn post_reconcile_all(State(s): State<Arc<WaitlistState>>) -> Response {
    info!("POST /reconcile");

    match s.driver.run_all().await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(e) => {
            error!("Full reconciliation failed: {}", e);
            reconcile_error_to_response(e)
        }
    }
}

/// POST /classes/:class_id/reconcile
///
/// Reconciles one class and returns the outcome.
pub async fn post_reconcile_class(
    Path(class_id): Path<String>,
    State(s): State<Arc<WaitlistState>>,
) -> Response {
    info!("POST /classes/{}/reconcile", class_id);

    match s.driver.run_one(&class_id).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(e) => {
            error!("Reconciliation of class {} failed: {}", class_id, e);
            reconcile_error_to_response(e)
        }
    }
}

/// GET /classes/:class_id/notification
///
/// Returns the live slot notification of a class.
pub async fn get_class_notification(
    Path(class_id): Path<String>,
    State(s): State<Arc<WaitlistState>>,
) -> Response {
    info!("GET /classes/{}/notification", class_id);

    match SlotReconciler::new(s.db.as_ref()).find_existing(&class_id).await {
        Ok(Some(notification)) => (StatusCode::OK, Json(notification)).into_response(),
        Ok(None) => ApiErrorType::from((
            StatusCode::NOT_FOUND,
            "No slot notification",
            Some(format!("No notification tagged {}", slot_tag(&class_id))),
        ))
        .into_response(),
        Err(e) => reconcile_error_to_response(e),
    }
}
