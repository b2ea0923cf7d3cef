use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

use crate::types::WaitlistState;

/// GET /health
pub async fn get_health(State(s): State<Arc<WaitlistState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "ok",
            "daily_schedule": s.config.schedule.enabled,
        })),
    )
}
