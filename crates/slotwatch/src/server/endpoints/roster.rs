//! Roster view and the admin mutations that change it.
//!
//! Every mutation here is followed by an explicit reconciliation of the
//! affected class. The roster view itself is read-only.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use super::reconcile::{reconcile_error_to_response, reconciliation_report};
use crate::server::types::ApiErrorType;
use crate::types::WaitlistState;
use crate::waitlist::{BookingStatus, ClassSession, ReconcileError, SlotContext, StoreError, WaitlistAggregator};

/// A user to put on a class's waiting list.
#[derive(Debug, Deserialize)]
pub struct WaitingListUser {
    #[serde(alias = "userId", alias = "userid")]
    pub user_id: String,
    #[serde(default, alias = "fullname", alias = "full_name")]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddWaitingListBody {
    pub users: Vec<WaitingListUser>,
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingBody {
    #[serde(alias = "userId", alias = "userid")]
    pub user_id: String,
    #[serde(default = "default_booking_status", alias = "Status")]
    pub status: String,
}

fn default_booking_status() -> String {
    "Booked".to_string()
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusBody {
    #[serde(alias = "Status")]
    pub status: String,
}

fn store_error_to_response(e: StoreError, message: &str) -> Response {
    error!("{}: {}", message, e);
    ApiErrorType::from((StatusCode::INTERNAL_SERVER_ERROR, message, Some(e.to_string())))
        .into_response()
}

fn class_not_found(class_id: &str) -> Response {
    reconcile_error_to_response(ReconcileError::ClassNotFound {
        class_id: class_id.to_string(),
    })
}

fn bad_request(message: &str, context: String) -> Response {
    ApiErrorType::from((StatusCode::BAD_REQUEST, message, Some(context))).into_response()
}

/// Only the statuses the reconciler understands may be written.
fn validate_status(raw: &str) -> Result<(), Response> {
    match BookingStatus::parse(Some(raw)) {
        BookingStatus::Other(status) => Err(bad_request("Unknown booking status", status)),
        BookingStatus::Missing => Err(bad_request("Missing booking status", raw.to_string())),
        _ => Ok(()),
    }
}

fn load_class(s: &WaitlistState, class_id: &str) -> Result<ClassSession, Response> {
    match s.db.load_class(class_id) {
        Ok(Some(class)) => Ok(class),
        Ok(None) => Err(class_not_found(class_id)),
        Err(e) => Err(store_error_to_response(e, "Failed to load class")),
    }
}

/// GET /classes/:class_id/roster
///
/// Returns the effective waiting list and booked count of a class.
pub async fn get_roster(
    Path(class_id): Path<String>,
    State(s): State<Arc<WaitlistState>>,
) -> Response {
    info!("GET /classes/{}/roster", class_id);

    let class = match load_class(&s, &class_id) {
        Ok(class) => class,
        Err(response) => return response,
    };

    match WaitlistAggregator::new(s.db.as_ref()).aggregate(&class_id).await {
        Ok(roster) => {
            let eligible = SlotContext {
                class_id: &class.id,
                title: &class.title,
                capacity: class.capacity,
                roster: &roster,
            }
            .is_eligible();

            let response = json!({
                "class_id": class.id,
                "title": class.title,
                "capacity": class.capacity,
                "waiting": roster.waiting,
                "unresolved_entries": roster.unresolved_entries,
                "booked_count": roster.booked_count,
                "slot_available": eligible,
            });

            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => store_error_to_response(e, "Failed to aggregate roster"),
    }
}

/// POST /classes/:class_id/waiting_list
///
/// Adds users to the waiting list (one entry per user), then reconciles.
pub async fn post_waiting_list(
    Path(class_id): Path<String>,
    State(s): State<Arc<WaitlistState>>,
    Json(body): Json<AddWaitingListBody>,
) -> Response {
    info!("POST /classes/{}/waiting_list ({} users)", class_id, body.users.len());

    if let Err(response) = load_class(&s, &class_id) {
        return response;
    }

    if let Some(user) = body.users.iter().find(|u| u.user_id.trim().is_empty()) {
        return bad_request("Missing user id", format!("{user:?}"));
    }

    let added_at = Utc::now().to_rfc3339();
    for user in &body.users {
        let user_id = user.user_id.trim();
        let entry = json!({
            "userId": user_id,
            "fullname": user.name.clone().unwrap_or_else(|| "-".to_string()),
            "email": user.email.clone().unwrap_or_default(),
            "added_at": added_at,
        });

        if let Err(e) = s.db.put_waiting_entry(&class_id, user_id, &entry) {
            return store_error_to_response(e, "Failed to add waiting-list entry");
        }
    }

    let reconciliation = reconciliation_report(s.driver.run_one(&class_id).await);

    (
        StatusCode::OK,
        Json(json!({
            "class_id": class_id,
            "added": body.users.len(),
            "reconciliation": reconciliation,
        })),
    )
        .into_response()
}

/// POST /classes/:class_id/bookings
///
/// Creates a booking for a user, then reconciles.
pub async fn post_booking(
    Path(class_id): Path<String>,
    State(s): State<Arc<WaitlistState>>,
    Json(body): Json<CreateBookingBody>,
) -> Response {
    info!("POST /classes/{}/bookings (user={})", class_id, body.user_id);

    let class = match load_class(&s, &class_id) {
        Ok(class) => class,
        Err(response) => return response,
    };

    let user_id = body.user_id.trim();
    if user_id.is_empty() {
        return bad_request("Missing user id", class_id);
    }

    if let Err(response) = validate_status(&body.status) {
        return response;
    }

    let document = json!({
        "Status": body.status.trim(),
        "booked_time": Utc::now().to_rfc3339(),
        "title": class.title,
    });

    let booking_id = match s.db.insert_booking(user_id, &class_id, &document) {
        Ok(id) => id,
        Err(e) => return store_error_to_response(e, "Failed to create booking"),
    };

    let reconciliation = reconciliation_report(s.driver.run_one(&class_id).await);

    (
        StatusCode::CREATED,
        Json(json!({
            "booking_id": booking_id,
            "class_id": class_id,
            "reconciliation": reconciliation,
        })),
    )
        .into_response()
}

/// PUT /bookings/:booking_id/status
///
/// Changes a booking's status (promotion, cancellation, completion), then
/// reconciles the booking's class.
pub async fn put_booking_status(
    Path(booking_id): Path<String>,
    State(s): State<Arc<WaitlistState>>,
    Json(body): Json<UpdateStatusBody>,
) -> Response {
    info!("PUT /bookings/{}/status ({})", booking_id, body.status);

    if let Err(response) = validate_status(&body.status) {
        return response;
    }

    let class_id = match s.db.update_booking_status(&booking_id, body.status.trim()) {
        Ok(Some(class_id)) => class_id,
        Ok(None) => {
            return ApiErrorType::from((
                StatusCode::NOT_FOUND,
                "Booking not found",
                Some(booking_id),
            ))
            .into_response()
        }
        Err(e) => return store_error_to_response(e, "Failed to update booking"),
    };

    let reconciliation = reconciliation_report(s.driver.run_one(&class_id).await);

    (
        StatusCode::OK,
        Json(json!({
            "booking_id": booking_id,
            "class_id": class_id,
            "reconciliation": reconciliation,
        })),
    )
        .into_response()
}
