use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;

use crate::server::endpoints::{reconcile, roster, status};
use crate::types::WaitlistState;

mod endpoints;
mod types;

pub use endpoints::reconcile::{get_class_notification, post_reconcile_all, post_reconcile_class};
pub use endpoints::roster::{
    get_roster, post_booking, post_waiting_list, put_booking_status, AddWaitingListBody,
    CreateBookingBody, UpdateStatusBody, WaitingListUser,
};
pub use endpoints::status::get_health;
pub use types::ApiErrorType;

/// Creates a router that can be used by `axum`.
///
/// # Parameters
/// - `app_state`: The app server state.
///
/// # Returns
/// The router.
pub fn create_router(app_state: Arc<WaitlistState>) -> Router {
    // Explicit reconciliation triggers
    let reconcile_router = Router::new()
        .route("/reconcile", post(reconcile::post_reconcile_all))
        .route(
            "/classes/:class_id/reconcile",
            post(reconcile::post_reconcile_class),
        )
        .route(
            "/classes/:class_id/notification",
            get(reconcile::get_class_notification),
        );

    // Roster view and the mutations that reconcile afterwards
    let roster_router = Router::new()
        .route("/classes/:class_id/roster", get(roster::get_roster))
        .route(
            "/classes/:class_id/waiting_list",
            post(roster::post_waiting_list),
        )
        .route("/classes/:class_id/bookings", post(roster::post_booking))
        .route(
            "/bookings/:booking_id/status",
            put(roster::put_booking_status),
        );

    Router::new()
        .route("/health", get(status::get_health))
        .merge(reconcile_router)
        .merge(roster_router)
        .with_state(app_state)
}
