use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::app_state::AppState;
use crate::db::queries::booking::{
    create_booking_request, get_my_bookings, get_owner_inbox, get_property_requests,
    update_booking_status,
};

pub fn booking_routes() -> Router<AppState> {
    Router::new()
        .route("/bookings", post(create_booking_request))
        .route("/bookings/{id}/status", patch(update_booking_status)) // Owner approves or rejects
        .route("/me/bookings", get(get_my_bookings)) // Tenant view
        .route("/me/booking-requests", get(get_owner_inbox)) // Owner inbox
        .route("/properties/{id}/booking-requests", get(get_property_requests))
}
