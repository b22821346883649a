use axum::{
    routing::{get, post},
    Router,
};

use crate::app_state::AppState;
use crate::db::queries::rating::{get_rating_summary, list_property_ratings, rate_booking};

pub fn rating_public_routes() -> Router<AppState> {
    Router::new()
        .route("/properties/{id}/rating", get(get_rating_summary))
        .route("/properties/{id}/ratings", get(list_property_ratings))
}

pub fn rating_routes() -> Router<AppState> {
    Router::new().route("/bookings/{id}/rating", post(rate_booking))
}
