use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::app_state::AppState;
use crate::db::queries::property::{
    get_my_properties, get_owner_properties, get_property_by_id, live_properties,
    remove_property, search_properties, submit_property, upload_property_images,
};

/// Browsing needs no session
pub fn property_public_routes() -> Router<AppState> {
    Router::new()
        .route("/properties", get(search_properties)) // Approved listings, filtered
        .route("/properties/live", get(live_properties)) // Long-poll for a newer snapshot
        .route("/properties/{id}", get(get_property_by_id))
        .route("/owners/{owner_id}/properties", get(get_owner_properties))
}

pub fn property_routes() -> Router<AppState> {
    Router::new()
        .route("/properties", post(submit_property))
        .route("/properties/{id}", delete(remove_property))
        .route("/me/properties", get(get_my_properties))
        .route("/uploads/images", post(upload_property_images))
}
