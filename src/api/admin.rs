use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::app_state::AppState;
use crate::db::queries::booking::admin_list_bookings;
use crate::db::queries::property::{admin_list_properties, analyze_property, set_property_status};
use crate::db::queries::user::{get_all_users, grant_admin};

/// Every handler here re-checks the admin role itself.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/properties", get(admin_list_properties)) // ?status=, pending by default
        .route("/admin/properties/{id}/analysis", post(analyze_property))
        .route("/admin/properties/{id}/status", patch(set_property_status))
        .route("/admin/bookings", get(admin_list_bookings))
        .route("/admin/users", get(get_all_users))
        .route("/admin/users/{uid}/role", patch(grant_admin))
}
