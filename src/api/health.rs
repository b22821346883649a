use axum::{extract::State, routing::get, Json, Router};
use axum::http::StatusCode;
use serde_json::json;

use crate::app_state::AppState;

/// Defines health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/health/live", get(liveness_check))  // ✅ Liveness check
        .route("/health/ready", get(readiness_check)) // ✅ Readiness check
}

/// **Liveness Check (Basic Check)**  
/// - ✅ Verifies that the API is running  
/// - ❌ Does NOT check the database  
async fn liveness_check() -> Json<serde_json::Value> {
    Json(json!({ "success": true, "message": "API is live" }))
}

/// **Readiness Check (Database Connectivity Check)**  
/// - ✅ Ensures database is connected  
/// - ✅ Reports the live snapshot version  
async fn readiness_check(State(state): State<AppState>) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    sqlx::query("SELECT 1")
        .fetch_optional(&state.pool)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "success": false, "error": "Database unavailable", "details": e.to_string() }).to_string(),
            )
        })?;

    Ok(Json(json!({
        "success": true,
        "message": "API is ready",
        "snapshot_version": state.feed.current().version,
    })))
}
