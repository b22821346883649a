use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::models::booking::{
    BookingRequest, BookingStatus, BookingStatusUpdate, NewBookingRequest,
};
use crate::db::models::property::Property;
use crate::db::models::user::UserProfile;
use crate::db::queries::property::{ensure_manages_listing, get_property};
use crate::db::store::record_log::StoreError;
use crate::middleware::auth::require_admin;
use crate::utils::api_response::ApiResponse;

/// Maps embedded-store failures onto HTTP responses.
pub fn store_failure(e: StoreError) -> ApiResponse<()> {
    match e {
        StoreError::NotFound(_) => ApiResponse::not_found("Booking request not found"),
        StoreError::InvalidTransition { from, to } => ApiResponse::error(
            StatusCode::CONFLICT,
            format!("Cannot move booking from {from} to {to}"),
            None,
        ),
        other => ApiResponse::internal("Booking store failure", other),
    }
}

pub fn ensure_not_own_listing(
    property: &Property,
    profile: &UserProfile,
) -> Result<(), ApiResponse<()>> {
    if property.owner_id == profile.uid {
        return Err(ApiResponse::forbidden("You cannot book your own property"));
    }
    Ok(())
}

/// Requests are decided by the owner of the listing, or by an admin.
pub fn ensure_can_decide_booking(
    request: &BookingRequest,
    profile: &UserProfile,
) -> Result<(), ApiResponse<()>> {
    if request.owner_id != profile.uid && !profile.is_admin() {
        return Err(ApiResponse::forbidden(
            "Only the property owner can respond to this request",
        ));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/bookings",
    request_body = NewBookingRequest,
    responses(
        (status = 201, description = "Booking request sent to the owner", body = BookingRequest),
        (status = 403, description = "Owners cannot book their own listing"),
        (status = 404, description = "Property not found or not bookable"),
        (status = 422, description = "Validation failed")
    ),
    tag = "Bookings",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn create_booking_request(
    State(state): State<AppState>,
    Extension(profile): Extension<UserProfile>,
    Json(form): Json<NewBookingRequest>,
) -> Result<ApiResponse<BookingRequest>, ApiResponse<()>> {
    let errors = form.validate(Utc::now().date_naive());
    if !errors.is_empty() {
        return Err(ApiResponse::validation(errors));
    }

    let property = get_property(&state.pool, form.property_id)
        .await
        .map_err(|e| ApiResponse::internal("Failed to retrieve property", e))?
        .filter(|p| p.is_approved())
        .ok_or_else(|| ApiResponse::not_found("Property not found"))?;

    ensure_not_own_listing(&property, &profile)?;

    let request = BookingRequest::new(form, &property, &profile.uid);
    let stored = state
        .bookings
        .add_booking_request(request)
        .await
        .map_err(store_failure)?;

    Ok(ApiResponse::success(
        StatusCode::CREATED,
        "Booking request sent",
        stored,
    ))
}

#[utoipa::path(
    get,
    path = "/me/bookings",
    responses(
        (status = 200, description = "Requests the caller has sent, newest first", body = [BookingRequest])
    ),
    tag = "Bookings",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn get_my_bookings(
    State(state): State<AppState>,
    Extension(profile): Extension<UserProfile>,
) -> Result<ApiResponse<Vec<BookingRequest>>, ApiResponse<()>> {
    let requests = state
        .bookings
        .get_requests_by_tenant(&profile.uid)
        .await
        .map_err(store_failure)?;

    Ok(ApiResponse::success(StatusCode::OK, "Your bookings", requests))
}

#[utoipa::path(
    get,
    path = "/me/booking-requests",
    responses(
        (status = 200, description = "Requests for the caller's listings, newest first", body = [BookingRequest])
    ),
    tag = "Bookings",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn get_owner_inbox(
    State(state): State<AppState>,
    Extension(profile): Extension<UserProfile>,
) -> Result<ApiResponse<Vec<BookingRequest>>, ApiResponse<()>> {
    let requests = state
        .bookings
        .get_requests_by_owner(&profile.uid)
        .await
        .map_err(store_failure)?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Booking requests for your properties",
        requests,
    ))
}

#[utoipa::path(
    get,
    path = "/properties/{id}/booking-requests",
    params(
        ("id" = Uuid, Path, description = "Property ID")
    ),
    responses(
        (status = 200, description = "Requests for one listing, newest first", body = [BookingRequest]),
        (status = 403, description = "Only the listing owner or an admin can view them"),
        (status = 404, description = "Property not found")
    ),
    tag = "Bookings",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn get_property_requests(
    State(state): State<AppState>,
    Extension(profile): Extension<UserProfile>,
    Path(property_id): Path<Uuid>,
) -> Result<ApiResponse<Vec<BookingRequest>>, ApiResponse<()>> {
    let property = get_property(&state.pool, property_id)
        .await
        .map_err(|e| ApiResponse::internal("Failed to retrieve property", e))?
        .ok_or_else(|| ApiResponse::not_found("Property not found"))?;

    ensure_manages_listing(&property, &profile)?;

    let requests = state
        .bookings
        .get_requests_by_property(property_id)
        .await
        .map_err(store_failure)?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        format!("{} booking requests for {}", requests.len(), property.name),
        requests,
    ))
}

#[utoipa::path(
    get,
    path = "/admin/bookings",
    responses(
        (status = 200, description = "Every booking request, newest first", body = [BookingRequest]),
        (status = 403, description = "Admin access required")
    ),
    tag = "Admin",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn admin_list_bookings(
    State(state): State<AppState>,
    Extension(profile): Extension<UserProfile>,
) -> Result<ApiResponse<Vec<BookingRequest>>, ApiResponse<()>> {
    require_admin(&profile)?;

    let requests = state.bookings.list_requests().await.map_err(store_failure)?;
    Ok(ApiResponse::success(
        StatusCode::OK,
        format!("{} booking requests", requests.len()),
        requests,
    ))
}

#[utoipa::path(
    patch,
    path = "/bookings/{id}/status",
    params(
        ("id" = Uuid, Path, description = "Booking request ID")
    ),
    request_body = BookingStatusUpdate,
    responses(
        (status = 200, description = "Decision recorded", body = BookingRequest),
        (status = 403, description = "Only the listing owner or an admin can decide"),
        (status = 404, description = "Booking request not found"),
        (status = 409, description = "Request was already decided")
    ),
    tag = "Bookings",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn update_booking_status(
    State(state): State<AppState>,
    Extension(profile): Extension<UserProfile>,
    Path(id): Path<Uuid>,
    Json(update): Json<BookingStatusUpdate>,
) -> Result<ApiResponse<BookingRequest>, ApiResponse<()>> {
    let request = state
        .bookings
        .get_request(id)
        .await
        .map_err(store_failure)?
        .ok_or_else(|| ApiResponse::not_found("Booking request not found"))?;

    ensure_can_decide_booking(&request, &profile)?;
    if update.status == BookingStatus::Pending {
        return Err(ApiResponse::validation(vec![(
            "status",
            "status must be approved or rejected".to_string(),
        )]));
    }

    let updated = state
        .bookings
        .update_request_status(id, update.status)
        .await
        .map_err(store_failure)?;

    info!("📅 {} set booking {} to {}", profile.uid, id, updated.status.as_str());
    Ok(ApiResponse::success(
        StatusCode::OK,
        "Booking status updated",
        updated,
    ))
}

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        create_booking_request,
        get_my_bookings,
        get_owner_inbox,
        get_property_requests,
        admin_list_bookings,
        update_booking_status,
    ),
    components(
        schemas(BookingRequest, NewBookingRequest, BookingStatus, BookingStatusUpdate)
    ),
    tags(
        (name = "Bookings", description = "Booking requests between tenants and owners")
    )
)]
pub struct BookingDoc;
