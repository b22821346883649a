use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::models::booking::{BookingRequest, BookingStatus};
use crate::db::models::rating::{NewRating, PropertyRating, RatingSummary};
use crate::db::models::user::UserProfile;
use crate::db::queries::booking::store_failure;
use crate::utils::api_response::ApiResponse;

/// Only the tenant of an approved booking may rate it.
pub fn ensure_can_rate(booking: &BookingRequest, profile: &UserProfile) -> Result<(), ApiResponse<()>> {
    if booking.tenant_id != profile.uid {
        return Err(ApiResponse::forbidden("Only the tenant can rate this booking"));
    }
    if booking.status != BookingStatus::Approved {
        return Err(ApiResponse::forbidden("Only approved bookings can be rated"));
    }
    Ok(())
}

#[utoipa::path(
    post,
    path = "/bookings/{id}/rating",
    params(
        ("id" = Uuid, Path, description = "Booking request ID")
    ),
    request_body = NewRating,
    responses(
        (status = 201, description = "Rating stored", body = PropertyRating),
        (status = 200, description = "Earlier rating for this booking replaced", body = PropertyRating),
        (status = 403, description = "Only the tenant of an approved booking can rate"),
        (status = 404, description = "Booking request not found"),
        (status = 422, description = "Score out of range")
    ),
    tag = "Ratings",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn rate_booking(
    State(state): State<AppState>,
    Extension(profile): Extension<UserProfile>,
    Path(booking_id): Path<Uuid>,
    Json(new_rating): Json<NewRating>,
) -> Result<ApiResponse<PropertyRating>, ApiResponse<()>> {
    let errors = new_rating.validate();
    if !errors.is_empty() {
        return Err(ApiResponse::validation(errors));
    }

    let booking = state
        .bookings
        .get_request(booking_id)
        .await
        .map_err(store_failure)?
        .ok_or_else(|| ApiResponse::not_found("Booking request not found"))?;

    ensure_can_rate(&booking, &profile)?;

    let previous = state
        .bookings
        .get_rating_for_booking(booking_id)
        .await
        .map_err(store_failure)?;

    let rating = PropertyRating {
        id: Uuid::new_v4(),
        property_id: booking.property_id,
        booking_id,
        reviewer_id: profile.uid.clone(),
        reviewer_name: booking.tenant_name.clone(),
        score: new_rating.score,
        review: new_rating.review.unwrap_or_default().trim().to_string(),
        created_at: Utc::now(),
    };
    let stored = state.bookings.add_rating(rating).await.map_err(store_failure)?;

    info!("⭐ {} rated property {} with {}", profile.uid, stored.property_id, stored.score);
    match previous {
        Some(_) => Ok(ApiResponse::success(StatusCode::OK, "Rating updated", stored)),
        None => Ok(ApiResponse::success(StatusCode::CREATED, "Rating saved", stored)),
    }
}

#[utoipa::path(
    get,
    path = "/properties/{id}/rating",
    params(
        ("id" = Uuid, Path, description = "Property ID")
    ),
    responses(
        (status = 200, description = "Average score and number of ratings; 0.0 when unrated", body = RatingSummary)
    ),
    tag = "Ratings"
)]
pub async fn get_rating_summary(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
) -> Result<ApiResponse<RatingSummary>, ApiResponse<()>> {
    let average = state
        .bookings
        .get_property_rating(property_id)
        .await
        .map_err(store_failure)?;
    let count = state
        .bookings
        .get_ratings_for_property(property_id)
        .await
        .map_err(store_failure)?
        .len();

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Rating summary",
        RatingSummary {
            property_id,
            average,
            count,
        },
    ))
}

#[utoipa::path(
    get,
    path = "/properties/{id}/ratings",
    params(
        ("id" = Uuid, Path, description = "Property ID")
    ),
    responses(
        (status = 200, description = "Every rating for the property", body = [PropertyRating])
    ),
    tag = "Ratings"
)]
pub async fn list_property_ratings(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
) -> Result<ApiResponse<Vec<PropertyRating>>, ApiResponse<()>> {
    let mut ratings = state
        .bookings
        .get_ratings_for_property(property_id)
        .await
        .map_err(store_failure)?;
    ratings.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    Ok(ApiResponse::success(StatusCode::OK, "Property ratings", ratings))
}

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        rate_booking,
        get_rating_summary,
        list_property_ratings,
    ),
    components(
        schemas(PropertyRating, NewRating, RatingSummary)
    ),
    tags(
        (name = "Ratings", description = "Tenant ratings of rented properties")
    )
)]
pub struct RatingDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::property::PropertyType;
    use crate::db::models::user::Role;
    use crate::db::queries::booking::tests::{booking_for, profile};
    use crate::utils::search::tests::listing;

    #[test]
    fn only_the_tenant_of_an_approved_booking_rates() {
        let property = listing("Lakeview", PropertyType::Pg, "Bengaluru", "Hebbal", "2 Lake Rd", 9000);
        let mut booking = booking_for(&property, "kabir");
        let tenant = profile("kabir", Role::Tenant);

        let pending = ensure_can_rate(&booking, &tenant).unwrap_err();
        assert_eq!(pending.status_code, 403);

        booking.status = BookingStatus::Approved;
        assert!(ensure_can_rate(&booking, &tenant).is_ok());
        assert_eq!(
            ensure_can_rate(&booking, &profile("root", Role::Admin)).unwrap_err().status_code,
            403
        );

        booking.status = BookingStatus::Rejected;
        assert!(ensure_can_rate(&booking, &tenant).is_err());
    }
}
