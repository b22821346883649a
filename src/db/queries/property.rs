use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;
use sqlx::{PgConnection, PgPool};
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::db::models::property::{
    NewProperty, Property, PropertyStatus, PropertyStatusUpdate, PropertyType,
};
use crate::db::models::user::{RoleChange, UserProfile};
use crate::db::queries::user::apply_role_change;
use crate::middleware::auth::require_admin;
use crate::utils::analysis::{AnalysisOutcome, PropertyAnalysis};
use crate::utils::api_response::ApiResponse;
use crate::utils::feed::SnapshotView;
use crate::utils::pinning::{PinnedFile, PinningError};
use crate::utils::search::{filter_properties, PropertyFilter};

pub async fn list_properties(pool: &PgPool) -> Result<Vec<Property>, sqlx::Error> {
    sqlx::query_as::<_, Property>(r#"SELECT * FROM properties ORDER BY created_at DESC"#)
        .fetch_all(pool)
        .await
}

pub async fn get_property(pool: &PgPool, id: Uuid) -> Result<Option<Property>, sqlx::Error> {
    sqlx::query_as::<_, Property>(r#"SELECT * FROM properties WHERE id = $1"#)
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list_properties_by_owner(
    pool: &PgPool,
    owner_id: &str,
) -> Result<Vec<Property>, sqlx::Error> {
    sqlx::query_as::<_, Property>(
        r#"SELECT * FROM properties WHERE owner_id = $1 ORDER BY created_at DESC"#,
    )
    .bind(owner_id)
    .fetch_all(pool)
    .await
}

pub async fn list_properties_by_status(
    pool: &PgPool,
    status: PropertyStatus,
) -> Result<Vec<Property>, sqlx::Error> {
    sqlx::query_as::<_, Property>(
        r#"SELECT * FROM properties WHERE status = $1 ORDER BY created_at ASC"#,
    )
    .bind(status)
    .fetch_all(pool)
    .await
}

/// New listings always start as `pending_verification`.
pub async fn insert_property(
    conn: &mut PgConnection,
    new: &NewProperty,
    owner: &UserProfile,
) -> Result<Property, sqlx::Error> {
    let images: Vec<String> = new
        .images
        .iter()
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .collect();

    sqlx::query_as::<_, Property>(
        r#"
        INSERT INTO properties (
            id, name, property_type, description, rent, bedrooms, bathrooms, area_sqft,
            state, city, locality, address, latitude, longitude,
            owner_id, owner_name, owner_email, images, status
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(new.name.trim())
    .bind(new.property_type)
    .bind(new.description.trim())
    .bind(new.rent)
    .bind(new.bedrooms)
    .bind(new.bathrooms)
    .bind(new.area_sqft)
    .bind(new.state.trim())
    .bind(new.city.trim())
    .bind(new.locality.trim())
    .bind(new.address.trim())
    .bind(new.latitude)
    .bind(new.longitude)
    .bind(&owner.uid)
    .bind(owner.label())
    .bind(owner.email.clone().unwrap_or_default())
    .bind(images)
    .bind(PropertyStatus::PendingVerification)
    .fetch_one(conn)
    .await
}

/// Records the decision only if the listing is still pending.
/// `None` means it was missing or already decided.
pub async fn update_property_status(
    pool: &PgPool,
    id: Uuid,
    status: PropertyStatus,
    reviewer: &str,
) -> Result<Option<Property>, sqlx::Error> {
    sqlx::query_as::<_, Property>(
        r#"
        UPDATE properties
        SET status = $2, reviewed_by = $3, reviewed_at = NOW()
        WHERE id = $1 AND status = $4
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(reviewer)
    .bind(PropertyStatus::PendingVerification)
    .fetch_optional(pool)
    .await
}

pub async fn delete_property(pool: &PgPool, id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(r#"DELETE FROM properties WHERE id = $1"#)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Publishes a fresh snapshot; a failed refresh leaves the old one live.
async fn republish(state: &AppState) {
    if let Err(e) = state.feed.refresh(&state.pool).await {
        warn!("Property feed is stale after a write: {}", e);
    }
}

fn approved_matching(properties: &[Property], filter: &PropertyFilter) -> Vec<Property> {
    filter_properties(properties.iter().filter(|p| p.is_approved()), filter)
}

#[utoipa::path(
    get,
    path = "/properties",
    params(PropertyFilter),
    responses(
        (status = 200, description = "Approved properties matching the filters", body = [Property])
    ),
    tag = "Properties"
)]
pub async fn search_properties(
    State(state): State<AppState>,
    Query(filter): Query<PropertyFilter>,
) -> Result<ApiResponse<Vec<Property>>, ApiResponse<()>> {
    let snapshot = state.feed.current();
    let found = approved_matching(&snapshot.properties, &filter);

    Ok(ApiResponse::success(
        StatusCode::OK,
        format!("{} properties found", found.len()),
        found,
    ))
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LiveQuery {
    /// Last snapshot version the caller has seen
    pub since: Option<u64>,
}

#[utoipa::path(
    get,
    path = "/properties/live",
    params(LiveQuery, PropertyFilter),
    responses(
        (status = 200, description = "First snapshot newer than `since`, or the current one when the wait expires", body = SnapshotView)
    ),
    tag = "Properties"
)]
pub async fn live_properties(
    State(state): State<AppState>,
    Query(live): Query<LiveQuery>,
    Query(filter): Query<PropertyFilter>,
) -> Result<ApiResponse<SnapshotView>, ApiResponse<()>> {
    let snapshot = match live.since {
        Some(since) => state.feed.wait_newer(since, state.config.feed_wait).await,
        None => state.feed.current(),
    };

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Property snapshot",
        SnapshotView {
            version: snapshot.version,
            properties: approved_matching(&snapshot.properties, &filter),
        },
    ))
}

#[utoipa::path(
    get,
    path = "/properties/{id}",
    params(
        ("id" = Uuid, Path, description = "Property ID")
    ),
    responses(
        (status = 200, description = "Property detail", body = Property),
        (status = 404, description = "Property not found")
    ),
    tag = "Properties"
)]
pub async fn get_property_by_id(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<Property>, ApiResponse<()>> {
    let property = get_property(&state.pool, id)
        .await
        .map_err(|e| ApiResponse::internal("Failed to retrieve property", e))?
        .filter(Property::is_approved)
        .ok_or_else(|| ApiResponse::not_found("Property not found"))?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Property retrieved successfully",
        property,
    ))
}

#[utoipa::path(
    get,
    path = "/owners/{owner_id}/properties",
    params(
        ("owner_id" = String, Path, description = "Owner user id")
    ),
    responses(
        (status = 200, description = "Approved listings of one owner", body = [Property])
    ),
    tag = "Properties"
)]
pub async fn get_owner_properties(
    State(state): State<AppState>,
    Path(owner_id): Path<String>,
) -> Result<ApiResponse<Vec<Property>>, ApiResponse<()>> {
    let properties: Vec<Property> = list_properties_by_owner(&state.pool, &owner_id)
        .await
        .map_err(|e| ApiResponse::internal("Failed to retrieve properties", e))?
        .into_iter()
        .filter(Property::is_approved)
        .collect();

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Owner properties retrieved successfully",
        properties,
    ))
}

#[utoipa::path(
    get,
    path = "/me/properties",
    responses(
        (status = 200, description = "Caller's own listings in every status", body = [Property])
    ),
    tag = "Properties",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn get_my_properties(
    State(state): State<AppState>,
    Extension(profile): Extension<UserProfile>,
) -> Result<ApiResponse<Vec<Property>>, ApiResponse<()>> {
    let properties = list_properties_by_owner(&state.pool, &profile.uid)
        .await
        .map_err(|e| ApiResponse::internal("Failed to retrieve properties", e))?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Your properties",
        properties,
    ))
}

#[utoipa::path(
    post,
    path = "/properties",
    request_body = NewProperty,
    responses(
        (status = 201, description = "Listing submitted for verification", body = Property),
        (status = 422, description = "Validation failed")
    ),
    tag = "Properties",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn submit_property(
    State(state): State<AppState>,
    Extension(profile): Extension<UserProfile>,
    Json(new_property): Json<NewProperty>,
) -> Result<ApiResponse<Property>, ApiResponse<()>> {
    let errors = new_property.validate();
    if !errors.is_empty() {
        return Err(ApiResponse::validation(errors));
    }

    let mut tx = state
        .pool
        .begin()
        .await
        .map_err(|e| ApiResponse::internal("Failed to start transaction", e))?;

    let property = insert_property(&mut tx, &new_property, &profile)
        .await
        .map_err(|e| ApiResponse::internal("Failed to create property", e))?;

    apply_role_change(&mut tx, &profile.uid, RoleChange::ListedProperty)
        .await
        .map_err(|e| ApiResponse::internal("Failed to update owner role", e))?;

    tx.commit()
        .await
        .map_err(|e| ApiResponse::internal("Failed to commit property", e))?;

    state.profiles.invalidate(&profile.uid);
    info!("🏠 {} listed {} ({})", profile.uid, property.name, property.id);
    republish(&state).await;

    Ok(ApiResponse::success(
        StatusCode::CREATED,
        "Property submitted for verification",
        property,
    ))
}

/// The owner of a listing, or an admin, may delete it and read its requests.
pub fn ensure_manages_listing(
    property: &Property,
    profile: &UserProfile,
) -> Result<(), ApiResponse<()>> {
    if property.owner_id != profile.uid && !profile.is_admin() {
        return Err(ApiResponse::forbidden("Only the owner can manage this property"));
    }
    Ok(())
}

#[utoipa::path(
    delete,
    path = "/properties/{id}",
    params(
        ("id" = Uuid, Path, description = "Property ID")
    ),
    responses(
        (status = 200, description = "Property deleted"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Property not found")
    ),
    tag = "Properties",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn remove_property(
    State(state): State<AppState>,
    Extension(profile): Extension<UserProfile>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<()>, ApiResponse<()>> {
    let property = get_property(&state.pool, id)
        .await
        .map_err(|e| ApiResponse::internal("Failed to retrieve property", e))?
        .ok_or_else(|| ApiResponse::not_found("Property not found"))?;

    ensure_manages_listing(&property, &profile)?;

    let deleted = delete_property(&state.pool, id)
        .await
        .map_err(|e| ApiResponse::internal("Failed to delete property", e))?;
    if deleted == 0 {
        return Err(ApiResponse::not_found("Property not found"));
    }

    info!("🗑️ {} deleted property {}", profile.uid, id);
    republish(&state).await;

    Ok(ApiResponse::success(StatusCode::OK, "Property deleted", ()))
}

#[derive(ToSchema)]
#[allow(dead_code)]
pub struct ImageUpload {
    #[schema(value_type = Vec<String>, format = Binary)]
    pub files: Vec<Vec<u8>>,
}

fn pinning_failure(e: PinningError) -> ApiResponse<()> {
    match e {
        PinningError::NotConfigured => ApiResponse::error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Image uploads are not configured",
            None,
        ),
        other => {
            warn!("Image pinning failed: {}", other);
            ApiResponse::error(
                StatusCode::BAD_GATEWAY,
                "Failed to upload image",
                Some(json!({ "error": other.to_string() })),
            )
        }
    }
}

#[utoipa::path(
    post,
    path = "/uploads/images",
    request_body(content = ImageUpload, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Images pinned", body = [PinnedFile]),
        (status = 422, description = "No images in the upload"),
        (status = 502, description = "Pinning service failed"),
        (status = 503, description = "Pinning service not configured")
    ),
    tag = "Properties",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn upload_property_images(
    State(state): State<AppState>,
    Extension(profile): Extension<UserProfile>,
    mut multipart: Multipart,
) -> Result<ApiResponse<Vec<PinnedFile>>, ApiResponse<()>> {
    let mut pinned = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ApiResponse::<()>::error(
            StatusCode::BAD_REQUEST,
            "Malformed multipart body",
            Some(json!({ "error": e.to_string() })),
        )
    })? {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        if !content_type.as_deref().is_some_and(|ct| ct.starts_with("image/")) {
            return Err(ApiResponse::validation(vec![(
                "files",
                format!("{file_name} is not an image"),
            )]));
        }

        let data = field.bytes().await.map_err(|e| {
            ApiResponse::<()>::error(
                StatusCode::BAD_REQUEST,
                "Failed to read upload",
                Some(json!({ "error": e.to_string() })),
            )
        })?;

        let file = state
            .pinning
            .pin_file(&file_name, content_type.as_deref(), data)
            .await
            .map_err(pinning_failure)?;
        pinned.push(file);
    }

    if pinned.is_empty() {
        return Err(ApiResponse::validation(vec![(
            "files",
            "at least one image is required".to_string(),
        )]));
    }

    info!("📷 {} uploaded {} image(s)", profile.uid, pinned.len());
    Ok(ApiResponse::success(
        StatusCode::CREATED,
        "Images uploaded",
        pinned,
    ))
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StatusQuery {
    /// Defaults to `pending_verification`
    pub status: Option<PropertyStatus>,
}

#[utoipa::path(
    get,
    path = "/admin/properties",
    params(StatusQuery),
    responses(
        (status = 200, description = "Listings in the given status, oldest first", body = [Property]),
        (status = 403, description = "Admin access required")
    ),
    tag = "Admin",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn admin_list_properties(
    State(state): State<AppState>,
    Extension(profile): Extension<UserProfile>,
    Query(query): Query<StatusQuery>,
) -> Result<ApiResponse<Vec<Property>>, ApiResponse<()>> {
    require_admin(&profile)?;

    let status = query.status.unwrap_or(PropertyStatus::PendingVerification);
    let properties = list_properties_by_status(&state.pool, status)
        .await
        .map_err(|e| ApiResponse::internal("Failed to retrieve properties", e))?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        format!("{} {} properties", properties.len(), status.as_str()),
        properties,
    ))
}

#[utoipa::path(
    post,
    path = "/admin/properties/{id}/analysis",
    params(
        ("id" = Uuid, Path, description = "Property ID")
    ),
    responses(
        (status = 200, description = "Model analysis, or the labelled fallback when the model is unavailable", body = AnalysisOutcome),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "Property not found")
    ),
    tag = "Admin",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn analyze_property(
    State(state): State<AppState>,
    Extension(profile): Extension<UserProfile>,
    Path(id): Path<Uuid>,
) -> Result<ApiResponse<AnalysisOutcome>, ApiResponse<()>> {
    require_admin(&profile)?;

    let property = get_property(&state.pool, id)
        .await
        .map_err(|e| ApiResponse::internal("Failed to retrieve property", e))?
        .ok_or_else(|| ApiResponse::not_found("Property not found"))?;

    let outcome = state.analyzer.analyze(&property).await;
    info!(
        "🔎 {} analysed property {}: trust {}, degraded {}",
        profile.uid,
        id,
        outcome.analysis().trust_score,
        outcome.is_degraded()
    );
    let message = if outcome.is_degraded() {
        "Analysis unavailable, showing default assessment"
    } else {
        "Analysis complete"
    };

    Ok(ApiResponse::success(StatusCode::OK, message, outcome))
}

fn transition_conflict(from: PropertyStatus, to: PropertyStatus) -> ApiResponse<()> {
    ApiResponse::error(
        StatusCode::CONFLICT,
        format!("Cannot move property from {} to {}", from.as_str(), to.as_str()),
        None,
    )
}

/// Only pending listings can be decided; anything else is a 409.
pub fn check_status_transition(
    current: PropertyStatus,
    next: PropertyStatus,
) -> Result<(), ApiResponse<()>> {
    if current.can_transition_to(next) {
        Ok(())
    } else {
        Err(transition_conflict(current, next))
    }
}

#[utoipa::path(
    patch,
    path = "/admin/properties/{id}/status",
    params(
        ("id" = Uuid, Path, description = "Property ID")
    ),
    request_body = PropertyStatusUpdate,
    responses(
        (status = 200, description = "Decision recorded", body = Property),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "Property not found"),
        (status = 409, description = "Property was already decided")
    ),
    tag = "Admin",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn set_property_status(
    State(state): State<AppState>,
    Extension(profile): Extension<UserProfile>,
    Path(id): Path<Uuid>,
    Json(update): Json<PropertyStatusUpdate>,
) -> Result<ApiResponse<Property>, ApiResponse<()>> {
    require_admin(&profile)?;

    let current = get_property(&state.pool, id)
        .await
        .map_err(|e| ApiResponse::internal("Failed to retrieve property", e))?
        .ok_or_else(|| ApiResponse::not_found("Property not found"))?;

    check_status_transition(current.status, update.status)?;

    // Another admin may have decided it since the read above.
    let property = update_property_status(&state.pool, id, update.status, &profile.uid)
        .await
        .map_err(|e| ApiResponse::internal("Failed to update property status", e))?
        .ok_or_else(|| transition_conflict(current.status, update.status))?;

    info!(
        "✅ {} marked property {} as {}",
        profile.uid,
        id,
        property.status.as_str()
    );
    republish(&state).await;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Property status updated",
        property,
    ))
}

use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        search_properties,
        live_properties,
        get_property_by_id,
        get_owner_properties,
        get_my_properties,
        submit_property,
        remove_property,
        upload_property_images,
        admin_list_properties,
        analyze_property,
        set_property_status,
    ),
    components(
        schemas(
            Property,
            PropertyType,
            PropertyStatus,
            NewProperty,
            PropertyStatusUpdate,
            SnapshotView,
            PinnedFile,
            ImageUpload,
            AnalysisOutcome,
            PropertyAnalysis
        )
    ),
    tags(
        (name = "Properties", description = "Listings, search and uploads"),
        (name = "Admin", description = "Listing verification")
    )
)]
pub struct PropertyDoc;
