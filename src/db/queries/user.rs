use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::app_state::AppState;
use crate::db::models::user::{Role, RoleChange, UserInfo, UserProfile};
use crate::middleware::auth::{require_admin, Claims};
use crate::utils::api_response::ApiResponse;

/// Optimistic writes give up after this many lost races.
const ROLE_CHANGE_ATTEMPTS: usize = 3;

/// Creates the profile on first sight and returns the stored row.
/// Uids listed in `ADMIN_UIDS` are promoted through the normal role path.
pub async fn ensure_profile(
    pool: &PgPool,
    claims: &Claims,
    bootstrap_admin: bool,
) -> Result<UserProfile, sqlx::Error> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO users (uid, email, display_name, role)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (uid) DO NOTHING
        "#,
    )
    .bind(&claims.sub)
    .bind(&claims.email)
    .bind(&claims.name)
    .bind(Role::Tenant)
    .execute(pool)
    .await?;

    if inserted.rows_affected() == 1 {
        info!("👤 Created profile for {}", claims.sub);
    }

    let mut profile = get_profile(pool, &claims.sub)
        .await?
        .ok_or(sqlx::Error::RowNotFound)?;

    if bootstrap_admin && !profile.is_admin() {
        let mut conn = pool.acquire().await?;
        profile.role = apply_role_change(&mut conn, &claims.sub, RoleChange::GrantAdmin).await?;
    }

    Ok(profile)
}

pub async fn get_profile(pool: &PgPool, uid: &str) -> Result<Option<UserProfile>, sqlx::Error> {
    sqlx::query_as::<_, UserProfile>(
        r#"SELECT uid, email, display_name, role, created_at FROM users WHERE uid = $1"#,
    )
    .bind(uid)
    .fetch_optional(pool)
    .await
}

pub async fn list_profiles(pool: &PgPool) -> Result<Vec<UserProfile>, sqlx::Error> {
    sqlx::query_as::<_, UserProfile>(
        r#"SELECT uid, email, display_name, role, created_at FROM users ORDER BY created_at"#,
    )
    .fetch_all(pool)
    .await
}

/// The only code that writes `users.role`.
///
/// Reads the current role, applies the transition and writes it back guarded
/// by `WHERE role = <old>`, retrying when a concurrent change got there first.
/// Runs on whatever connection it is handed, so callers can make it part of a
/// larger transaction.
pub async fn apply_role_change(
    conn: &mut PgConnection,
    uid: &str,
    change: RoleChange,
) -> Result<Role, sqlx::Error> {
    for _ in 0..ROLE_CHANGE_ATTEMPTS {
        let current: Role = sqlx::query_scalar(r#"SELECT role FROM users WHERE uid = $1"#)
            .bind(uid)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(sqlx::Error::RowNotFound)?;

        let next = current.apply(change);
        if next == current {
            return Ok(current);
        }

        let result = sqlx::query(r#"UPDATE users SET role = $2 WHERE uid = $1 AND role = $3"#)
            .bind(uid)
            .bind(next)
            .bind(current)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 1 {
            info!("🔑 {} moved from {} to {}", uid, current.as_str(), next.as_str());
            return Ok(next);
        }
        warn!("Role of {} changed concurrently, retrying", uid);
    }

    Err(sqlx::Error::Protocol(format!(
        "role of {uid} kept changing concurrently"
    )))
}

#[utoipa::path(
    get,
    path = "/me",
    responses(
        (status = 200, description = "Current authenticated user info", body = UserInfo),
        (status = 401, description = "Unauthorized")
    ),
    tag = "Users",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn get_me(
    Extension(claims): Extension<Claims>,
    Extension(profile): Extension<UserProfile>,
) -> Result<ApiResponse<UserInfo>, ApiResponse<()>> {
    Ok(ApiResponse::success(
        StatusCode::OK,
        "Authenticated user info",
        UserInfo {
            uid: profile.uid,
            email: profile.email.or(claims.email),
            display_name: profile.display_name.or(claims.name),
            email_verified: claims.email_verified,
            provider_id: claims.provider_id,
            role: profile.role,
        },
    ))
}

#[utoipa::path(
    get,
    path = "/admin/users",
    responses(
        (status = 200, description = "List all users", body = [UserProfile]),
        (status = 403, description = "Admin access required"),
        (status = 500, description = "Failed to retrieve users")
    ),
    tag = "Users",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn get_all_users(
    State(state): State<AppState>,
    Extension(profile): Extension<UserProfile>,
) -> Result<ApiResponse<Vec<UserProfile>>, ApiResponse<()>> {
    require_admin(&profile)?;

    let users = list_profiles(&state.pool)
        .await
        .map_err(|e| ApiResponse::internal("Failed to retrieve users", e))?;

    Ok(ApiResponse::success(
        StatusCode::OK,
        "Users retrieved successfully",
        users,
    ))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleUpdate {
    /// Only `admin` can be granted here; owner status follows from listing.
    pub role: Role,
}

#[utoipa::path(
    patch,
    path = "/admin/users/{uid}/role",
    params(
        ("uid" = String, Path, description = "User id")
    ),
    request_body = RoleUpdate,
    responses(
        (status = 200, description = "Role updated", body = UserProfile),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "User not found"),
        (status = 422, description = "Role cannot be assigned directly")
    ),
    tag = "Users",
    security(
        ("bearerAuth" = [])
    )
)]
pub async fn grant_admin(
    State(state): State<AppState>,
    Extension(profile): Extension<UserProfile>,
    Path(uid): Path<String>,
    Json(update): Json<RoleUpdate>,
) -> Result<ApiResponse<UserProfile>, ApiResponse<()>> {
    require_admin(&profile)?;

    if update.role != Role::Admin {
        return Err(ApiResponse::validation(vec![(
            "role",
            "only the admin role can be granted".to_string(),
        )]));
    }

    let mut conn = state
        .pool
        .acquire()
        .await
        .map_err(|e| ApiResponse::internal("Database unavailable", e))?;

    match apply_role_change(&mut conn, &uid, RoleChange::GrantAdmin).await {
        Ok(_) => {}
        Err(sqlx::Error::RowNotFound) => return Err(ApiResponse::not_found("User not found")),
        Err(e) => return Err(ApiResponse::internal("Failed to update role", e)),
    }
    drop(conn);

    state.profiles.invalidate(&uid);
    info!("🔑 {} granted admin to {}", profile.uid, uid);

    let updated = get_profile(&state.pool, &uid)
        .await
        .map_err(|e| ApiResponse::internal("Failed to load user", e))?
        .ok_or_else(|| ApiResponse::not_found("User not found"))?;

    Ok(ApiResponse::success(StatusCode::OK, "Role updated", updated))
}

use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::openapi::Components;
use utoipa::{Modify, OpenApi};

/// Registers the `bearerAuth` scheme referenced by every secured path.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let mut components = openapi.components.clone().unwrap_or(Components::default());
        components.add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
        );
        openapi.components = Some(components);
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        get_me,
        get_all_users,
        grant_admin,
    ),
    components(
        schemas(UserProfile, UserInfo, Role, RoleUpdate)
    ),
    tags(
        (name = "Users", description = "Profiles and roles")
    ),
    modifiers(&SecurityAddon)
)]
pub struct UserDoc;
