use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use moka::sync::Cache; // ✅ High-performance TTL Cache
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use crate::app_state::AppState;
use crate::config::Config;
use crate::db::models::user::UserProfile;
use crate::db::queries::user::ensure_profile;
use crate::utils::api_response::ApiResponse;

/// Session issued by the identity provider.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject - the provider's user id
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    /// e.g. "password" or "google.com"
    #[serde(default)]
    pub provider_id: Option<String>,
    /// Expiration timestamp (UNIX TIME)
    pub exp: usize,
}

/// ✅ **Profile Cache Using `moka`**
pub type ProfileCache = Arc<Cache<String, UserProfile>>;

/// ✅ **Initialize the `moka` Cache**
pub fn create_profile_cache() -> ProfileCache {
    Arc::new(
        Cache::builder()
            .time_to_live(Duration::from_secs(600)) // ✅ TTL = 10 minutes
            .max_capacity(10_000)
            .build(),
    )
}

pub fn decode_session(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
}

/// ✅ **JWT Middleware** (Handles Token Authentication)
pub async fn jwt_middleware(mut req: Request<Body>, next: Next) -> Result<Response, Response> {
    let auth_header = req.headers().get("Authorization").ok_or_else(|| {
        tracing::error!("Missing Authorization header");
        ApiResponse::<()>::error(StatusCode::UNAUTHORIZED, "Missing Authorization header", None)
            .into_response()
    })?;

    let token_str = auth_header.to_str().map_err(|_| {
        tracing::error!("Invalid Authorization header format");
        ApiResponse::<()>::error(StatusCode::BAD_REQUEST, "Invalid Authorization header format", None)
            .into_response()
    })?;

    let token = token_str.strip_prefix("Bearer ").ok_or_else(|| {
        tracing::error!("Invalid token format (missing 'Bearer ' prefix)");
        ApiResponse::<()>::error(
            StatusCode::BAD_REQUEST,
            "Invalid token format (missing 'Bearer ' prefix)",
            None,
        )
        .into_response()
    })?;

    let claims = decode_session(token, &Config::get().jwt_secret).map_err(|e| {
        tracing::error!("JWT decoding failed: {:?}", e);
        ApiResponse::<()>::error(
            StatusCode::UNAUTHORIZED,
            "Invalid token",
            Some(json!({ "error": e.to_string() })),
        )
        .into_response()
    })?;

    tracing::debug!("Session accepted for {}", claims.sub);
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Resolves the caller's profile, creating it on first sight.
pub async fn profile_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    let claims = req.extensions().get::<Claims>().cloned().ok_or_else(|| {
        error!("Missing JWT claims in request");
        ApiResponse::<()>::error(StatusCode::UNAUTHORIZED, "Missing JWT claims in request", None)
            .into_response()
    })?;

    // ✅ **Check cache first before querying DB**
    if let Some(profile) = state.profiles.get(&claims.sub) {
        req.extensions_mut().insert(profile);
        return Ok(next.run(req).await);
    }

    let bootstrap_admin = state.config.is_bootstrap_admin(&claims.sub);
    let profile = ensure_profile(&state.pool, &claims, bootstrap_admin)
        .await
        .map_err(|e| {
            error!("Failed to load profile for {}: {:?}", claims.sub, e);
            ApiResponse::<()>::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load user profile",
                Some(json!({ "error": e.to_string() })),
            )
            .into_response()
        })?;

    state.profiles.insert(claims.sub.clone(), profile.clone());
    req.extensions_mut().insert(profile);
    Ok(next.run(req).await)
}

/// Rejects anyone who is not an admin.
pub fn require_admin(profile: &UserProfile) -> Result<(), ApiResponse<()>> {
    if profile.is_admin() {
        Ok(())
    } else {
        Err(ApiResponse::forbidden("Admin access required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::user::Role;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(exp: usize, secret: &str) -> String {
        let claims = Claims {
            sub: "uid-42".to_string(),
            email: Some("tara@example.com".to_string()),
            name: Some("Tara".to_string()),
            email_verified: true,
            provider_id: Some("password".to_string()),
            exp,
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn in_one_hour() -> usize {
        chrono::Utc::now().timestamp() as usize + 3600
    }

    #[test]
    fn valid_session_round_trips_identity_fields() {
        let claims = decode_session(&token(in_one_hour(), "s3cret"), "s3cret").unwrap();
        assert_eq!(claims.sub, "uid-42");
        assert_eq!(claims.email.as_deref(), Some("tara@example.com"));
        assert!(claims.email_verified);
    }

    #[test]
    fn wrong_secret_and_expired_sessions_are_rejected() {
        assert!(decode_session(&token(in_one_hour(), "s3cret"), "other").is_err());
        assert!(decode_session(&token(1_000, "s3cret"), "s3cret").is_err());
    }

    #[test]
    fn missing_optional_claims_default() {
        let minimal = serde_json::json!({ "sub": "uid-1", "exp": in_one_hour() });
        let claims: Claims = serde_json::from_value(minimal).unwrap();
        assert!(!claims.email_verified);
        assert!(claims.email.is_none());
    }

    #[test]
    fn only_admins_pass_admin_gate() {
        let mut profile = UserProfile {
            uid: "uid-1".to_string(),
            email: None,
            display_name: None,
            role: Role::Owner,
            created_at: chrono::Utc::now(),
        };
        assert!(require_admin(&profile).is_err());
        profile.role = Role::Admin;
        assert!(require_admin(&profile).is_ok());
    }
}
