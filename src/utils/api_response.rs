use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt::Display;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub status_code: u16,
    pub message: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<serde_json::Value>,
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> axum::response::Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a success response
    pub fn success(status: StatusCode, message: impl Into<String>, data: T) -> Self {
        ApiResponse {
            success: true,
            status_code: status.as_u16(),
            message: message.into(),
            timestamp: Utc::now().to_rfc3339(),
            data: Some(data),
            errors: None,
        }
    }

    /// Create an error response
    pub fn error(
        status: StatusCode,
        message: impl Into<String>,
        errors: Option<serde_json::Value>,
    ) -> Self {
        ApiResponse {
            success: false,
            status_code: status.as_u16(),
            message: message.into(),
            timestamp: Utc::now().to_rfc3339(),
            data: None,
            errors,
        }
    }
}

impl ApiResponse<()> {
    /// 500 with the underlying error attached under `errors.error`
    pub fn internal(message: impl Into<String>, err: impl Display) -> Self {
        let message: String = message.into();
        tracing::error!("{}: {}", message, err);
        ApiResponse::error(
            StatusCode::INTERNAL_SERVER_ERROR,
            message,
            Some(json!({ "error": err.to_string() })),
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiResponse::error(StatusCode::NOT_FOUND, message, None)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiResponse::error(StatusCode::FORBIDDEN, message, None)
    }

    /// 422 carrying one message per offending field
    pub fn validation(errors: Vec<(&'static str, String)>) -> Self {
        let fields: serde_json::Map<String, serde_json::Value> = errors
            .into_iter()
            .map(|(field, message)| (field.to_string(), json!(message)))
            .collect();
        ApiResponse::error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Validation failed",
            Some(serde_json::Value::Object(fields)),
        )
    }
}
