//! API error types and handling

use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hostgate_shared::DirectoryError;
use serde_json::json;

use crate::auth::JwtError;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    // Authentication errors
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Authentication required")]
    Unauthorized,

    // Validation errors
    #[error("Validation error: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("Invalid request: {0}")]
    BadRequest(String),

    // Resource errors
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{message}")]
    Conflict {
        field: &'static str,
        message: String,
    },

    // Internal errors
    #[error("Internal server error")]
    Internal,
    #[error("Service unavailable")]
    ServiceUnavailable,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, field) = match &self {
            // Authentication
            ApiError::InvalidToken => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN", None),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", None),

            // Validation
            ApiError::Validation { field, .. } => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", Some(*field))
            }
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", None),

            // Resources
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", None),
            ApiError::Conflict { field, .. } => (StatusCode::CONFLICT, "CONFLICT", Some(*field)),

            // Internal
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", None),
            ApiError::ServiceUnavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", None)
            }
        };

        let message = match &self {
            ApiError::Validation { message, .. } => message.clone(),
            ApiError::BadRequest(msg) => msg.clone(),
            other => other.to_string(),
        };

        let mut error = json!({
            "code": code,
            "message": message,
        });
        if let Some(field) = field {
            error["field"] = json!(field);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

impl From<DirectoryError> for ApiError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::NotFound { entity } => ApiError::NotFound(entity),
            DirectoryError::Conflict { field, .. } => ApiError::Conflict {
                field,
                message: match field {
                    "domain" => "Domain already in use".to_string(),
                    "slug" => "Slug already taken".to_string(),
                    other => format!("{} already in use", other),
                },
            },
            DirectoryError::InvalidInput { field, message } => {
                ApiError::Validation { field, message }
            }
            DirectoryError::InvalidTransition { from, to } => ApiError::Conflict {
                field: "status",
                message: format!("Domain is {} and cannot become {}", from, to),
            },
            DirectoryError::UpstreamUnavailable(reason) => {
                tracing::error!(reason = %reason, "Directory unavailable");
                ApiError::ServiceUnavailable
            }
        }
    }
}

impl From<JwtError> for ApiError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Encoding(reason) => {
                tracing::error!(reason = %reason, "Token encoding failed");
                ApiError::Internal
            }
            _ => ApiError::InvalidToken,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

/// `Json` extractor whose rejections use the API error body
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
