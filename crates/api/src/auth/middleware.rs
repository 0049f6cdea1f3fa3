//! Bearer authentication for the management API

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use uuid::Uuid;

use super::jwt::{JwtError, JwtManager};
use crate::error::ApiError;

/// Turns a presented bearer credential into the caller's owner ID
pub trait CredentialVerifier: Send + Sync {
    fn verify_credential(&self, token: &str) -> Result<Uuid, JwtError>;
}

impl CredentialVerifier for JwtManager {
    fn verify_credential(&self, token: &str) -> Result<Uuid, JwtError> {
        self.validate_token(token).map(|claims| claims.sub)
    }
}

/// State for the auth middleware
#[derive(Clone)]
pub struct AuthState {
    pub credentials: Arc<dyn CredentialVerifier>,
}

/// Authenticated caller, inserted as a request extension
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Reject requests without a valid bearer credential
pub async fn require_auth(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&request).ok_or(ApiError::Unauthorized)?;

    let user_id = state.credentials.verify_credential(token).map_err(|e| {
        tracing::debug!(error = %e, "Rejected bearer credential");
        ApiError::from(e)
    })?;

    request.extensions_mut().insert(AuthUser { user_id });
    Ok(next.run(request).await)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware::from_fn_with_state,
        routing::get,
        Extension, Router,
    };
    use tower::ServiceExt;

    const SECRET: &str = "test-secret-key-at-least-32-chars!";

    fn app() -> Router {
        let state = AuthState {
            credentials: Arc::new(JwtManager::new(SECRET, 1)),
        };
        Router::new()
            .route(
                "/me",
                get(|Extension(user): Extension<AuthUser>| async move { user.user_id.to_string() }),
            )
            .layer(from_fn_with_state(state, require_auth))
    }

    async fn call(auth: Option<String>) -> (StatusCode, String) {
        let mut builder = HttpRequest::builder().uri("/me");
        if let Some(value) = auth {
            builder = builder.header(AUTHORIZATION, value);
        }
        let response = app()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let (status, _) = call(None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_invalid_token_is_unauthorized() {
        let (status, body) = call(Some("Bearer nope".to_string())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("INVALID_TOKEN"));
    }

    #[tokio::test]
    async fn test_valid_token_sets_user() {
        let owner_id = Uuid::new_v4();
        let token = JwtManager::new(SECRET, 1).generate_token(owner_id).unwrap();

        let (status, body) = call(Some(format!("Bearer {}", token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, owner_id.to_string());
    }
}
