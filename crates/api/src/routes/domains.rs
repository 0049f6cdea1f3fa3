//! Custom domain routes
//!
//! These routes let tenant owners attach their own domains
//! (e.g., alif.com) next to the default platform subdomain.

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use hostgate_shared::CustomDomain;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiJson},
    state::AppState,
    verification::{Registration, Verification},
};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateDomainRequest {
    /// The custom domain (e.g., "alif.com")
    pub domain: String,
}

#[derive(Debug, Serialize)]
pub struct ListDomainsResponse {
    /// Platform subdomain URL, always available
    pub subdomain_url: String,
    pub custom_domains: Vec<CustomDomain>,
}

// ============================================================================
// Route handlers
// ============================================================================

/// List a tenant's custom domains, newest first
pub async fn list_domains(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<ListDomainsResponse>, ApiError> {
    let tenant = state
        .verifier
        .owned_tenant(auth_user.user_id, tenant_id)
        .await?;
    let custom_domains = state.directory.list_domains_for_tenant(tenant.id).await?;

    Ok(Json(ListDomainsResponse {
        subdomain_url: format!("https://{}", tenant.subdomain_host(&state.config.main_domain)),
        custom_domains,
    }))
}

/// Register a custom domain; responds with the DNS record to create
pub async fn create_domain(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(tenant_id): Path<Uuid>,
    ApiJson(req): ApiJson<CreateDomainRequest>,
) -> Result<(StatusCode, Json<Registration>), ApiError> {
    let registration = state
        .verifier
        .register(auth_user.user_id, tenant_id, &req.domain)
        .await?;

    Ok((StatusCode::CREATED, Json(registration)))
}

/// Get a specific domain by ID
pub async fn get_domain(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(domain_id): Path<Uuid>,
) -> Result<Json<CustomDomain>, ApiError> {
    let domain = state
        .verifier
        .find_for_owner(auth_user.user_id, domain_id)
        .await?;
    Ok(Json(domain))
}

/// Run a verification check now
///
/// An unreachable provider is not an error: the domain stays `pending` and
/// the outcome says `retry_later`.
pub async fn verify_domain(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(domain_id): Path<Uuid>,
) -> Result<Json<Verification>, ApiError> {
    let verification = state
        .verifier
        .check_for_owner(auth_user.user_id, domain_id)
        .await?;
    Ok(Json(verification))
}

/// Remove a custom domain
pub async fn delete_domain(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(domain_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .verifier
        .remove(auth_user.user_id, domain_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
