//! Tenant management routes

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use hostgate_shared::{NewTenant, Tenant};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{ApiError, ApiJson},
    state::AppState,
};

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TenantResponse {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    /// Platform subdomain, e.g. `alif.example.com`
    pub subdomain: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl TenantResponse {
    fn new(tenant: Tenant, main_domain: &str) -> Self {
        Self {
            subdomain: tenant.subdomain_host(main_domain),
            id: tenant.id,
            slug: tenant.slug,
            name: tenant.name,
            description: tenant.description,
            created_at: tenant.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListTenantsResponse {
    pub tenants: Vec<TenantResponse>,
}

#[derive(Debug, Serialize)]
pub struct DeleteTenantResponse {
    pub deleted: bool,
    pub removed_domains: usize,
}

// ============================================================================
// Route handlers
// ============================================================================

/// List the caller's tenants
pub async fn list_tenants(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<ListTenantsResponse>, ApiError> {
    let tenants = state
        .directory
        .list_tenants_for_owner(auth_user.user_id)
        .await?;

    Ok(Json(ListTenantsResponse {
        tenants: tenants
            .into_iter()
            .map(|t| TenantResponse::new(t, &state.config.main_domain))
            .collect(),
    }))
}

/// Create a tenant owned by the caller
pub async fn create_tenant(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    ApiJson(req): ApiJson<CreateTenantRequest>,
) -> Result<(StatusCode, Json<TenantResponse>), ApiError> {
    let tenant = state
        .directory
        .create_tenant(NewTenant {
            owner_id: auth_user.user_id,
            name: req.name,
            slug: req.slug.to_lowercase(),
            description: req.description,
        })
        .await?;

    // Drop any NoMatch cached for the subdomain before it existed
    state
        .resolver
        .invalidate_host(&tenant.subdomain_host(&state.config.main_domain));

    tracing::info!(tenant_id = %tenant.id, slug = %tenant.slug, owner_id = %auth_user.user_id, "Tenant created");

    Ok((
        StatusCode::CREATED,
        Json(TenantResponse::new(tenant, &state.config.main_domain)),
    ))
}

/// Delete a tenant and all of its custom domains
pub async fn delete_tenant(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(tenant_id): Path<Uuid>,
) -> Result<Json<DeleteTenantResponse>, ApiError> {
    let removed = state
        .verifier
        .remove_tenant(auth_user.user_id, tenant_id)
        .await?;

    Ok(Json(DeleteTenantResponse {
        deleted: true,
        removed_domains: removed.len(),
    }))
}
