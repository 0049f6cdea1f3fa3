//! Site fallback
//!
//! Everything that is not an API or health route lands here after host
//! routing. Tenant traffic arrives rewritten with a [`TenantContext`].

use axum::{
    extract::{Extension, State},
    http::Uri,
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::ApiError,
    routing::{RoutingDecision, TenantContext},
    state::AppState,
};

pub async fn serve(
    State(state): State<AppState>,
    tenant: Option<Extension<TenantContext>>,
    decision: Option<Extension<RoutingDecision>>,
    uri: Uri,
) -> Result<Json<Value>, ApiError> {
    if let Some(Extension(ctx)) = tenant {
        let tenant = state.directory.find_tenant_by_id(ctx.tenant_id).await?;
        return Ok(Json(json!({
            "site": "tenant",
            "tenant": {
                "id": tenant.id,
                "slug": tenant.slug,
                "name": tenant.name,
                "description": tenant.description,
            },
            "host": ctx.host,
            "path": ctx.original_path,
        })));
    }

    if let Some(Extension(RoutingDecision::NoMatch)) = decision {
        return Err(ApiError::NotFound("site"));
    }

    Ok(Json(json!({
        "site": "root",
        "main_domain": state.config.main_domain,
        "path": uri.path(),
    })))
}
