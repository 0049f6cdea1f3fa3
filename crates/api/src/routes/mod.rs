//! HTTP routes

pub mod domains;
pub mod health;
pub mod site;
pub mod tenants;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};

use tower::Layer;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{auth::require_auth, error::ApiError, routing::route_by_host, state::AppState};

/// The full service: host routing around [`create_router`], with tracing,
/// CORS and compression outside so they see the URI the client sent
pub fn create_app(state: AppState) -> Router {
    let routed = middleware::from_fn_with_state(state.routing_state(), route_by_host)
        .layer(create_router(state));

    Router::new()
        .fallback_service(routed)
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Create all routes
///
/// Host routing is not applied here; see [`create_app`].
pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness));

    // Management API, bearer credential required
    let api_v1_routes = Router::new()
        .route(
            "/tenants",
            get(tenants::list_tenants).post(tenants::create_tenant),
        )
        .route(
            "/tenants/:tenant_id",
            axum::routing::delete(tenants::delete_tenant),
        )
        .route(
            "/tenants/:tenant_id/domains",
            get(domains::list_domains).post(domains::create_domain),
        )
        .route(
            "/domains/:domain_id",
            get(domains::get_domain).delete(domains::delete_domain),
        )
        .route("/domains/:domain_id/verify", post(domains::verify_domain))
        .layer(middleware::from_fn_with_state(auth_state, require_auth))
        .fallback(|| async { ApiError::NotFound("route") });

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1_routes)
        .fallback(site::serve)
        .layer(DefaultBodyLimit::max(64 * 1024))
        .with_state(state)
}
