//! Host-based routing middleware
//!
//! Must wrap the whole `Router` (not be added with `Router::layer`) so the
//! rewritten URI is what the router matches on.

use axum::{
    extract::{Request, State},
    http::{header::HOST, uri::PathAndQuery, Uri},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::host_resolver::{HostResolver, RoutingDecision};

/// Path prefixes that are never tenant-routed
#[derive(Debug, Clone)]
pub struct BypassPrefixes(Arc<[String]>);

impl BypassPrefixes {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prefixes: Vec<String> = prefixes
            .into_iter()
            .map(Into::into)
            .map(|p| p.trim_end_matches('/').to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Self(prefixes.into())
    }

    /// Prefix match on a segment boundary: `/api` covers `/api/x` but not `/apiary`
    pub fn matches(&self, path: &str) -> bool {
        self.0.iter().any(|prefix| {
            path.strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
        })
    }
}

/// State for the routing middleware
#[derive(Clone)]
pub struct RoutingState {
    pub resolver: HostResolver,
    pub bypass: BypassPrefixes,
    pub timeout: Duration,
}

/// Attached to requests rewritten to a tenant's site
#[derive(Debug, Clone)]
pub struct TenantContext {
    pub tenant_id: Uuid,
    pub host: String,
    /// Path as the client sent it, before the rewrite
    pub original_path: String,
}

fn request_host(request: &Request) -> Option<String> {
    request
        .headers()
        .get(HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().authority().map(|a| a.to_string()))
}

fn tenant_uri(uri: &Uri, tenant_id: Uuid) -> Option<Uri> {
    let rewritten = match uri.query() {
        Some(query) => format!("/{}{}?{}", tenant_id, uri.path(), query),
        None => format!("/{}{}", tenant_id, uri.path()),
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(PathAndQuery::try_from(rewritten).ok()?);
    Uri::from_parts(parts).ok()
}

/// Resolve the request host and rewrite tenant traffic to `/{tenant_id}{path}`
///
/// Storage errors and slow lookups fail open: the request is served by the
/// platform root rather than rejected.
pub async fn route_by_host(
    State(state): State<RoutingState>,
    mut request: Request,
    next: Next,
) -> Response {
    if state.bypass.matches(request.uri().path()) {
        return next.run(request).await;
    }

    let host = request_host(&request).unwrap_or_default();

    let decision =
        match tokio::time::timeout(state.timeout, state.resolver.resolve(&host)).await {
            Ok(Ok(decision)) => decision,
            Ok(Err(e)) => {
                tracing::warn!(host = %host, error = %e, "Host resolution failed, serving root");
                RoutingDecision::PassThroughRoot
            }
            Err(_) => {
                let timeout_ms = u64::try_from(state.timeout.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(
                    host = %host,
                    timeout_ms,
                    "Host resolution timed out, serving root"
                );
                RoutingDecision::PassThroughRoot
            }
        };

    request.extensions_mut().insert(decision);

    if let RoutingDecision::TenantMatch(tenant_id) = decision {
        let original_path = request.uri().path().to_string();
        match tenant_uri(request.uri(), tenant_id) {
            Some(uri) => {
                tracing::debug!(host = %host, tenant_id = %tenant_id, path = %original_path, "Routing to tenant");
                *request.uri_mut() = uri;
                request.extensions_mut().insert(TenantContext {
                    tenant_id,
                    host,
                    original_path,
                });
            }
            None => {
                tracing::warn!(host = %host, path = %original_path, "Could not rewrite tenant URI");
            }
        }
    }

    next.run(request).await
}
