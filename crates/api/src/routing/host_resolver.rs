//! Host-to-Tenant Resolution
//!
//! Resolves incoming Host headers to tenant IDs:
//! - Main domain and www: example.com, www.example.com -> platform root
//! - Platform subdomains: alif.example.com -> tenant lookup by slug
//! - Custom domains: alif.com -> tenant lookup via verified custom domains

use hostgate_shared::{
    is_reserved_label, is_valid_domain, is_valid_slug, normalize_host, DirectoryError,
    DomainDirectory,
};
use std::sync::Arc;
use uuid::Uuid;

use super::DomainCache;

/// Syntactic class of a normalized host, decided without any lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostClass {
    /// The main domain or its `www` alias
    Root,
    /// A single valid, non-reserved label under the main domain
    PlatformSubdomain(String),
    /// Any other well-formed hostname
    CustomCandidate(String),
    /// Empty, malformed, reserved, or nested under the main domain
    Invalid,
}

/// Classify a host header value relative to the main domain
pub fn classify_host(host: &str, main_domain: &str) -> HostClass {
    let host = normalize_host(host);
    if host.is_empty() {
        return HostClass::Invalid;
    }

    if host == main_domain || host.strip_prefix("www.") == Some(main_domain) {
        return HostClass::Root;
    }

    let suffix = format!(".{}", main_domain);
    if let Some(label) = host.strip_suffix(&suffix) {
        // a.b.example.com is never a tenant, nor a custom domain
        if label.contains('.') || !is_valid_slug(label) || is_reserved_label(label) {
            return HostClass::Invalid;
        }
        return HostClass::PlatformSubdomain(label.to_string());
    }

    if is_valid_domain(&host) {
        HostClass::CustomCandidate(host)
    } else {
        HostClass::Invalid
    }
}

/// Outcome of resolving a host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingDecision {
    /// Serve the platform's root application
    PassThroughRoot,
    /// Serve the tenant's site
    TenantMatch(Uuid),
    /// Host is not bound to any tenant
    NoMatch,
}

impl RoutingDecision {
    pub fn tenant_id(&self) -> Option<Uuid> {
        match self {
            RoutingDecision::TenantMatch(id) => Some(*id),
            _ => None,
        }
    }
}

/// Host resolver with caching
#[derive(Clone)]
pub struct HostResolver {
    directory: Arc<dyn DomainDirectory>,
    cache: Arc<DomainCache>,
    main_domain: String,
}

impl HostResolver {
    pub fn new(directory: Arc<dyn DomainDirectory>, main_domain: impl Into<String>) -> Self {
        Self::with_cache(directory, main_domain, Arc::new(DomainCache::new()))
    }

    pub fn with_cache(
        directory: Arc<dyn DomainDirectory>,
        main_domain: impl Into<String>,
        cache: Arc<DomainCache>,
    ) -> Self {
        Self {
            directory,
            cache,
            main_domain: main_domain.into(),
        }
    }

    /// Resolve a host header to a routing decision
    ///
    /// Only storage failures are errors; an unknown or unverified host is
    /// `NoMatch`. Errors are never cached.
    pub async fn resolve(&self, host: &str) -> Result<RoutingDecision, ResolveError> {
        let (key, class) = match classify_host(host, &self.main_domain) {
            HostClass::Root => return Ok(RoutingDecision::PassThroughRoot),
            HostClass::Invalid => return Ok(RoutingDecision::NoMatch),
            HostClass::PlatformSubdomain(slug) => (normalize_host(host), Lookup::Slug(slug)),
            HostClass::CustomCandidate(domain) => (domain.clone(), Lookup::Domain(domain)),
        };

        if let Some(cached) = self.cache.get(&key) {
            return Ok(decision(cached));
        }

        let found = match class {
            Lookup::Slug(slug) => self
                .directory
                .find_tenant_by_slug(&slug)
                .await
                .map(|tenant| tenant.id),
            Lookup::Domain(domain) => self
                .directory
                .find_verified_domain(&domain)
                .await
                .map(|(tenant, _)| tenant.id),
        };

        let tenant_id = match found {
            Ok(id) => Some(id),
            Err(DirectoryError::NotFound { .. }) => None,
            Err(err) => return Err(ResolveError::Directory(err)),
        };

        self.cache.set(&key, tenant_id);
        tracing::debug!(host = %key, tenant_id = ?tenant_id, "Resolved host");
        Ok(decision(tenant_id))
    }

    /// Invalidate cache for a specific host
    pub fn invalidate_host(&self, host: &str) {
        self.cache.invalidate(&normalize_host(host));
    }

    /// Invalidate all cached entries for a tenant
    pub fn invalidate_tenant(&self, tenant_id: Uuid) {
        self.cache.invalidate_tenant(tenant_id);
    }

    pub fn cache(&self) -> &DomainCache {
        &self.cache
    }

    pub fn main_domain(&self) -> &str {
        &self.main_domain
    }
}

enum Lookup {
    Slug(String),
    Domain(String),
}

fn decision(tenant_id: Option<Uuid>) -> RoutingDecision {
    match tenant_id {
        Some(id) => RoutingDecision::TenantMatch(id),
        None => RoutingDecision::NoMatch,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Directory lookup failed: {0}")]
    Directory(#[from] DirectoryError),
}
