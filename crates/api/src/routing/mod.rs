//! Host-based tenant routing
//!
//! Resolves incoming Host headers to tenants, enabling URLs like:
//! - Platform subdomains: alif.example.com
//! - Custom domains: alif.com

mod cache;
mod host_resolver;
mod middleware;

pub use cache::{CacheStats, DomainCache};
pub use host_resolver::{classify_host, HostClass, HostResolver, ResolveError, RoutingDecision};
pub use middleware::{route_by_host, BypassPrefixes, RoutingState, TenantContext};
