//! Domain Directory
//!
//! Durable mapping of tenant slugs and custom domains to tenant identity.
//! The directory is the single source of truth for slug and domain
//! uniqueness: conflicting inserts are rejected atomically by the store,
//! never by a separate existence check.
//!
//! Implementations:
//! - [`PgDirectory`]: PostgreSQL via sqlx (production)
//! - [`MemoryDirectory`]: in-process store (development and tests)

mod memory;
mod postgres;

pub use memory::MemoryDirectory;
pub use postgres::PgDirectory;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::DirectoryResult;
use crate::types::{CustomDomain, NewTenant, Tenant, Transition};

#[async_trait]
pub trait DomainDirectory: Send + Sync {
    // ---------------------------------------------------------------------
    // Tenants
    // ---------------------------------------------------------------------

    /// Create a tenant; `Conflict` if the slug is taken
    async fn create_tenant(&self, input: NewTenant) -> DirectoryResult<Tenant>;

    async fn find_tenant_by_id(&self, id: Uuid) -> DirectoryResult<Tenant>;

    /// Case-insensitive slug lookup
    async fn find_tenant_by_slug(&self, slug: &str) -> DirectoryResult<Tenant>;

    async fn list_tenants_for_owner(&self, owner_id: Uuid) -> DirectoryResult<Vec<Tenant>>;

    /// Delete a tenant and every custom domain that references it.
    /// Returns the removed domains so callers can invalidate routing caches.
    async fn delete_tenant(&self, id: Uuid) -> DirectoryResult<Vec<CustomDomain>>;

    // ---------------------------------------------------------------------
    // Custom domains
    // ---------------------------------------------------------------------

    /// Register a custom domain in `pending` state.
    ///
    /// The domain is normalized and validated before any storage access
    /// (`InvalidInput`). Concurrent registrations of the same domain yield
    /// exactly one success; every other caller observes `Conflict`.
    async fn register_custom_domain(
        &self,
        tenant_id: Uuid,
        domain: &str,
        cname_zone: &str,
    ) -> DirectoryResult<CustomDomain>;

    async fn find_domain_by_id(&self, id: Uuid) -> DirectoryResult<CustomDomain>;

    /// Look up a routable domain. Pending and failed records never match.
    async fn find_verified_domain(&self, hostname: &str) -> DirectoryResult<(Tenant, CustomDomain)>;

    /// Newest first
    async fn list_domains_for_tenant(&self, tenant_id: Uuid) -> DirectoryResult<Vec<CustomDomain>>;

    /// Pending domains, oldest first
    async fn list_pending_domains(&self, limit: usize) -> DirectoryResult<Vec<CustomDomain>>;

    /// `pending -> verified`. Idempotent: an already verified record is
    /// returned unchanged with its original `verified_at`.
    async fn mark_verified(
        &self,
        domain_id: Uuid,
        verified_at: OffsetDateTime,
    ) -> DirectoryResult<Transition>;

    /// `pending -> failed`. A verified record never regresses and is
    /// returned unchanged.
    async fn mark_failed(&self, domain_id: Uuid) -> DirectoryResult<Transition>;

    /// Count one completed provider check against a pending domain.
    /// Terminal records are returned as they are.
    async fn record_check(
        &self,
        domain_id: Uuid,
        checked_at: OffsetDateTime,
    ) -> DirectoryResult<CustomDomain>;

    async fn delete_custom_domain(&self, id: Uuid) -> DirectoryResult<CustomDomain>;

    /// Storage health check
    async fn ping(&self) -> DirectoryResult<()>;
}
