//! In-memory directory (for development without PostgreSQL)
//!
//! Every mutation runs under a single write lock, so uniqueness checks and
//! inserts are one atomic step just like a unique constraint.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::DomainDirectory;
use crate::error::{DirectoryError, DirectoryResult};
use crate::host::{cname_target, is_valid_slug, normalize_domain, normalize_host};
use crate::types::{CustomDomain, DomainStatus, NewTenant, Tenant, Transition};

#[derive(Default)]
struct State {
    tenants: HashMap<Uuid, Tenant>,
    /// slug -> tenant id
    slugs: HashMap<String, Uuid>,
    domains: HashMap<Uuid, CustomDomain>,
    /// domain name -> domain id
    hostnames: HashMap<String, Uuid>,
}

pub struct MemoryDirectory {
    state: RwLock<State>,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            unavailable: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
        }
    }

    /// Simulate a storage outage: every operation fails with `UpstreamUnavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Add artificial latency to every operation
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    async fn gate(&self) -> DirectoryResult<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DirectoryError::UpstreamUnavailable(
                "memory directory marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DomainDirectory for MemoryDirectory {
    async fn create_tenant(&self, input: NewTenant) -> DirectoryResult<Tenant> {
        let input = input.validated()?;
        self.gate().await?;

        let mut state = self.state.write().await;
        if state.slugs.contains_key(&input.slug) {
            return Err(DirectoryError::Conflict {
                field: "slug",
                value: input.slug,
            });
        }

        let tenant = Tenant {
            id: Uuid::new_v4(),
            slug: input.slug,
            name: input.name,
            owner_id: input.owner_id,
            description: input.description,
            created_at: OffsetDateTime::now_utc(),
        };
        state.slugs.insert(tenant.slug.clone(), tenant.id);
        state.tenants.insert(tenant.id, tenant.clone());
        Ok(tenant)
    }

    async fn find_tenant_by_id(&self, id: Uuid) -> DirectoryResult<Tenant> {
        self.gate().await?;
        let state = self.state.read().await;
        state
            .tenants
            .get(&id)
            .cloned()
            .ok_or(DirectoryError::not_found("tenant"))
    }

    async fn find_tenant_by_slug(&self, slug: &str) -> DirectoryResult<Tenant> {
        let slug = slug.trim().to_ascii_lowercase();
        if !is_valid_slug(&slug) {
            return Err(DirectoryError::not_found("tenant"));
        }
        self.gate().await?;

        let state = self.state.read().await;
        state
            .slugs
            .get(&slug)
            .and_then(|id| state.tenants.get(id))
            .cloned()
            .ok_or(DirectoryError::not_found("tenant"))
    }

    async fn list_tenants_for_owner(&self, owner_id: Uuid) -> DirectoryResult<Vec<Tenant>> {
        self.gate().await?;
        let state = self.state.read().await;
        let mut tenants: Vec<Tenant> = state
            .tenants
            .values()
            .filter(|t| t.owner_id == owner_id)
            .cloned()
            .collect();
        tenants.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tenants)
    }

    async fn delete_tenant(&self, id: Uuid) -> DirectoryResult<Vec<CustomDomain>> {
        self.gate().await?;
        let mut state = self.state.write().await;

        let tenant = state
            .tenants
            .remove(&id)
            .ok_or(DirectoryError::not_found("tenant"))?;
        state.slugs.remove(&tenant.slug);

        let domain_ids: Vec<Uuid> = state
            .domains
            .values()
            .filter(|d| d.tenant_id == id)
            .map(|d| d.id)
            .collect();

        let mut removed = Vec::with_capacity(domain_ids.len());
        for domain_id in domain_ids {
            if let Some(domain) = state.domains.remove(&domain_id) {
                state.hostnames.remove(&domain.domain);
                removed.push(domain);
            }
        }
        Ok(removed)
    }

    async fn register_custom_domain(
        &self,
        tenant_id: Uuid,
        domain: &str,
        cname_zone: &str,
    ) -> DirectoryResult<CustomDomain> {
        let domain = normalize_domain(domain)?;
        self.gate().await?;

        let mut state = self.state.write().await;
        let tenant = state
            .tenants
            .get(&tenant_id)
            .ok_or(DirectoryError::not_found("tenant"))?;

        if state.hostnames.contains_key(&domain) {
            return Err(DirectoryError::Conflict {
                field: "domain",
                value: domain,
            });
        }

        let record = CustomDomain {
            id: Uuid::new_v4(),
            cname: cname_target(tenant, cname_zone),
            domain,
            tenant_id,
            status: DomainStatus::Pending,
            verified_at: None,
            verification_attempts: 0,
            last_checked_at: None,
            created_at: OffsetDateTime::now_utc(),
        };
        state.hostnames.insert(record.domain.clone(), record.id);
        state.domains.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_domain_by_id(&self, id: Uuid) -> DirectoryResult<CustomDomain> {
        self.gate().await?;
        let state = self.state.read().await;
        state
            .domains
            .get(&id)
            .cloned()
            .ok_or(DirectoryError::not_found("domain"))
    }

    async fn find_verified_domain(&self, hostname: &str) -> DirectoryResult<(Tenant, CustomDomain)> {
        let hostname = normalize_host(hostname);
        self.gate().await?;

        let state = self.state.read().await;
        let domain = state
            .hostnames
            .get(&hostname)
            .and_then(|id| state.domains.get(id))
            .filter(|d| d.is_routable())
            .ok_or(DirectoryError::not_found("domain"))?;
        let tenant = state
            .tenants
            .get(&domain.tenant_id)
            .ok_or(DirectoryError::not_found("tenant"))?;

        Ok((tenant.clone(), domain.clone()))
    }

    async fn list_domains_for_tenant(&self, tenant_id: Uuid) -> DirectoryResult<Vec<CustomDomain>> {
        self.gate().await?;
        let state = self.state.read().await;
        let mut domains: Vec<CustomDomain> = state
            .domains
            .values()
            .filter(|d| d.tenant_id == tenant_id)
            .cloned()
            .collect();
        domains.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(domains)
    }

    async fn list_pending_domains(&self, limit: usize) -> DirectoryResult<Vec<CustomDomain>> {
        self.gate().await?;
        let state = self.state.read().await;
        let mut pending: Vec<CustomDomain> = state
            .domains
            .values()
            .filter(|d| d.status == DomainStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn mark_verified(
        &self,
        domain_id: Uuid,
        verified_at: OffsetDateTime,
    ) -> DirectoryResult<Transition> {
        self.gate().await?;
        let mut state = self.state.write().await;
        let domain = state
            .domains
            .get_mut(&domain_id)
            .ok_or(DirectoryError::not_found("domain"))?;

        match domain.status {
            DomainStatus::Pending => {
                domain.status = DomainStatus::Verified;
                domain.verified_at = Some(verified_at);
                Ok(Transition::Applied(domain.clone()))
            }
            DomainStatus::Verified => Ok(Transition::Unchanged(domain.clone())),
            DomainStatus::Failed => Err(DirectoryError::InvalidTransition {
                from: DomainStatus::Failed,
                to: DomainStatus::Verified,
            }),
        }
    }

    async fn mark_failed(&self, domain_id: Uuid) -> DirectoryResult<Transition> {
        self.gate().await?;
        let mut state = self.state.write().await;
        let domain = state
            .domains
            .get_mut(&domain_id)
            .ok_or(DirectoryError::not_found("domain"))?;

        if domain.status == DomainStatus::Pending {
            domain.status = DomainStatus::Failed;
            Ok(Transition::Applied(domain.clone()))
        } else {
            Ok(Transition::Unchanged(domain.clone()))
        }
    }

    async fn record_check(
        &self,
        domain_id: Uuid,
        checked_at: OffsetDateTime,
    ) -> DirectoryResult<CustomDomain> {
        self.gate().await?;
        let mut state = self.state.write().await;
        let domain = state
            .domains
            .get_mut(&domain_id)
            .ok_or(DirectoryError::not_found("domain"))?;

        if domain.status == DomainStatus::Pending {
            domain.verification_attempts += 1;
            domain.last_checked_at = Some(checked_at);
        }
        Ok(domain.clone())
    }

    async fn delete_custom_domain(&self, id: Uuid) -> DirectoryResult<CustomDomain> {
        self.gate().await?;
        let mut state = self.state.write().await;
        let domain = state
            .domains
            .remove(&id)
            .ok_or(DirectoryError::not_found("domain"))?;
        state.hostnames.remove(&domain.domain);
        Ok(domain)
    }

    async fn ping(&self) -> DirectoryResult<()> {
        self.gate().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const ZONE: &str = "cname.example.com";

    async fn tenant(dir: &MemoryDirectory, slug: &str) -> Tenant {
        dir.create_tenant(NewTenant {
            owner_id: Uuid::new_v4(),
            name: slug.to_uppercase(),
            slug: slug.to_string(),
            description: None,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_slug_uniqueness() {
        let dir = MemoryDirectory::new();
        tenant(&dir, "alif").await;

        let err = dir
            .create_tenant(NewTenant {
                owner_id: Uuid::new_v4(),
                name: "Other".to_string(),
                slug: "alif".to_string(),
                description: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::Conflict { field: "slug", .. }));
    }

    #[tokio::test]
    async fn test_find_tenant_by_slug_is_case_insensitive() {
        let dir = MemoryDirectory::new();
        let alif = tenant(&dir, "alif").await;

        assert_eq!(dir.find_tenant_by_slug("ALIF").await.unwrap().id, alif.id);
        assert!(matches!(
            dir.find_tenant_by_slug("bob").await,
            Err(DirectoryError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_before_storage() {
        let dir = MemoryDirectory::new();
        dir.set_unavailable(true);

        // Validation runs first, so a bad domain is InvalidInput even when storage is down
        let err = dir
            .register_custom_domain(Uuid::new_v4(), "not a domain", ZONE)
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::InvalidInput { field: "domain", .. }));
    }

    #[tokio::test]
    async fn test_register_unknown_tenant() {
        let dir = MemoryDirectory::new();
        let err = dir
            .register_custom_domain(Uuid::new_v4(), "alif.com", ZONE)
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::NotFound { entity: "tenant" }));
    }

    #[tokio::test]
    async fn test_register_sequential_conflict_is_case_insensitive() {
        let dir = MemoryDirectory::new();
        let alif = tenant(&dir, "alif").await;
        let bob = tenant(&dir, "bob-shop").await;

        let first = dir.register_custom_domain(alif.id, "Alif.com", ZONE).await.unwrap();
        assert_eq!(first.domain, "alif.com");
        assert_eq!(first.status, DomainStatus::Pending);

        let err = dir
            .register_custom_domain(bob.id, "ALIF.COM.", ZONE)
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::Conflict { field: "domain", .. }));
        assert_eq!(dir.list_domains_for_tenant(bob.id).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_registration_single_winner() {
        let dir = Arc::new(MemoryDirectory::new());
        let alif = tenant(&dir, "alif").await;
        let bob = tenant(&dir, "bob-shop").await;

        let mut handles = Vec::new();
        for i in 0..16 {
            let dir = dir.clone();
            let tenant_id = if i % 2 == 0 { alif.id } else { bob.id };
            handles.push(tokio::spawn(async move {
                dir.register_custom_domain(tenant_id, "shop.io", ZONE).await
            }));
        }

        let mut successes = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => successes += 1,
                Err(DirectoryError::Conflict { .. }) => conflicts += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(conflicts, 15);
        let total = dir.list_domains_for_tenant(alif.id).await.unwrap().len()
            + dir.list_domains_for_tenant(bob.id).await.unwrap().len();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_only_verified_domains_are_found() {
        let dir = MemoryDirectory::new();
        let alif = tenant(&dir, "alif").await;
        let pending = dir.register_custom_domain(alif.id, "alif.com", ZONE).await.unwrap();
        let failed = dir.register_custom_domain(alif.id, "alif.net", ZONE).await.unwrap();
        dir.mark_failed(failed.id).await.unwrap();

        assert!(dir.find_verified_domain("alif.com").await.is_err());
        assert!(dir.find_verified_domain("alif.net").await.is_err());

        dir.mark_verified(pending.id, OffsetDateTime::now_utc()).await.unwrap();
        let (found_tenant, found) = dir.find_verified_domain("ALIF.com:443").await.unwrap();
        assert_eq!(found_tenant.id, alif.id);
        assert_eq!(found.id, pending.id);
    }

    #[tokio::test]
    async fn test_mark_verified_is_idempotent() {
        let dir = MemoryDirectory::new();
        let alif = tenant(&dir, "alif").await;
        let domain = dir.register_custom_domain(alif.id, "alif.com", ZONE).await.unwrap();
        let at = OffsetDateTime::now_utc();

        let first = dir.mark_verified(domain.id, at).await.unwrap();
        assert!(first.was_applied());

        let second = dir.mark_verified(domain.id, at).await.unwrap();
        assert!(!second.was_applied());
        assert_eq!(first.domain(), second.domain());
        assert_eq!(second.domain().verified_at, Some(at));
    }

    #[tokio::test]
    async fn test_verified_never_regresses() {
        let dir = MemoryDirectory::new();
        let alif = tenant(&dir, "alif").await;
        let domain = dir.register_custom_domain(alif.id, "alif.com", ZONE).await.unwrap();
        dir.mark_verified(domain.id, OffsetDateTime::now_utc()).await.unwrap();

        let transition = dir.mark_failed(domain.id).await.unwrap();
        assert!(!transition.was_applied());
        assert_eq!(transition.domain().status, DomainStatus::Verified);
    }

    #[tokio::test]
    async fn test_failed_cannot_become_verified() {
        let dir = MemoryDirectory::new();
        let alif = tenant(&dir, "alif").await;
        let domain = dir.register_custom_domain(alif.id, "alif.com", ZONE).await.unwrap();
        dir.mark_failed(domain.id).await.unwrap();

        let err = dir
            .mark_verified(domain.id, OffsetDateTime::now_utc())
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_record_check_counts_only_pending() {
        let dir = MemoryDirectory::new();
        let alif = tenant(&dir, "alif").await;
        let domain = dir.register_custom_domain(alif.id, "alif.com", ZONE).await.unwrap();

        let checked = dir.record_check(domain.id, OffsetDateTime::now_utc()).await.unwrap();
        assert_eq!(checked.verification_attempts, 1);
        assert!(checked.last_checked_at.is_some());

        dir.mark_verified(domain.id, OffsetDateTime::now_utc()).await.unwrap();
        let after = dir.record_check(domain.id, OffsetDateTime::now_utc()).await.unwrap();
        assert_eq!(after.verification_attempts, 1);
    }

    #[tokio::test]
    async fn test_delete_tenant_cascades_domains() {
        let dir = MemoryDirectory::new();
        let alif = tenant(&dir, "alif").await;
        let domain = dir.register_custom_domain(alif.id, "alif.com", ZONE).await.unwrap();
        dir.mark_verified(domain.id, OffsetDateTime::now_utc()).await.unwrap();

        let removed = dir.delete_tenant(alif.id).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert!(dir.find_verified_domain("alif.com").await.is_err());
        assert!(dir.find_tenant_by_slug("alif").await.is_err());

        // Domain and slug are free again
        let again = tenant(&dir, "alif").await;
        assert!(dir.register_custom_domain(again.id, "alif.com", ZONE).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_pending_oldest_first() {
        let dir = MemoryDirectory::new();
        let alif = tenant(&dir, "alif").await;
        let a = dir.register_custom_domain(alif.id, "a.alif.com", ZONE).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        let b = dir.register_custom_domain(alif.id, "b.alif.com", ZONE).await.unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
        let c = dir.register_custom_domain(alif.id, "c.alif.com", ZONE).await.unwrap();
        dir.mark_verified(b.id, OffsetDateTime::now_utc()).await.unwrap();

        let pending = dir.list_pending_domains(10).await.unwrap();
        let ids: Vec<Uuid> = pending.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![a.id, c.id]);
        assert_eq!(dir.list_pending_domains(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let dir = MemoryDirectory::new();
        dir.set_unavailable(true);
        let err = dir.find_tenant_by_slug("alif").await.unwrap_err();
        assert!(err.is_unavailable());
        assert!(dir.ping().await.is_err());
    }
}
