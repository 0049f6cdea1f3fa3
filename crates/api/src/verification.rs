//! Custom domain verification
//!
//! A custom domain starts `pending` and moves exactly once, to `verified`
//! or `failed`. Checks run on demand from the API and periodically from the
//! worker; both go through [`DomainVerifier::check`], and the directory's
//! compare-and-set transitions make racing checks converge.

use hostgate_shared::{
    is_platform_host, normalize_domain, CustomDomain, DirectoryError, DirectoryResult,
    DomainDirectory, Tenant,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::Config;
use crate::provisioning::{DomainProvisioner, ProvisioningError, ProvisioningStatus};
use crate::routing::HostResolver;

#[derive(Debug, Clone)]
pub struct VerificationSettings {
    pub main_domain: String,
    pub cname_zone: String,
    /// Bound on every provisioner call
    pub provider_timeout: Duration,
    /// Completed `pending` checks before a domain is marked failed
    pub max_attempts: i32,
}

impl VerificationSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            main_domain: config.main_domain.clone(),
            cname_zone: config.cname_zone.clone(),
            provider_timeout: config.provisioning_timeout(),
            max_attempts: config.verification_max_attempts,
        }
    }
}

/// Whether the provisioner accepted a new domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningState {
    Accepted,
    /// Provider unreachable or refused; the next check retries
    Deferred,
}

/// DNS record the registrant has to create
#[derive(Debug, Clone, Serialize)]
pub struct DnsInstructions {
    pub record_type: &'static str,
    pub name: String,
    pub value: String,
    pub ttl: u32,
}

impl DnsInstructions {
    fn for_domain(domain: &CustomDomain) -> Self {
        Self {
            record_type: "CNAME",
            name: domain.domain.clone(),
            value: domain.cname.clone(),
            ttl: 3600,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub domain: CustomDomain,
    pub provisioning: ProvisioningState,
    pub dns: DnsInstructions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckOutcome {
    /// This check moved the domain to `verified`
    Verified,
    /// DNS not in place yet
    Pending,
    /// This check moved the domain to `failed`
    Failed,
    /// Provider unreachable; state untouched
    RetryLater,
    /// Domain was already terminal; provider not consulted
    Unchanged,
}

#[derive(Debug, Clone, Serialize)]
pub struct Verification {
    pub domain: CustomDomain,
    pub outcome: CheckOutcome,
}

/// Tally of one sweep over pending domains
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub checked: usize,
    pub verified: usize,
    pub failed: usize,
    pub pending: usize,
    pub retry_later: usize,
    pub errors: usize,
}

impl SweepReport {
    fn record(&mut self, outcome: CheckOutcome) {
        self.checked += 1;
        match outcome {
            CheckOutcome::Verified => self.verified += 1,
            CheckOutcome::Failed => self.failed += 1,
            CheckOutcome::Pending => self.pending += 1,
            CheckOutcome::RetryLater => self.retry_later += 1,
            CheckOutcome::Unchanged => {}
        }
    }
}

#[derive(Clone)]
pub struct DomainVerifier {
    directory: Arc<dyn DomainDirectory>,
    provisioner: Arc<dyn DomainProvisioner>,
    resolver: HostResolver,
    settings: Arc<VerificationSettings>,
}

impl DomainVerifier {
    pub fn new(
        directory: Arc<dyn DomainDirectory>,
        provisioner: Arc<dyn DomainProvisioner>,
        resolver: HostResolver,
        settings: VerificationSettings,
    ) -> Self {
        Self {
            directory,
            provisioner,
            resolver,
            settings: Arc::new(settings),
        }
    }

    /// Tenant owned by `owner_id`; someone else's tenant is reported as missing
    pub async fn owned_tenant(&self, owner_id: Uuid, tenant_id: Uuid) -> DirectoryResult<Tenant> {
        let tenant = self.directory.find_tenant_by_id(tenant_id).await?;
        if tenant.owner_id != owner_id {
            return Err(DirectoryError::not_found("tenant"));
        }
        Ok(tenant)
    }

    /// Domain whose tenant is owned by `owner_id`
    pub async fn find_for_owner(
        &self,
        owner_id: Uuid,
        domain_id: Uuid,
    ) -> DirectoryResult<CustomDomain> {
        let domain = self.directory.find_domain_by_id(domain_id).await?;
        let tenant = self.directory.find_tenant_by_id(domain.tenant_id).await?;
        if tenant.owner_id != owner_id {
            return Err(DirectoryError::not_found("domain"));
        }
        Ok(domain)
    }

    /// Register a custom domain for a tenant and hand it to the provisioner
    pub async fn register(
        &self,
        owner_id: Uuid,
        tenant_id: Uuid,
        domain: &str,
    ) -> DirectoryResult<Registration> {
        let tenant = self.owned_tenant(owner_id, tenant_id).await?;

        let normalized = normalize_domain(domain)?;
        if is_platform_host(&normalized, &self.settings.main_domain)
            || is_platform_host(&normalized, &self.settings.cname_zone)
        {
            return Err(DirectoryError::invalid(
                "domain",
                format!(
                    "Domains under {} are managed by the platform",
                    self.settings.main_domain
                ),
            ));
        }

        let record = self
            .directory
            .register_custom_domain(tenant.id, &normalized, &self.settings.cname_zone)
            .await?;

        tracing::info!(
            domain = %record.domain,
            tenant_id = %tenant.id,
            cname = %record.cname,
            "Custom domain registered"
        );

        let provisioning = match tokio::time::timeout(
            self.settings.provider_timeout,
            self.provisioner.add_domain(&record),
        )
        .await
        {
            Ok(Ok(())) => ProvisioningState::Accepted,
            Ok(Err(e)) => {
                tracing::warn!(domain = %record.domain, provisioner = self.provisioner.name(), error = %e, "Provisioning deferred");
                ProvisioningState::Deferred
            }
            Err(_) => {
                tracing::warn!(domain = %record.domain, provisioner = self.provisioner.name(), "Provisioning timed out, deferred");
                ProvisioningState::Deferred
            }
        };

        Ok(Registration {
            dns: DnsInstructions::for_domain(&record),
            domain: record,
            provisioning,
        })
    }

    /// Run one verification step for a domain
    pub async fn check(&self, domain_id: Uuid) -> DirectoryResult<Verification> {
        let record = self.directory.find_domain_by_id(domain_id).await?;
        if record.status.is_terminal() {
            return Ok(Verification {
                domain: record,
                outcome: CheckOutcome::Unchanged,
            });
        }

        let answer = tokio::time::timeout(
            self.settings.provider_timeout,
            self.provisioner.check_verification(&record),
        )
        .await
        .unwrap_or(Err(ProvisioningError::Timeout));

        match answer {
            Ok(ProvisioningStatus::Verified) => self.apply_verified(record).await,
            Ok(ProvisioningStatus::Pending) => self.apply_pending(record).await,
            Err(ProvisioningError::Rejected(reason)) => {
                tracing::warn!(domain = %record.domain, reason = %reason, "Provider rejected domain");
                self.apply_failed(record).await
            }
            Err(e) => {
                if matches!(e, ProvisioningError::Misconfigured(_)) {
                    tracing::error!(domain = %record.domain, error = %e, "Provisioner misconfigured");
                } else {
                    tracing::info!(domain = %record.domain, error = %e, "Verification deferred");
                }
                Ok(Verification {
                    domain: record,
                    outcome: CheckOutcome::RetryLater,
                })
            }
        }
    }

    /// `check` restricted to the domain's owner
    pub async fn check_for_owner(
        &self,
        owner_id: Uuid,
        domain_id: Uuid,
    ) -> DirectoryResult<Verification> {
        self.find_for_owner(owner_id, domain_id).await?;
        self.check(domain_id).await
    }

    async fn apply_verified(&self, record: CustomDomain) -> DirectoryResult<Verification> {
        match self
            .directory
            .mark_verified(record.id, OffsetDateTime::now_utc())
            .await
        {
            Ok(transition) => {
                let applied = transition.was_applied();
                let domain = transition.into_domain();
                self.resolver.invalidate_host(&domain.domain);
                if applied {
                    tracing::info!(domain = %domain.domain, tenant_id = %domain.tenant_id, "Custom domain verified");
                }
                Ok(Verification {
                    domain,
                    outcome: if applied {
                        CheckOutcome::Verified
                    } else {
                        CheckOutcome::Unchanged
                    },
                })
            }
            // Lost a race against a check that failed the domain
            Err(DirectoryError::InvalidTransition { .. }) => Ok(Verification {
                domain: self.directory.find_domain_by_id(record.id).await?,
                outcome: CheckOutcome::Unchanged,
            }),
            Err(e) => Err(e),
        }
    }

    async fn apply_pending(&self, record: CustomDomain) -> DirectoryResult<Verification> {
        let updated = self
            .directory
            .record_check(record.id, OffsetDateTime::now_utc())
            .await?;

        if updated.status.is_terminal() {
            return Ok(Verification {
                domain: updated,
                outcome: CheckOutcome::Unchanged,
            });
        }

        if updated.verification_attempts >= self.settings.max_attempts {
            tracing::warn!(
                domain = %updated.domain,
                attempts = updated.verification_attempts,
                "Verification attempts exhausted"
            );
            return self.apply_failed(updated).await;
        }

        Ok(Verification {
            domain: updated,
            outcome: CheckOutcome::Pending,
        })
    }

    async fn apply_failed(&self, record: CustomDomain) -> DirectoryResult<Verification> {
        let transition = self.directory.mark_failed(record.id).await?;
        let applied = transition.was_applied();
        let domain = transition.into_domain();
        self.resolver.invalidate_host(&domain.domain);
        if applied {
            tracing::info!(domain = %domain.domain, tenant_id = %domain.tenant_id, "Custom domain failed verification");
        }

        Ok(Verification {
            outcome: if applied {
                CheckOutcome::Failed
            } else {
                CheckOutcome::Unchanged
            },
            domain,
        })
    }

    /// Delete a domain and detach it from the provisioner (best effort)
    pub async fn remove(&self, owner_id: Uuid, domain_id: Uuid) -> DirectoryResult<CustomDomain> {
        self.find_for_owner(owner_id, domain_id).await?;

        let removed = self.directory.delete_custom_domain(domain_id).await?;
        self.resolver.invalidate_host(&removed.domain);
        tracing::info!(domain = %removed.domain, tenant_id = %removed.tenant_id, "Custom domain removed");

        self.detach(&removed.domain).await;
        Ok(removed)
    }

    /// Delete a tenant with all its domains
    pub async fn remove_tenant(
        &self,
        owner_id: Uuid,
        tenant_id: Uuid,
    ) -> DirectoryResult<Vec<CustomDomain>> {
        let tenant = self.owned_tenant(owner_id, tenant_id).await?;

        let removed = self.directory.delete_tenant(tenant.id).await?;
        self.resolver.invalidate_tenant(tenant.id);
        self.resolver
            .invalidate_host(&tenant.subdomain_host(&self.settings.main_domain));
        for domain in &removed {
            self.resolver.invalidate_host(&domain.domain);
        }
        tracing::info!(tenant_id = %tenant.id, slug = %tenant.slug, domains = removed.len(), "Tenant deleted");

        for domain in &removed {
            self.detach(&domain.domain).await;
        }
        Ok(removed)
    }

    async fn detach(&self, domain: &str) {
        match tokio::time::timeout(
            self.settings.provider_timeout,
            self.provisioner.remove_domain(domain),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(domain = %domain, error = %e, "Failed to detach domain from provisioner")
            }
            Err(_) => tracing::warn!(domain = %domain, "Detaching domain from provisioner timed out"),
        }
    }

    /// Check up to `limit` pending domains, oldest first
    pub async fn sweep(&self, limit: usize) -> DirectoryResult<SweepReport> {
        let pending = self.directory.list_pending_domains(limit).await?;
        let mut report = SweepReport::default();

        for domain in pending {
            match self.check(domain.id).await {
                Ok(verification) => report.record(verification.outcome),
                // Deleted since it was listed
                Err(DirectoryError::NotFound { .. }) => {}
                Err(e) if e.is_unavailable() => return Err(e),
                Err(e) => {
                    tracing::warn!(domain = %domain.domain, error = %e, "Verification check failed");
                    report.errors += 1;
                }
            }
        }

        Ok(report)
    }

    pub fn settings(&self) -> &VerificationSettings {
        &self.settings
    }
}
