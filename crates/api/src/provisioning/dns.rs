//! DNS-based verification
//!
//! Nothing is attached remotely; a domain counts as verified once its DNS
//! routes to the issued CNAME target.

use async_trait::async_trait;
use hostgate_shared::CustomDomain;
use std::collections::HashSet;
use std::net::IpAddr;
use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::error::ResolveErrorKind;
use trust_dns_resolver::proto::rr::{RData, RecordType};
use trust_dns_resolver::TokioAsyncResolver;

use super::{DomainProvisioner, ProvisioningError, ProvisioningStatus};

pub struct DnsProvisioner {
    resolver: TokioAsyncResolver,
}

impl Default for DnsProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

impl DnsProvisioner {
    pub fn new() -> Self {
        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::cloudflare(), ResolverOpts::default()),
        }
    }

    /// Records of one type; an empty answer is not an error
    async fn records(&self, name: &str, record_type: RecordType) -> Result<Vec<RData>, ProvisioningError> {
        match self.resolver.lookup(name, record_type).await {
            Ok(lookup) => Ok(lookup.iter().cloned().collect()),
            Err(e) if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) => Ok(Vec::new()),
            Err(e) if matches!(e.kind(), ResolveErrorKind::Timeout) => Err(ProvisioningError::Timeout),
            Err(e) => Err(ProvisioningError::Transient(e.to_string())),
        }
    }

    async fn a_records(&self, name: &str) -> Result<HashSet<IpAddr>, ProvisioningError> {
        Ok(self
            .records(name, RecordType::A)
            .await?
            .iter()
            .filter_map(|record| record.as_a().map(|a| IpAddr::V4(a.0)))
            .collect())
    }
}

/// CNAME pointing at the target, or (for ALIAS/ANAME apex records) A records
/// overlapping the target's
fn routes_to_target(
    cnames: &[String],
    expected: &str,
    domain_ips: &HashSet<IpAddr>,
    target_ips: &HashSet<IpAddr>,
) -> bool {
    let cname_valid = cnames
        .iter()
        .any(|c| c.trim_end_matches('.').eq_ignore_ascii_case(expected));

    cname_valid || (!domain_ips.is_empty() && !domain_ips.is_disjoint(target_ips))
}

#[async_trait]
impl DomainProvisioner for DnsProvisioner {
    fn name(&self) -> &'static str {
        "dns"
    }

    async fn add_domain(&self, _domain: &CustomDomain) -> Result<(), ProvisioningError> {
        Ok(())
    }

    async fn check_verification(
        &self,
        domain: &CustomDomain,
    ) -> Result<ProvisioningStatus, ProvisioningError> {
        let cnames: Vec<String> = self
            .records(&domain.domain, RecordType::CNAME)
            .await?
            .iter()
            .filter_map(|record| record.as_cname().map(|c| c.0.to_string()))
            .collect();

        let (domain_ips, target_ips) = if cnames.is_empty() {
            (
                self.a_records(&domain.domain).await?,
                self.a_records(&domain.cname).await?,
            )
        } else {
            (HashSet::new(), HashSet::new())
        };

        let verified = routes_to_target(&cnames, &domain.cname, &domain_ips, &target_ips);
        tracing::debug!(
            domain = %domain.domain,
            target = %domain.cname,
            cnames = ?cnames,
            verified,
            "DNS verification lookup"
        );

        Ok(if verified {
            ProvisioningStatus::Verified
        } else {
            ProvisioningStatus::Pending
        })
    }

    async fn remove_domain(&self, _domain: &str) -> Result<(), ProvisioningError> {
        Ok(())
    }
}
