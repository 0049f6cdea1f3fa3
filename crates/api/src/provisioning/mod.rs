//! Custom domain provisioning
//!
//! A provisioner attaches custom domains to the serving edge and reports
//! whether their DNS is in place. Two implementations:
//! - [`VercelClient`]: Vercel project domains API
//! - [`DnsProvisioner`]: direct DNS lookups against the issued CNAME target

mod dns;
mod vercel;

pub use dns::DnsProvisioner;
pub use vercel::{VercelClient, VercelSettings};

use async_trait::async_trait;
use hostgate_shared::CustomDomain;
use std::sync::Arc;

use crate::config::{Config, ProvisionerKind};

/// What the provider currently reports for a domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningStatus {
    Verified,
    Pending,
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error("Provider temporarily unavailable: {0}")]
    Transient(String),

    #[error("Provider rate limit exceeded")]
    RateLimited,

    /// Definitive negative answer about this domain
    #[error("Provider rejected the domain: {0}")]
    Rejected(String),

    #[error("Provider did not respond in time")]
    Timeout,

    #[error("Provisioner misconfigured: {0}")]
    Misconfigured(String),
}

impl ProvisioningError {
    /// Worth retrying the same request
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProvisioningError::Transient(_)
                | ProvisioningError::RateLimited
                | ProvisioningError::Timeout
        )
    }
}

#[async_trait]
pub trait DomainProvisioner: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Attach the domain to the serving edge. Re-adding is not an error.
    async fn add_domain(&self, domain: &CustomDomain) -> Result<(), ProvisioningError>;

    async fn check_verification(
        &self,
        domain: &CustomDomain,
    ) -> Result<ProvisioningStatus, ProvisioningError>;

    /// Detach the domain. Removing an unknown domain is not an error.
    async fn remove_domain(&self, domain: &str) -> Result<(), ProvisioningError>;
}

/// Build the configured provisioner
pub fn from_config(config: &Config) -> Result<Arc<dyn DomainProvisioner>, ProvisioningError> {
    match config.provisioner {
        ProvisionerKind::Vercel => {
            let token = config
                .vercel_api_token
                .clone()
                .ok_or_else(|| ProvisioningError::Misconfigured("VERCEL_API_TOKEN".to_string()))?;
            let project_id = config
                .vercel_project_id
                .clone()
                .ok_or_else(|| ProvisioningError::Misconfigured("VERCEL_PROJECT_ID".to_string()))?;

            let client = VercelClient::new(VercelSettings {
                api_url: config.vercel_api_url.clone(),
                token,
                project_id,
                team_id: config.vercel_team_id.clone(),
                request_timeout: config.provisioning_timeout(),
            })?;
            Ok(Arc::new(client))
        }
        ProvisionerKind::Dns => Ok(Arc::new(DnsProvisioner::new())),
    }
}
