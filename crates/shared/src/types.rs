//! Common types used across Hostgate

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{DirectoryError, DirectoryResult};
use crate::host::validate_slug;

// =============================================================================
// Tenants
// =============================================================================

/// A customer workspace, reachable at `{slug}.{main_domain}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub owner_id: Uuid,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Tenant {
    /// Platform subdomain host for this tenant
    pub fn subdomain_host(&self, main_domain: &str) -> String {
        format!("{}.{}", self.slug, main_domain)
    }
}

/// Input for creating a tenant
#[derive(Debug, Clone, Deserialize)]
pub struct NewTenant {
    pub owner_id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
}

const MAX_TENANT_NAME_LEN: usize = 100;

impl NewTenant {
    /// Trim and validate the input before it reaches storage
    pub fn validated(self) -> DirectoryResult<Self> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(DirectoryError::invalid("name", "Name is required"));
        }
        if name.chars().count() > MAX_TENANT_NAME_LEN {
            return Err(DirectoryError::invalid(
                "name",
                format!("Name must be at most {} characters", MAX_TENANT_NAME_LEN),
            ));
        }

        let slug = self.slug.trim().to_string();
        validate_slug(&slug)?;

        let description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        Ok(Self {
            owner_id: self.owner_id,
            name,
            slug,
            description,
        })
    }
}

// =============================================================================
// Custom domains
// =============================================================================

/// Verification status of a custom domain (stored as TEXT)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DomainStatus {
    #[default]
    Pending,
    Verified,
    Failed,
}

impl DomainStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainStatus::Pending => "pending",
            DomainStatus::Verified => "verified",
            DomainStatus::Failed => "failed",
        }
    }

    /// Verified and failed are terminal
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DomainStatus::Pending)
    }
}

impl fmt::Display for DomainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown domain status: {0}")]
pub struct UnknownDomainStatus(pub String);

impl FromStr for DomainStatus {
    type Err = UnknownDomainStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DomainStatus::Pending),
            "verified" => Ok(DomainStatus::Verified),
            "failed" => Ok(DomainStatus::Failed),
            other => Err(UnknownDomainStatus(other.to_string())),
        }
    }
}

/// A user-owned host mapped to a tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomDomain {
    pub id: Uuid,
    pub domain: String,
    pub tenant_id: Uuid,
    /// CNAME target the registrant must point the domain at
    pub cname: String,
    pub status: DomainStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub verified_at: Option<OffsetDateTime>,
    pub verification_attempts: i32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_checked_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl CustomDomain {
    /// Only verified domains take part in routing
    pub fn is_routable(&self) -> bool {
        self.status == DomainStatus::Verified
    }
}

/// Result of a verification-state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// The record moved out of `pending`
    Applied(CustomDomain),
    /// The record was already in a state compatible with the request
    Unchanged(CustomDomain),
}

impl Transition {
    pub fn domain(&self) -> &CustomDomain {
        match self {
            Transition::Applied(d) | Transition::Unchanged(d) => d,
        }
    }

    pub fn into_domain(self) -> CustomDomain {
        match self {
            Transition::Applied(d) | Transition::Unchanged(d) => d,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }
}
