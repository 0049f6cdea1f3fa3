//! PostgreSQL directory
//!
//! Uniqueness is enforced by the `tenants_slug_key` and
//! `custom_domains_domain_key` constraints; a losing concurrent insert surfaces
//! as SQLSTATE 23505 and is reported as `Conflict`. Status transitions are
//! conditional updates on `status = 'pending'`, so the row lock taken by the
//! UPDATE serializes racing checks.

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::DomainDirectory;
use crate::error::{DirectoryError, DirectoryResult};
use crate::host::{cname_target, is_valid_slug, normalize_domain, normalize_host};
use crate::types::{CustomDomain, DomainStatus, NewTenant, Tenant, Transition};

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

/// Database row for custom domain (status is TEXT to avoid SQLx enum issues)
#[derive(Debug, sqlx::FromRow)]
struct CustomDomainRow {
    id: Uuid,
    domain: String,
    tenant_id: Uuid,
    cname: String,
    status: String,
    verified_at: Option<OffsetDateTime>,
    verification_attempts: i32,
    last_checked_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
}

impl From<CustomDomainRow> for CustomDomain {
    fn from(row: CustomDomainRow) -> Self {
        Self {
            id: row.id,
            domain: row.domain,
            tenant_id: row.tenant_id,
            cname: row.cname,
            // The CHECK constraint keeps status within the known set
            status: row.status.parse().unwrap_or_default(),
            verified_at: row.verified_at,
            verification_attempts: row.verification_attempts,
            last_checked_at: row.last_checked_at,
            created_at: row.created_at,
        }
    }
}

/// Joined row for routing lookups
#[derive(Debug, sqlx::FromRow)]
struct VerifiedDomainRow {
    tenant_id: Uuid,
    slug: String,
    name: String,
    owner_id: Uuid,
    description: Option<String>,
    tenant_created_at: OffsetDateTime,
    domain_id: Uuid,
    domain: String,
    cname: String,
    status: String,
    verified_at: Option<OffsetDateTime>,
    verification_attempts: i32,
    last_checked_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
}

impl VerifiedDomainRow {
    fn into_parts(self) -> (Tenant, CustomDomain) {
        let tenant = Tenant {
            id: self.tenant_id,
            slug: self.slug,
            name: self.name,
            owner_id: self.owner_id,
            description: self.description,
            created_at: self.tenant_created_at,
        };
        let domain = CustomDomain {
            id: self.domain_id,
            domain: self.domain,
            tenant_id: self.tenant_id,
            cname: self.cname,
            status: self.status.parse().unwrap_or_default(),
            verified_at: self.verified_at,
            verification_attempts: self.verification_attempts,
            last_checked_at: self.last_checked_at,
            created_at: self.created_at,
        };
        (tenant, domain)
    }
}

fn has_code(err: &sqlx::Error, code: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some(code),
        _ => false,
    }
}

/// Directory backed by PostgreSQL
#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DomainDirectory for PgDirectory {
    async fn create_tenant(&self, input: NewTenant) -> DirectoryResult<Tenant> {
        let input = input.validated()?;

        let result = sqlx::query_as::<_, Tenant>(
            r#"
            INSERT INTO tenants (id, slug, name, owner_id, description)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, slug, name, owner_id, description, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.slug)
        .bind(&input.name)
        .bind(input.owner_id)
        .bind(&input.description)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(tenant) => Ok(tenant),
            Err(e) if has_code(&e, UNIQUE_VIOLATION) => Err(DirectoryError::Conflict {
                field: "slug",
                value: input.slug,
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_tenant_by_id(&self, id: Uuid) -> DirectoryResult<Tenant> {
        sqlx::query_as::<_, Tenant>(
            "SELECT id, slug, name, owner_id, description, created_at FROM tenants WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DirectoryError::not_found("tenant"))
    }

    async fn find_tenant_by_slug(&self, slug: &str) -> DirectoryResult<Tenant> {
        let slug = slug.trim().to_ascii_lowercase();
        if !is_valid_slug(&slug) {
            return Err(DirectoryError::not_found("tenant"));
        }

        sqlx::query_as::<_, Tenant>(
            "SELECT id, slug, name, owner_id, description, created_at FROM tenants WHERE slug = $1",
        )
        .bind(&slug)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DirectoryError::not_found("tenant"))
    }

    async fn list_tenants_for_owner(&self, owner_id: Uuid) -> DirectoryResult<Vec<Tenant>> {
        let tenants = sqlx::query_as::<_, Tenant>(
            r#"
            SELECT id, slug, name, owner_id, description, created_at
            FROM tenants
            WHERE owner_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(tenants)
    }

    async fn delete_tenant(&self, id: Uuid) -> DirectoryResult<Vec<CustomDomain>> {
        let mut tx = self.pool.begin().await?;

        // Explicit delete (rather than relying on ON DELETE CASCADE alone) so the
        // removed hostnames can be returned for cache invalidation
        let removed = sqlx::query_as::<_, CustomDomainRow>(
            r#"
            DELETE FROM custom_domains
            WHERE tenant_id = $1
            RETURNING id, domain, tenant_id, cname, status, verified_at,
                      verification_attempts, last_checked_at, created_at
            "#,
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;

        let result = sqlx::query("DELETE FROM tenants WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(DirectoryError::not_found("tenant"));
        }

        tx.commit().await?;
        Ok(removed.into_iter().map(Into::into).collect())
    }

    async fn register_custom_domain(
        &self,
        tenant_id: Uuid,
        domain: &str,
        cname_zone: &str,
    ) -> DirectoryResult<CustomDomain> {
        let domain = normalize_domain(domain)?;

        // Slug is immutable, so the CNAME target computed here stays valid
        let tenant = self.find_tenant_by_id(tenant_id).await?;
        let cname = cname_target(&tenant, cname_zone);

        let result = sqlx::query_as::<_, CustomDomainRow>(
            r#"
            INSERT INTO custom_domains (id, domain, tenant_id, cname)
            VALUES ($1, $2, $3, $4)
            RETURNING id, domain, tenant_id, cname, status, verified_at,
                      verification_attempts, last_checked_at, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&domain)
        .bind(tenant_id)
        .bind(&cname)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => Ok(row.into()),
            Err(e) if has_code(&e, UNIQUE_VIOLATION) => Err(DirectoryError::Conflict {
                field: "domain",
                value: domain,
            }),
            // Tenant deleted between lookup and insert
            Err(e) if has_code(&e, FOREIGN_KEY_VIOLATION) => {
                Err(DirectoryError::not_found("tenant"))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_domain_by_id(&self, id: Uuid) -> DirectoryResult<CustomDomain> {
        sqlx::query_as::<_, CustomDomainRow>(
            r#"
            SELECT id, domain, tenant_id, cname, status, verified_at,
                   verification_attempts, last_checked_at, created_at
            FROM custom_domains
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Into::into)
        .ok_or(DirectoryError::not_found("domain"))
    }

    async fn find_verified_domain(&self, hostname: &str) -> DirectoryResult<(Tenant, CustomDomain)> {
        let hostname = normalize_host(hostname);

        sqlx::query_as::<_, VerifiedDomainRow>(
            r#"
            SELECT
                t.id AS tenant_id,
                t.slug,
                t.name,
                t.owner_id,
                t.description,
                t.created_at AS tenant_created_at,
                cd.id AS domain_id,
                cd.domain,
                cd.cname,
                cd.status,
                cd.verified_at,
                cd.verification_attempts,
                cd.last_checked_at,
                cd.created_at
            FROM custom_domains cd
            JOIN tenants t ON cd.tenant_id = t.id
            WHERE cd.domain = $1
              AND cd.status = 'verified'
            "#,
        )
        .bind(&hostname)
        .fetch_optional(&self.pool)
        .await?
        .map(VerifiedDomainRow::into_parts)
        .ok_or(DirectoryError::not_found("domain"))
    }

    async fn list_domains_for_tenant(&self, tenant_id: Uuid) -> DirectoryResult<Vec<CustomDomain>> {
        let rows = sqlx::query_as::<_, CustomDomainRow>(
            r#"
            SELECT id, domain, tenant_id, cname, status, verified_at,
                   verification_attempts, last_checked_at, created_at
            FROM custom_domains
            WHERE tenant_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_pending_domains(&self, limit: usize) -> DirectoryResult<Vec<CustomDomain>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = sqlx::query_as::<_, CustomDomainRow>(
            r#"
            SELECT id, domain, tenant_id, cname, status, verified_at,
                   verification_attempts, last_checked_at, created_at
            FROM custom_domains
            WHERE status = 'pending'
            ORDER BY created_at ASC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_verified(
        &self,
        domain_id: Uuid,
        verified_at: OffsetDateTime,
    ) -> DirectoryResult<Transition> {
        let updated = sqlx::query_as::<_, CustomDomainRow>(
            r#"
            UPDATE custom_domains
            SET status = 'verified', verified_at = $2
            WHERE id = $1 AND status = 'pending'
            RETURNING id, domain, tenant_id, cname, status, verified_at,
                      verification_attempts, last_checked_at, created_at
            "#,
        )
        .bind(domain_id)
        .bind(verified_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = updated {
            return Ok(Transition::Applied(row.into()));
        }

        let current = self.find_domain_by_id(domain_id).await?;
        match current.status {
            DomainStatus::Failed => Err(DirectoryError::InvalidTransition {
                from: DomainStatus::Failed,
                to: DomainStatus::Verified,
            }),
            _ => Ok(Transition::Unchanged(current)),
        }
    }

    async fn mark_failed(&self, domain_id: Uuid) -> DirectoryResult<Transition> {
        let updated = sqlx::query_as::<_, CustomDomainRow>(
            r#"
            UPDATE custom_domains
            SET status = 'failed'
            WHERE id = $1 AND status = 'pending'
            RETURNING id, domain, tenant_id, cname, status, verified_at,
                      verification_attempts, last_checked_at, created_at
            "#,
        )
        .bind(domain_id)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(row) => Ok(Transition::Applied(row.into())),
            None => Ok(Transition::Unchanged(self.find_domain_by_id(domain_id).await?)),
        }
    }

    async fn record_check(
        &self,
        domain_id: Uuid,
        checked_at: OffsetDateTime,
    ) -> DirectoryResult<CustomDomain> {
        let updated = sqlx::query_as::<_, CustomDomainRow>(
            r#"
            UPDATE custom_domains
            SET verification_attempts = verification_attempts + 1,
                last_checked_at = $2
            WHERE id = $1 AND status = 'pending'
            RETURNING id, domain, tenant_id, cname, status, verified_at,
                      verification_attempts, last_checked_at, created_at
            "#,
        )
        .bind(domain_id)
        .bind(checked_at)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(row) => Ok(row.into()),
            None => self.find_domain_by_id(domain_id).await,
        }
    }

    async fn delete_custom_domain(&self, id: Uuid) -> DirectoryResult<CustomDomain> {
        sqlx::query_as::<_, CustomDomainRow>(
            r#"
            DELETE FROM custom_domains
            WHERE id = $1
            RETURNING id, domain, tenant_id, cname, status, verified_at,
                      verification_attempts, last_checked_at, created_at
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Into::into)
        .ok_or(DirectoryError::not_found("domain"))
    }

    async fn ping(&self) -> DirectoryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
