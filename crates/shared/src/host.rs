//! Host, slug and domain normalization
//!
//! Every hostname is normalized before it is compared or stored, so lookups
//! are case-insensitive and ignore ports and the DNS root dot.

use crate::error::{DirectoryError, DirectoryResult};
use crate::types::Tenant;

/// Labels owned by the platform itself; never usable as tenant slugs
pub const RESERVED_LABELS: &[&str] = &[
    "www",
    "api",
    "admin",
    "app",
    "mail",
    "dashboard",
    "console",
    "portal",
    "docs",
    "help",
    "support",
    "status",
    "blog",
    "cdn",
    "static",
    "assets",
    "media",
    "images",
    "auth",
    "cname",
];

pub const MIN_SLUG_LEN: usize = 3;
pub const MAX_SLUG_LEN: usize = 63;
const MAX_DOMAIN_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// Normalize a host header value: strip port and trailing dot, lowercase
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();

    // IPv6 literal, e.g. [::1]:8080
    let host = if let Some(rest) = host.strip_prefix('[') {
        rest.split(']').next().unwrap_or(rest)
    } else {
        host.split(':').next().unwrap_or(host)
    };

    host.trim_end_matches('.').to_ascii_lowercase()
}

/// Check slug format: lowercase alnum + hyphen, 3..=63 chars, no edge hyphens
pub fn is_valid_slug(slug: &str) -> bool {
    let len = slug.len();
    if !(MIN_SLUG_LEN..=MAX_SLUG_LEN).contains(&len) {
        return false;
    }
    if slug.starts_with('-') || slug.ends_with('-') {
        return false;
    }
    slug.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

pub fn is_reserved_label(label: &str) -> bool {
    RESERVED_LABELS.contains(&label)
}

/// Validate a slug for tenant creation
pub fn validate_slug(slug: &str) -> DirectoryResult<()> {
    if !is_valid_slug(slug) {
        return Err(DirectoryError::invalid(
            "slug",
            "Invalid slug format (lowercase letters, numbers, hyphens, 3-63 chars)",
        ));
    }
    if is_reserved_label(slug) {
        return Err(DirectoryError::invalid(
            "slug",
            format!("'{}' is reserved by the platform", slug),
        ));
    }
    Ok(())
}

/// Check domain format: at least two labels, alnum + hyphen, no edge hyphens
pub fn is_valid_domain(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > MAX_DOMAIN_LEN {
        return false;
    }

    let parts: Vec<&str> = domain.split('.').collect();
    if parts.len() < 2 {
        return false;
    }

    for part in &parts {
        if part.is_empty() || part.len() > MAX_LABEL_LEN {
            return false;
        }
        if part.starts_with('-') || part.ends_with('-') {
            return false;
        }
        if !part.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return false;
        }
    }

    // Reject IPv4 literals: a TLD is never all digits
    parts
        .last()
        .is_some_and(|tld| !tld.chars().all(|c| c.is_ascii_digit()))
}

/// Normalize user input into a storable custom domain
pub fn normalize_domain(input: &str) -> DirectoryResult<String> {
    let domain = input.trim().trim_end_matches('.').to_ascii_lowercase();
    if !is_valid_domain(&domain) {
        return Err(DirectoryError::invalid(
            "domain",
            "Invalid domain format. Please enter a valid domain like 'shop.example.com'",
        ));
    }
    Ok(domain)
}

/// True if `host` is the main domain or any name beneath it
pub fn is_platform_host(host: &str, main_domain: &str) -> bool {
    host == main_domain
        || host
            .strip_suffix(main_domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Deterministic CNAME target issued to a tenant's custom domains
pub fn cname_target(tenant: &Tenant, cname_zone: &str) -> String {
    let id = tenant.id.simple().to_string();
    format!("{}-{}.{}", tenant.slug, &id[..8], cname_zone)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use time::OffsetDateTime;
    use uuid::Uuid;

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("Example.COM"), "example.com");
        assert_eq!(normalize_host("example.com:8080"), "example.com");
        assert_eq!(normalize_host("EXAMPLE.COM:443"), "example.com");
        assert_eq!(normalize_host(" alif.example.com. "), "alif.example.com");
        assert_eq!(normalize_host("[::1]:3000"), "::1");
        assert_eq!(normalize_host(""), "");
    }

    #[test]
    fn test_is_valid_slug() {
        assert!(is_valid_slug("alif"));
        assert!(is_valid_slug("my-shop-42"));
        assert!(is_valid_slug("abc"));

        assert!(!is_valid_slug("ab"));
        assert!(!is_valid_slug("Alif"));
        assert!(!is_valid_slug("-alif"));
        assert!(!is_valid_slug("alif-"));
        assert!(!is_valid_slug("al_if"));
        assert!(!is_valid_slug("a.b.c"));
        assert!(!is_valid_slug(&"a".repeat(64)));
    }

    #[test]
    fn test_validate_slug_rejects_reserved() {
        let err = validate_slug("www").unwrap_err();
        assert!(matches!(err, DirectoryError::InvalidInput { field: "slug", .. }));
        assert!(validate_slug("api").is_err());
        assert!(validate_slug("alif").is_ok());
    }

    #[test]
    fn test_is_valid_domain() {
        assert!(is_valid_domain("alif.com"));
        assert!(is_valid_domain("shop.alif.co.uk"));
        assert!(is_valid_domain("xn--bcher-kva.example"));

        assert!(!is_valid_domain("localhost"));
        assert!(!is_valid_domain("alif..com"));
        assert!(!is_valid_domain("-alif.com"));
        assert!(!is_valid_domain("alif.com:8080"));
        assert!(!is_valid_domain("alif .com"));
        assert!(!is_valid_domain("10.0.0.1"));
        assert!(!is_valid_domain(""));
    }

    #[test]
    fn test_normalize_domain() {
        assert_eq!(normalize_domain("  Alif.COM. ").unwrap(), "alif.com");
        assert!(normalize_domain("https://alif.com").is_err());
    }

    #[test]
    fn test_is_platform_host() {
        assert!(is_platform_host("example.com", "example.com"));
        assert!(is_platform_host("alif.example.com", "example.com"));
        assert!(is_platform_host("a.b.example.com", "example.com"));
        assert!(!is_platform_host("notexample.com", "example.com"));
        assert!(!is_platform_host("alif.com", "example.com"));
    }

    #[test]
    fn test_cname_target_is_deterministic() {
        let tenant = Tenant {
            id: Uuid::parse_str("3f2a9c1e-0000-4000-8000-000000000000").unwrap(),
            slug: "alif".to_string(),
            name: "Alif".to_string(),
            owner_id: Uuid::new_v4(),
            description: None,
            created_at: OffsetDateTime::now_utc(),
        };
        assert_eq!(
            cname_target(&tenant, "cname.example.com"),
            "alif-3f2a9c1e.cname.example.com"
        );
        assert_eq!(
            cname_target(&tenant, "cname.example.com"),
            cname_target(&tenant, "cname.example.com")
        );
    }
}
