//! In-memory routing cache with TTL
//!
//! Caches host-to-tenant decisions so the routing hot path rarely touches
//! the Domain Directory. Misses are cached too, with a shorter TTL, so a
//! freshly verified domain from another process becomes routable quickly.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Default TTL for hosts that resolved to a tenant (5 minutes)
const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default TTL for hosts that resolved to nothing (30 seconds)
const DEFAULT_NEGATIVE_TTL: Duration = Duration::from_secs(30);

#[derive(Clone)]
struct CacheEntry {
    tenant_id: Option<Uuid>,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(tenant_id: Option<Uuid>, ttl: Duration) -> Self {
        Self {
            tenant_id,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() > self.expires_at
    }
}

/// Thread-safe in-memory domain cache
pub struct DomainCache {
    /// Maps normalized host -> tenant_id (None means the host matched no tenant)
    cache: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    negative_ttl: Duration,
}

impl Default for DomainCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DomainCache {
    pub fn new() -> Self {
        Self::with_ttls(DEFAULT_TTL, DEFAULT_NEGATIVE_TTL)
    }

    pub fn with_ttls(ttl: Duration, negative_ttl: Duration) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            ttl,
            negative_ttl,
        }
    }

    /// Get the cached decision for a host
    /// Returns Some(Some(tenant_id)) if found and valid
    /// Returns Some(None) if host was cached as not resolving
    /// Returns None if not in cache or expired
    pub fn get(&self, host: &str) -> Option<Option<Uuid>> {
        let cache = self.cache.read().ok()?;
        let entry = cache.get(host)?;

        if entry.is_expired() {
            None
        } else {
            Some(entry.tenant_id)
        }
    }

    /// Cache a host -> tenant_id decision
    pub fn set(&self, host: &str, tenant_id: Option<Uuid>) {
        let ttl = if tenant_id.is_some() {
            self.ttl
        } else {
            self.negative_ttl
        };

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(host.to_string(), CacheEntry::new(tenant_id, ttl));
        }
    }

    /// Invalidate a specific host
    pub fn invalidate(&self, host: &str) {
        if let Ok(mut cache) = self.cache.write() {
            cache.remove(host);
        }
    }

    /// Invalidate all entries pointing at a tenant
    pub fn invalidate_tenant(&self, tenant_id: Uuid) {
        if let Ok(mut cache) = self.cache.write() {
            cache.retain(|_, entry| entry.tenant_id != Some(tenant_id));
        }
    }

    /// Clear expired entries (call periodically for memory management)
    pub fn cleanup(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.retain(|_, entry| !entry.is_expired());
        }
    }

    pub fn stats(&self) -> CacheStats {
        if let Ok(cache) = self.cache.read() {
            let total = cache.len();
            let expired = cache.values().filter(|e| e.is_expired()).count();
            let negative = cache
                .values()
                .filter(|e| !e.is_expired() && e.tenant_id.is_none())
                .count();
            CacheStats {
                total_entries: total,
                expired_entries: expired,
                active_entries: total - expired,
                negative_entries: negative,
            }
        } else {
            CacheStats::default()
        }
    }
}

/// Cache statistics
#[derive(Default, Debug, Clone, Copy, serde::Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub active_entries: usize,
    pub negative_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_cache_get_set() {
        let cache = DomainCache::new();
        let tenant_id = Uuid::new_v4();

        assert!(cache.get("alif.example.com").is_none());

        cache.set("alif.example.com", Some(tenant_id));
        assert_eq!(cache.get("alif.example.com"), Some(Some(tenant_id)));
    }

    #[test]
    fn test_cache_negative() {
        let cache = DomainCache::new();

        cache.set("unknown.example.net", None);
        assert_eq!(cache.get("unknown.example.net"), Some(None));
    }

    #[test]
    fn test_negative_entries_expire_first() {
        let cache =
            DomainCache::with_ttls(Duration::from_secs(60), Duration::from_millis(30));
        let tenant_id = Uuid::new_v4();

        cache.set("alif.com", Some(tenant_id));
        cache.set("nobody.com", None);

        sleep(Duration::from_millis(50));
        assert_eq!(cache.get("alif.com"), Some(Some(tenant_id)));
        assert!(cache.get("nobody.com").is_none());
    }

    #[test]
    fn test_cache_expiration() {
        let cache =
            DomainCache::with_ttls(Duration::from_millis(50), Duration::from_millis(50));
        let tenant_id = Uuid::new_v4();

        cache.set("alif.example.com", Some(tenant_id));
        assert_eq!(cache.get("alif.example.com"), Some(Some(tenant_id)));

        sleep(Duration::from_millis(60));
        assert!(cache.get("alif.example.com").is_none());

        cache.cleanup();
        assert_eq!(cache.stats().total_entries, 0);
    }

    #[test]
    fn test_cache_invalidate() {
        let cache = DomainCache::new();

        cache.set("alif.com", Some(Uuid::new_v4()));
        cache.invalidate("alif.com");
        assert!(cache.get("alif.com").is_none());
    }

    #[test]
    fn test_cache_invalidate_tenant() {
        let cache = DomainCache::new();
        let tenant_id = Uuid::new_v4();
        let other = Uuid::new_v4();

        cache.set("alif.example.com", Some(tenant_id));
        cache.set("alif.com", Some(tenant_id));
        cache.set("bob.example.com", Some(other));

        cache.invalidate_tenant(tenant_id);

        assert!(cache.get("alif.example.com").is_none());
        assert!(cache.get("alif.com").is_none());
        assert_eq!(cache.get("bob.example.com"), Some(Some(other)));
    }

    #[test]
    fn test_stats_count_negative_entries() {
        let cache = DomainCache::new();
        cache.set("a.com", None);
        cache.set("b.com", Some(Uuid::new_v4()));

        let stats = cache.stats();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.active_entries, 2);
        assert_eq!(stats.negative_entries, 1);
    }
}
