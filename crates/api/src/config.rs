//! Application configuration

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Default path prefixes that are never tenant-routed
pub const DEFAULT_BYPASS_PREFIXES: &[&str] = &[
    "/api",
    "/auth",
    "/static",
    "/public",
    "/assets",
    "/_next",
    "/favicon.ico",
    "/health",
];

/// Which provisioning capability verifies custom domains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionerKind {
    /// Vercel project domains API
    Vercel,
    /// Direct DNS lookups against the issued CNAME target
    Dns,
}

impl FromStr for ProvisionerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vercel" => Ok(ProvisionerKind::Vercel),
            "dns" => Ok(ProvisionerKind::Dns),
            _ => Err(ConfigError::Invalid("PROVISIONER must be 'vercel' or 'dns'")),
        }
    }
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub bind_address: String,
    pub main_domain: String, // e.g., "example.com" for *.example.com routing
    pub cname_zone: String,  // e.g., "cname.example.com"

    // Database (None only when ALLOW_MEMORY_STORE=true)
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Authentication
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,

    // Routing
    pub routing_timeout_ms: u64,
    pub bypass_prefixes: Vec<String>,
    pub domain_cache_ttl_secs: u64,
    pub domain_cache_negative_ttl_secs: u64,

    // Provisioning
    pub provisioner: ProvisionerKind,
    pub vercel_api_token: Option<String>,
    pub vercel_project_id: Option<String>,
    pub vercel_team_id: Option<String>,
    pub vercel_api_url: String,
    pub provisioning_timeout_ms: u64,

    // Verification
    pub verification_max_attempts: i32,
    pub verification_sweep_cron: String,
    pub verification_sweep_batch: usize,
}

/// Parse an env var, falling back to `default` when unset or malformed
fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let main_domain = env_non_empty("MAIN_DOMAIN")
            .unwrap_or_else(|| "localhost".to_string())
            .trim_end_matches('.')
            .to_ascii_lowercase();

        let database_url = match env_non_empty("DATABASE_URL") {
            Some(url) => Some(url),
            None if env_parse("ALLOW_MEMORY_STORE", false) => None,
            None => return Err(ConfigError::Missing("DATABASE_URL")),
        };

        let jwt_secret = {
            let secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
            if secret.len() < 32 {
                return Err(ConfigError::WeakSecret(
                    "JWT_SECRET must be at least 32 characters",
                ));
            }
            secret
        };

        let vercel_api_token = env_non_empty("VERCEL_API_TOKEN");
        let vercel_project_id = env_non_empty("VERCEL_PROJECT_ID");

        let provisioner = match env_non_empty("PROVISIONER") {
            Some(kind) => kind.parse()?,
            None if vercel_api_token.is_some() => ProvisionerKind::Vercel,
            None => ProvisionerKind::Dns,
        };

        if provisioner == ProvisionerKind::Vercel {
            if vercel_api_token.is_none() {
                return Err(ConfigError::Missing("VERCEL_API_TOKEN"));
            }
            if vercel_project_id.is_none() {
                return Err(ConfigError::Missing("VERCEL_PROJECT_ID"));
            }
        }

        let bypass_prefixes = match env_non_empty("BYPASS_PREFIXES") {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect(),
            None => DEFAULT_BYPASS_PREFIXES.iter().map(|p| p.to_string()).collect(),
        };

        let verification_max_attempts = env_parse("VERIFICATION_MAX_ATTEMPTS", 48);
        if verification_max_attempts < 1 {
            return Err(ConfigError::Invalid(
                "VERIFICATION_MAX_ATTEMPTS must be at least 1",
            ));
        }

        Ok(Self {
            // Server
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            cname_zone: env_non_empty("CNAME_ZONE")
                .map(|z| z.trim_end_matches('.').to_ascii_lowercase())
                .unwrap_or_else(|| format!("cname.{}", main_domain)),
            main_domain,

            // Database
            database_url,
            database_max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 10),

            // Authentication
            jwt_secret,
            jwt_expiry_hours: env_parse("JWT_EXPIRY_HOURS", 168),

            // Routing
            routing_timeout_ms: env_parse("ROUTING_TIMEOUT_MS", 250),
            bypass_prefixes,
            domain_cache_ttl_secs: env_parse("DOMAIN_CACHE_TTL_SECS", 300),
            domain_cache_negative_ttl_secs: env_parse("DOMAIN_CACHE_NEGATIVE_TTL_SECS", 30),

            // Provisioning
            provisioner,
            vercel_api_token,
            vercel_project_id,
            vercel_team_id: env_non_empty("VERCEL_TEAM_ID"),
            vercel_api_url: env_non_empty("VERCEL_API_URL")
                .unwrap_or_else(|| "https://api.vercel.com".to_string()),
            provisioning_timeout_ms: env_parse("PROVISIONING_TIMEOUT_MS", 10_000),

            // Verification
            verification_max_attempts,
            verification_sweep_cron: env_non_empty("VERIFICATION_SWEEP_CRON")
                .unwrap_or_else(|| "0 * * * * *".to_string()),
            verification_sweep_batch: env_parse("VERIFICATION_SWEEP_BATCH", 50),
        })
    }

    pub fn routing_timeout(&self) -> Duration {
        Duration::from_millis(self.routing_timeout_ms)
    }

    pub fn provisioning_timeout(&self) -> Duration {
        Duration::from_millis(self.provisioning_timeout_ms)
    }

    pub fn domain_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.domain_cache_ttl_secs)
    }

    pub fn domain_cache_negative_ttl(&self) -> Duration {
        Duration::from_secs(self.domain_cache_negative_ttl_secs)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
    #[error("Weak secret: {0}")]
    WeakSecret(&'static str),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "DATABASE_URL",
        "ALLOW_MEMORY_STORE",
        "JWT_SECRET",
        "MAIN_DOMAIN",
        "CNAME_ZONE",
        "PROVISIONER",
        "VERCEL_API_TOKEN",
        "VERCEL_PROJECT_ID",
        "BYPASS_PREFIXES",
        "VERIFICATION_MAX_ATTEMPTS",
    ];

    /// Helper to set required env vars for testing
    fn setup_minimal_config() {
        for var in VARS {
            env::remove_var(var);
        }
        env::set_var("DATABASE_URL", "postgres://test");
        env::set_var(
            "JWT_SECRET",
            "test-jwt-secret-must-be-at-least-32-characters-long",
        );
    }

    fn cleanup_config() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        setup_minimal_config();

        let config = Config::from_env().unwrap();
        assert_eq!(config.main_domain, "localhost");
        assert_eq!(config.cname_zone, "cname.localhost");
        assert_eq!(config.provisioner, ProvisionerKind::Dns);
        assert_eq!(config.routing_timeout(), Duration::from_millis(250));
        assert!(config.bypass_prefixes.iter().any(|p| p == "/api"));

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_main_domain_is_normalized() {
        setup_minimal_config();
        env::set_var("MAIN_DOMAIN", "Example.COM.");

        let config = Config::from_env().unwrap();
        assert_eq!(config.main_domain, "example.com");
        assert_eq!(config.cname_zone, "cname.example.com");

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_database_url_required_unless_memory_allowed() {
        setup_minimal_config();
        env::remove_var("DATABASE_URL");

        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Missing("DATABASE_URL"))
        ));

        env::set_var("ALLOW_MEMORY_STORE", "true");
        let config = Config::from_env().unwrap();
        assert!(config.database_url.is_none());

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_weak_jwt_secret_rejected() {
        setup_minimal_config();
        env::set_var("JWT_SECRET", "short");

        assert!(matches!(Config::from_env(), Err(ConfigError::WeakSecret(_))));

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_vercel_requires_credentials() {
        setup_minimal_config();
        env::set_var("PROVISIONER", "vercel");

        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Missing("VERCEL_API_TOKEN"))
        ));

        env::set_var("VERCEL_API_TOKEN", "token");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Missing("VERCEL_PROJECT_ID"))
        ));

        env::set_var("VERCEL_PROJECT_ID", "prj_123");
        let config = Config::from_env().unwrap();
        assert_eq!(config.provisioner, ProvisionerKind::Vercel);

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_vercel_selected_when_token_present() {
        setup_minimal_config();
        env::set_var("VERCEL_API_TOKEN", "token");
        env::set_var("VERCEL_PROJECT_ID", "prj_123");

        let config = Config::from_env().unwrap();
        assert_eq!(config.provisioner, ProvisionerKind::Vercel);

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_bypass_prefixes_override() {
        setup_minimal_config();
        env::set_var("BYPASS_PREFIXES", "/api, /login ,,");

        let config = Config::from_env().unwrap();
        assert_eq!(config.bypass_prefixes, vec!["/api", "/login"]);

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_invalid_provisioner_rejected() {
        setup_minimal_config();
        env::set_var("PROVISIONER", "route53");

        assert!(matches!(Config::from_env(), Err(ConfigError::Invalid(_))));

        cleanup_config();
    }
}
