//! Shared application state

use hostgate_shared::DomainDirectory;
use std::sync::Arc;

use crate::auth::{AuthState, CredentialVerifier, JwtManager};
use crate::config::Config;
use crate::provisioning::DomainProvisioner;
use crate::routing::{BypassPrefixes, DomainCache, HostResolver, RoutingState};
use crate::verification::{DomainVerifier, VerificationSettings};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub directory: Arc<dyn DomainDirectory>,
    pub resolver: HostResolver,
    pub verifier: DomainVerifier,
    pub credentials: Arc<dyn CredentialVerifier>,
}

impl AppState {
    /// Wire the resolver, verifier and JWT credentials around one directory
    pub fn new(
        config: Config,
        directory: Arc<dyn DomainDirectory>,
        provisioner: Arc<dyn DomainProvisioner>,
    ) -> Self {
        let cache = Arc::new(DomainCache::with_ttls(
            config.domain_cache_ttl(),
            config.domain_cache_negative_ttl(),
        ));
        let resolver =
            HostResolver::with_cache(directory.clone(), config.main_domain.clone(), cache);
        let verifier = DomainVerifier::new(
            directory.clone(),
            provisioner,
            resolver.clone(),
            VerificationSettings::from_config(&config),
        );
        let credentials: Arc<dyn CredentialVerifier> =
            Arc::new(JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours));

        Self {
            config: Arc::new(config),
            directory,
            resolver,
            verifier,
            credentials,
        }
    }

    pub fn auth_state(&self) -> AuthState {
        AuthState {
            credentials: self.credentials.clone(),
        }
    }

    pub fn routing_state(&self) -> RoutingState {
        RoutingState {
            resolver: self.resolver.clone(),
            bypass: BypassPrefixes::new(self.config.bypass_prefixes.iter().cloned()),
            timeout: self.config.routing_timeout(),
        }
    }
}
