use crate::client::HttpApiClient;
use cmdisc_common::api::{ApiClientFactory, ClusterManagerApi, CredentialResolver};
use cmdisc_common::config::{DiscoveryConfig, HttpClientConfig};
use cmdisc_common::error::Result;
use std::sync::Arc;
use tracing::{debug, warn};

/// Creates [`HttpApiClient`]s from connection configs.
///
/// When the config names a user, the password is looked up through the
/// credential resolver under the config's password alias. Without a resolver,
/// or when the alias does not resolve, requests go out unauthenticated.
pub struct HttpClientFactory {
    config: HttpClientConfig,
    credentials: Option<Arc<dyn CredentialResolver>>,
}

impl HttpClientFactory {
    pub fn new(config: HttpClientConfig) -> Self {
        Self {
            config,
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, resolver: Arc<dyn CredentialResolver>) -> Self {
        self.credentials = Some(resolver);
        self
    }

    /// Builds the concrete client, for callers that need more than the trait.
    pub fn create_client(&self, config: &DiscoveryConfig) -> Result<HttpApiClient> {
        let address = config.require_address()?;
        let client = HttpApiClient::new(address, &self.config)?;

        let Some(user) = config.user.as_deref().filter(|u| !u.is_empty()) else {
            return Ok(client);
        };

        let alias = config.password_alias_or_default();
        match self
            .credentials
            .as_ref()
            .and_then(|resolver| resolver.resolve_password(alias))
        {
            Some(password) => {
                debug!("Using basic authentication for {} as {}", address, user);
                Ok(client.with_basic_auth(user, &password))
            }
            None => {
                warn!(
                    "No password found for alias {} (user {} @ {}); continuing without credentials",
                    alias, user, address
                );
                Ok(client)
            }
        }
    }
}

impl ApiClientFactory for HttpClientFactory {
    fn create(&self, config: &DiscoveryConfig) -> Result<Arc<dyn ClusterManagerApi>> {
        Ok(Arc::new(self.create_client(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentialResolver;
    use cmdisc_common::error::DiscoveryError;

    #[tokio::test]
    async fn test_factory_rejects_missing_address() {
        let factory = HttpClientFactory::new(HttpClientConfig::default());
        let result = factory.create(&DiscoveryConfig::new(""));
        assert!(matches!(result, Err(DiscoveryError::MissingAddress)));
    }

    #[tokio::test]
    async fn test_factory_creates_client_for_address() {
        let factory = HttpClientFactory::new(HttpClientConfig::default());
        let client = factory.create(&DiscoveryConfig::new("http://cm:7180")).unwrap();
        assert_eq!(client.address(), "http://cm:7180");
    }

    #[tokio::test]
    async fn test_factory_resolves_password_alias() {
        let resolver = StaticCredentialResolver::new().with_password("cm.pw", "secret");
        let factory =
            HttpClientFactory::new(HttpClientConfig::default()).with_credentials(Arc::new(resolver));

        let config = DiscoveryConfig::new("http://cm:7180")
            .with_user("admin")
            .with_password_alias("cm.pw");
        let client = factory.create_client(&config).unwrap();
        assert!(client.has_credentials());

        let unresolved = config.with_password_alias("other");
        assert!(!factory.create_client(&unresolved).unwrap().has_credentials());
    }
}
