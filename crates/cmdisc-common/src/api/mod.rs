//! The management API contract consumed by discovery and monitoring.

pub mod model;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use model::*;

use crate::config::DiscoveryConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Read-only access to one cluster manager endpoint.
///
/// Every read returns `Ok(None)` when the endpoint answered without a body
/// (or with 404); callers treat that as "no data" rather than as an error.
#[async_trait]
pub trait ClusterManagerApi: Send + Sync {
    /// Base address of the endpoint this client talks to.
    fn address(&self) -> &str;

    async fn read_clusters(&self, view: DataView) -> Result<Option<ApiClusterList>>;

    async fn read_services(&self, cluster: &str, view: DataView) -> Result<Option<ApiServiceList>>;

    async fn read_service_config(
        &self,
        cluster: &str,
        service: &str,
        view: DataView,
    ) -> Result<Option<ApiServiceConfig>>;

    async fn read_roles(
        &self,
        cluster: &str,
        service: &str,
        filter: &str,
        view: DataView,
    ) -> Result<Option<ApiRoleList>>;

    async fn read_role_config(
        &self,
        cluster: &str,
        role: &str,
        service: &str,
        view: DataView,
    ) -> Result<Option<ApiConfigList>>;

    /// One page of the configurations of every role of a service.
    async fn read_roles_config(
        &self,
        cluster: &str,
        service: &str,
        limit: u64,
        offset: u64,
        view: DataView,
    ) -> Result<Option<ApiRoleConfigList>>;

    async fn read_events(
        &self,
        max_results: Option<u64>,
        query: &str,
        offset: u64,
    ) -> Result<Option<ApiEventQueryResult>>;
}

/// Builds API clients from connection configs.
pub trait ApiClientFactory: Send + Sync {
    fn create(&self, config: &DiscoveryConfig) -> Result<Arc<dyn ClusterManagerApi>>;
}

/// Resolves password aliases to secrets.
pub trait CredentialResolver: Send + Sync {
    fn resolve_password(&self, alias: &str) -> Option<String>;
}
