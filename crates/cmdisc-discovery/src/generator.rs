//! Service model generators.
//!
//! A generator knows how one role of one cluster-side service type maps to a
//! gateway-facing endpoint. Discovery offers every (service, role) pair to
//! the generators registered for the service's type; each generator decides
//! whether it applies and, if so, produces a [`ServiceEntry`].

use crate::cluster::{EntryKind, ServiceEntry};
use async_trait::async_trait;
use cmdisc_common::api::{ApiConfigList, ApiRole, ApiService, ClusterManagerApi};
use cmdisc_common::error::Result;
use std::collections::HashMap;
use std::sync::Arc;

/// Service type of the synthetic management-plane pseudo-service.
pub const MANAGER_SERVICE_TYPE: &str = "ManagerServer";

/// Service name of the synthetic management-plane pseudo-service.
pub const MANAGER_SERVICE_NAME: &str = "ClouderaManager";

/// Role type of the single synthetic management-plane role.
pub const MANAGER_ROLE_TYPE: &str = "ManagerServer";

/// Everything a generator may look at for one (service, role) pair.
///
/// `api` is the client of the endpoint being discovered, for generators
/// that need more than the service and role configurations.
#[derive(Clone, Copy)]
pub struct GeneratorContext<'a> {
    pub api: &'a dyn ClusterManagerApi,
    pub service: &'a ApiService,
    pub service_config: &'a ApiConfigList,
    pub role: &'a ApiRole,
    pub role_config: &'a ApiConfigList,
}

impl<'a> GeneratorContext<'a> {
    /// Base address of the management endpoint being discovered.
    pub fn api_address(&self) -> &'a str {
        self.api.address()
    }

    /// Normalized value of a service-level property, if listed.
    pub fn service_property(&self, name: &str) -> Option<String> {
        self.service_config.normalized_value(name)
    }

    /// Normalized value of a role-level property, if listed.
    pub fn role_property(&self, name: &str) -> Option<String> {
        self.role_config.normalized_value(name)
    }

    pub fn hostname(&self) -> Option<&'a str> {
        self.role.hostname()
    }
}

/// Outcome of asking a generator whether it applies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandleResult {
    pub handled: bool,
    /// Why the generator declined or what it found questionable
    pub issues: Vec<String>,
}

impl HandleResult {
    pub fn handled() -> Self {
        HandleResult {
            handled: true,
            issues: Vec::new(),
        }
    }

    pub fn declined() -> Self {
        HandleResult::default()
    }

    pub fn declined_because(issue: impl Into<String>) -> Self {
        HandleResult {
            handled: false,
            issues: vec![issue.into()],
        }
    }
}

/// Maps one cluster-side role to a gateway-facing endpoint.
#[async_trait]
pub trait ServiceModelGenerator: Send + Sync {
    /// Gateway-facing service name this generator produces
    fn service(&self) -> &str;

    /// Cluster-side service type this generator is registered under
    fn service_type(&self) -> &str;

    /// Cluster-side role type this generator applies to
    fn role_type(&self) -> &str;

    fn model_type(&self) -> EntryKind;

    fn handles(&self, context: &GeneratorContext<'_>) -> HandleResult;

    /// Produces the entry for a handled pair, reading further through
    /// `context.api` when needed.
    async fn generate(&self, context: &GeneratorContext<'_>) -> Result<ServiceEntry>;
}

/// Generators keyed by the cluster-side service type they handle.
#[derive(Default, Clone)]
pub struct GeneratorRegistry {
    generators: HashMap<String, Vec<Arc<dyn ServiceModelGenerator>>>,
}

impl GeneratorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in generators.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ManagementPlaneGenerator));
        registry
    }

    pub fn register(&mut self, generator: Arc<dyn ServiceModelGenerator>) {
        self.generators
            .entry(generator.service_type().to_string())
            .or_default()
            .push(generator);
    }

    pub fn with(mut self, generator: Arc<dyn ServiceModelGenerator>) -> Self {
        self.register(generator);
        self
    }

    /// Generators registered for `service_type`, in registration order.
    pub fn generators_for(&self, service_type: &str) -> &[Arc<dyn ServiceModelGenerator>] {
        self.generators
            .get(service_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn service_types(&self) -> impl Iterator<Item = &str> {
        self.generators.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.generators.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The management endpoint's own REST API, exposed as `CM-API`.
pub struct ManagementPlaneGenerator;

impl ManagementPlaneGenerator {
    pub const SERVICE: &'static str = "CM-API";
}

#[async_trait]
impl ServiceModelGenerator for ManagementPlaneGenerator {
    fn service(&self) -> &str {
        Self::SERVICE
    }

    fn service_type(&self) -> &str {
        MANAGER_SERVICE_TYPE
    }

    fn role_type(&self) -> &str {
        MANAGER_ROLE_TYPE
    }

    fn model_type(&self) -> EntryKind {
        EntryKind::Api
    }

    fn handles(&self, context: &GeneratorContext<'_>) -> HandleResult {
        if context.service.service_type == MANAGER_SERVICE_TYPE
            && context.role.role_type == MANAGER_ROLE_TYPE
        {
            HandleResult::handled()
        } else {
            HandleResult::declined()
        }
    }

    async fn generate(&self, context: &GeneratorContext<'_>) -> Result<ServiceEntry> {
        let url = format!("{}/api", context.api_address().trim_end_matches('/'));
        Ok(ServiceEntry::new(
            self.model_type(),
            self.service(),
            self.service_type(),
            self.role_type(),
            url,
        ))
    }
}

/// The synthetic service representing the management plane itself.
pub fn management_plane_service() -> ApiService {
    ApiService::new(MANAGER_SERVICE_NAME, MANAGER_SERVICE_TYPE)
}

/// The single synthetic role of the management-plane service.
pub fn management_plane_role() -> ApiRole {
    ApiRole::new(MANAGER_ROLE_TYPE, MANAGER_ROLE_TYPE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmdisc_common::api::mock::MockClusterManager;

    struct NoopGenerator(&'static str);

    #[async_trait]
    impl ServiceModelGenerator for NoopGenerator {
        fn service(&self) -> &str {
            "NOOP"
        }
        fn service_type(&self) -> &str {
            self.0
        }
        fn role_type(&self) -> &str {
            "ANY"
        }
        fn model_type(&self) -> EntryKind {
            EntryKind::Unknown
        }
        fn handles(&self, _context: &GeneratorContext<'_>) -> HandleResult {
            HandleResult::declined_because("never applies")
        }
        async fn generate(&self, _context: &GeneratorContext<'_>) -> Result<ServiceEntry> {
            unreachable!()
        }
    }

    #[test]
    fn test_registry_groups_by_service_type() {
        let registry = GeneratorRegistry::with_builtin()
            .with(Arc::new(NoopGenerator("HDFS")))
            .with(Arc::new(NoopGenerator("HDFS")))
            .with(Arc::new(NoopGenerator("HIVE")));

        assert_eq!(registry.len(), 4);
        assert_eq!(registry.generators_for("HDFS").len(), 2);
        assert_eq!(registry.generators_for(MANAGER_SERVICE_TYPE).len(), 1);
        assert!(registry.generators_for("YARN").is_empty());
    }

    #[test]
    fn test_empty_registry() {
        let registry = GeneratorRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.service_types().count(), 0);
    }

    #[tokio::test]
    async fn test_management_plane_generator() {
        let api = MockClusterManager::new("http://cm:7180/");
        let service = management_plane_service();
        let role = management_plane_role();
        let empty = ApiConfigList::default();
        let context = GeneratorContext {
            api: &api,
            service: &service,
            service_config: &empty,
            role: &role,
            role_config: &empty,
        };

        let generator = ManagementPlaneGenerator;
        assert!(generator.handles(&context).handled);

        let entry = generator.generate(&context).await.unwrap();
        assert_eq!(entry.service, "CM-API");
        assert_eq!(entry.kind, EntryKind::Api);
        assert_eq!(entry.url, "http://cm:7180/api");
    }

    #[test]
    fn test_management_plane_generator_ignores_other_roles() {
        let api = MockClusterManager::new("http://cm:7180");
        let service = ApiService::new("HDFS-1", "HDFS");
        let role = ApiRole::new("nn", "NAMENODE");
        let empty = ApiConfigList::default();
        let context = GeneratorContext {
            api: &api,
            service: &service,
            service_config: &empty,
            role: &role,
            role_config: &empty,
        };
        assert_eq!(ManagementPlaneGenerator.handles(&context), HandleResult::declined());
    }
}
