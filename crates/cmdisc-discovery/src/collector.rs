//! Role configuration collection.
//!
//! Two strategies fetch the configuration of every role of a service:
//! [`ByRoleCollector`] lists the roles and fetches each role's configuration
//! separately, while [`ByServiceCollector`] pages through the bulk
//! role-config read. Both drop excluded role types before returning.

use async_trait::async_trait;
use cmdisc_common::api::{
    ApiConfigList, ApiRoleConfig, ApiRoleConfigList, ClusterManagerApi, DataView,
};
use cmdisc_common::config::CollectorConfig;
use cmdisc_common::error::Result;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Case-insensitive set of excluded role types.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeNameFilter {
    excluded: HashSet<String>,
}

impl TypeNameFilter {
    pub fn new<I, S>(excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        TypeNameFilter {
            excluded: excluded
                .into_iter()
                .map(|s| s.as_ref().trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    pub fn is_excluded(&self, type_name: &str) -> bool {
        self.excluded.contains(&type_name.to_lowercase())
    }
}

/// Fetches the configurations of the roles of one service.
#[async_trait]
pub trait RoleConfigCollector: Send + Sync {
    async fn collect(&self, cluster: &str, service: &str) -> Result<ApiRoleConfigList>;
}

/// Lists roles, then fetches each non-excluded role's configuration.
///
/// A role whose configuration read returns nothing is kept with an empty
/// configuration. A failed read aborts the collection unless the collector
/// tolerates role failures, in which case the role is kept the same way.
pub struct ByRoleCollector {
    api: Arc<dyn ClusterManagerApi>,
    filter: TypeNameFilter,
    tolerate_role_failures: bool,
}

impl ByRoleCollector {
    pub fn new(api: Arc<dyn ClusterManagerApi>, filter: TypeNameFilter) -> Self {
        Self {
            api,
            filter,
            tolerate_role_failures: false,
        }
    }

    pub fn tolerating_role_failures(mut self) -> Self {
        self.tolerate_role_failures = true;
        self
    }
}

#[async_trait]
impl RoleConfigCollector for ByRoleCollector {
    async fn collect(&self, cluster: &str, service: &str) -> Result<ApiRoleConfigList> {
        let mut result = ApiRoleConfigList::new(Vec::new());

        let Some(roles) = self.api.read_roles(cluster, service, "", DataView::Full).await? else {
            debug!("No roles returned for service {} in cluster {}", service, cluster);
            return Ok(result);
        };

        for role in roles.entries() {
            if self.filter.is_excluded(&role.role_type) {
                debug!("Skipping excluded role type {} ({})", role.role_type, role.name);
                continue;
            }

            let config = match self
                .api
                .read_role_config(cluster, &role.name, service, DataView::Full)
                .await
            {
                Ok(Some(config)) => config,
                Ok(None) => {
                    debug!("No configuration returned for role {}", role.name);
                    ApiConfigList::default()
                }
                Err(e) if self.tolerate_role_failures => {
                    warn!("Failed to read configuration of role {}: {}", role.name, e);
                    ApiConfigList::default()
                }
                Err(e) => return Err(e),
            };
            result.push(ApiRoleConfig::new(role, config));
        }

        Ok(result)
    }
}

/// Pages through the bulk role-config read of a service.
pub struct ByServiceCollector {
    api: Arc<dyn ClusterManagerApi>,
    filter: TypeNameFilter,
    page_size: u64,
}

impl ByServiceCollector {
    pub fn new(api: Arc<dyn ClusterManagerApi>, filter: TypeNameFilter, page_size: u64) -> Self {
        Self {
            api,
            filter,
            page_size: page_size.max(1),
        }
    }
}

#[async_trait]
impl RoleConfigCollector for ByServiceCollector {
    async fn collect(&self, cluster: &str, service: &str) -> Result<ApiRoleConfigList> {
        let mut collected = Vec::new();
        let mut offset = 0;

        // A short page (including an absent one) is the last page.
        loop {
            let page = self
                .api
                .read_roles_config(cluster, service, self.page_size, offset, DataView::Full)
                .await?;
            let items = page.map(ApiRoleConfigList::into_entries).unwrap_or_default();
            let count = items.len() as u64;
            debug!(
                "Fetched {} role configs for service {} (offset {})",
                count, service, offset
            );
            collected.extend(items);

            if count < self.page_size {
                break;
            }
            offset += self.page_size;
        }

        collected.retain(|rc| !self.filter.is_excluded(&rc.role_type));
        Ok(ApiRoleConfigList::new(collected))
    }
}

/// How role configurations are fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStrategy {
    ByRole,
    ByService,
}

impl CollectionStrategy {
    /// Parses a configured strategy name, case-insensitively.
    ///
    /// Unknown names fall back to [`CollectionStrategy::ByRole`].
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().replace(['-', '_'], "").as_str() {
            "byrole" => CollectionStrategy::ByRole,
            "byservice" => CollectionStrategy::ByService,
            other => {
                warn!(
                    "Unknown role config collection strategy '{}', falling back to byRole",
                    other
                );
                CollectionStrategy::ByRole
            }
        }
    }
}

/// Builds the collector configured for a discovery session.
#[derive(Debug, Clone)]
pub struct CollectorBuilder {
    strategy: CollectionStrategy,
    page_size: u64,
    filter: TypeNameFilter,
    tolerate_role_failures: bool,
}

impl CollectorBuilder {
    pub fn new(config: &CollectorConfig) -> Self {
        Self {
            strategy: CollectionStrategy::from_name(&config.strategy),
            page_size: config.page_size,
            filter: TypeNameFilter::new(&config.excluded_role_types),
            tolerate_role_failures: false,
        }
    }

    /// Built collectors keep roles whose configuration read failed.
    pub fn tolerating_role_failures(mut self) -> Self {
        self.tolerate_role_failures = true;
        self
    }

    pub fn strategy(&self) -> CollectionStrategy {
        self.strategy
    }

    pub fn build(&self, api: Arc<dyn ClusterManagerApi>) -> Box<dyn RoleConfigCollector> {
        match self.strategy {
            CollectionStrategy::ByRole => {
                let collector = ByRoleCollector::new(api, self.filter.clone());
                if self.tolerate_role_failures {
                    Box::new(collector.tolerating_role_failures())
                } else {
                    Box::new(collector)
                }
            }
            CollectionStrategy::ByService => Box::new(ByServiceCollector::new(
                api,
                self.filter.clone(),
                self.page_size,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmdisc_common::api::mock::{ApiCall, ApiOperation, MockClusterManager};
    use cmdisc_common::api::{ApiConfig, ApiConfigList, ApiRole, ApiService, ItemList};

    const CLUSTER: &str = "Cluster 1";
    const SERVICE: &str = "HIVE-1";

    fn role_config(name: &str, role_type: &str) -> ApiRoleConfig {
        ApiRoleConfig::new(
            &ApiRole::new(name, role_type),
            ItemList::new(vec![ApiConfig::new("port", "1")]),
        )
    }

    fn mock_with_roles(roles: &[(&str, &str)]) -> Arc<MockClusterManager> {
        let mock = MockClusterManager::new("http://cm:7180");
        mock.add_cluster(CLUSTER);
        mock.add_service(CLUSTER, ApiService::new(SERVICE, "HIVE"), ApiConfigList::default());
        for (name, role_type) in roles {
            mock.add_role(
                CLUSTER,
                SERVICE,
                ApiRole::new(*name, *role_type),
                ItemList::new(vec![ApiConfig::new("port", "1")]),
            );
        }
        Arc::new(mock)
    }

    fn role_config_offsets(mock: &MockClusterManager) -> Vec<u64> {
        mock.calls()
            .into_iter()
            .filter_map(|call| match call {
                ApiCall::ReadRolesConfig { offset, .. } => Some(offset),
                _ => None,
            })
            .collect()
    }

    // ========================================================================
    // Filter and builder
    // ========================================================================

    #[test]
    fn test_filter_is_case_insensitive() {
        let filter = TypeNameFilter::new(["RolE1"]);
        assert!(filter.is_excluded("role1"));
        assert!(filter.is_excluded("ROLE1"));
        assert!(!filter.is_excluded("role2"));
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!(CollectionStrategy::from_name("byRole"), CollectionStrategy::ByRole);
        assert_eq!(CollectionStrategy::from_name("BYSERVICE"), CollectionStrategy::ByService);
        assert_eq!(CollectionStrategy::from_name("by-service"), CollectionStrategy::ByService);
        assert_eq!(CollectionStrategy::from_name("bogus"), CollectionStrategy::ByRole);
    }

    #[test]
    fn test_builder_uses_config() {
        let config = CollectorConfig {
            strategy: "byService".into(),
            ..Default::default()
        };
        assert_eq!(CollectorBuilder::new(&config).strategy(), CollectionStrategy::ByService);
        assert_eq!(
            CollectorBuilder::new(&CollectorConfig::default()).strategy(),
            CollectionStrategy::ByRole
        );
    }

    // ========================================================================
    // By-role collection
    // ========================================================================

    #[tokio::test]
    async fn test_by_role_collects_every_role() {
        let mock = mock_with_roles(&[("hs2-1", "HIVESERVER2"), ("hms-1", "HIVEMETASTORE")]);
        let collector = ByRoleCollector::new(mock.clone(), TypeNameFilter::default());

        let result = collector.collect(CLUSTER, SERVICE).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(mock.call_count(ApiOperation::ReadRoles), 1);
        assert_eq!(mock.call_count(ApiOperation::ReadRoleConfig), 2);
    }

    #[tokio::test]
    async fn test_by_role_skips_excluded_types_before_requesting() {
        let mock = mock_with_roles(&[("hs2-1", "HIVESERVER2"), ("hms-1", "HIVEMETASTORE")]);
        let collector =
            ByRoleCollector::new(mock.clone(), TypeNameFilter::new(["hiveMetastore"]));

        let result = collector.collect(CLUSTER, SERVICE).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.entries()[0].role_type, "HIVESERVER2");
        assert_eq!(mock.call_count(ApiOperation::ReadRoleConfig), 1);
    }

    #[tokio::test]
    async fn test_by_role_null_role_list() {
        let mock = Arc::new(MockClusterManager::new("http://cm:7180"));
        let collector = ByRoleCollector::new(mock, TypeNameFilter::default());

        let result = collector.collect(CLUSTER, SERVICE).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_by_role_keeps_roles_without_config() {
        let mock = mock_with_roles(&[("hs2-1", "HIVESERVER2"), ("hs2-2", "HIVESERVER2")]);
        mock.remove_role_config(CLUSTER, "hs2-1");
        mock.set_role_config(CLUSTER, "hs2-2", ApiConfigList::default());
        let collector = ByRoleCollector::new(mock, TypeNameFilter::default());

        let result = collector.collect(CLUSTER, SERVICE).await.unwrap();
        assert_eq!(result.len(), 2);
        for role_config in result.entries() {
            assert!(role_config.config_or_empty().entries().is_empty());
        }
    }

    #[tokio::test]
    async fn test_by_role_propagates_errors() {
        let mock = mock_with_roles(&[("hs2-1", "HIVESERVER2")]);
        mock.fail(ApiOperation::ReadRoleConfig);
        let collector = ByRoleCollector::new(mock, TypeNameFilter::default());

        assert!(collector.collect(CLUSTER, SERVICE).await.is_err());
    }

    #[tokio::test]
    async fn test_by_role_tolerates_one_failing_role() {
        let mock = mock_with_roles(&[("hs2-1", "HIVESERVER2"), ("hs2-2", "HIVESERVER2")]);
        mock.fail_role_config(CLUSTER, "hs2-1");
        let collector =
            ByRoleCollector::new(mock.clone(), TypeNameFilter::default()).tolerating_role_failures();

        let result = collector.collect(CLUSTER, SERVICE).await.unwrap();
        assert_eq!(result.len(), 2);
        assert!(result.entries()[0].config_or_empty().entries().is_empty());
        assert_eq!(
            result.entries()[1].config_or_empty().normalized_value("port"),
            Some("1".to_string())
        );
        assert_eq!(mock.call_count(ApiOperation::ReadRoleConfig), 2);
    }

    #[tokio::test]
    async fn test_builder_passes_role_failure_tolerance() {
        let mock = mock_with_roles(&[("hs2-1", "HIVESERVER2"), ("hs2-2", "HIVESERVER2")]);
        mock.fail_role_config(CLUSTER, "hs2-2");
        let builder = CollectorBuilder::new(&CollectorConfig::default());

        assert!(builder.build(mock.clone()).collect(CLUSTER, SERVICE).await.is_err());

        let tolerant = builder.tolerating_role_failures().build(mock);
        assert_eq!(tolerant.collect(CLUSTER, SERVICE).await.unwrap().len(), 2);
    }

    // ========================================================================
    // By-service collection
    // ========================================================================

    #[tokio::test]
    async fn test_by_service_single_short_page() {
        let mock = mock_with_roles(&[("hs2-1", "HIVESERVER2"), ("hms-1", "HIVEMETASTORE")]);
        let collector = ByServiceCollector::new(mock.clone(), TypeNameFilter::default(), 500);

        let result = collector.collect(CLUSTER, SERVICE).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(role_config_offsets(&mock), vec![0]);
    }

    #[tokio::test]
    async fn test_by_service_pages_until_short_page() {
        let roles: Vec<(String, &str)> = (0..5).map(|i| (format!("dn-{}", i), "DATANODE")).collect();
        let roles: Vec<(&str, &str)> = roles.iter().map(|(n, t)| (n.as_str(), *t)).collect();
        let mock = mock_with_roles(&roles);
        let collector = ByServiceCollector::new(mock.clone(), TypeNameFilter::default(), 2);

        let result = collector.collect(CLUSTER, SERVICE).await.unwrap();
        assert_eq!(result.len(), 5);
        assert_eq!(role_config_offsets(&mock), vec![0, 2, 4]);
    }

    #[tokio::test]
    async fn test_by_service_full_pages_need_trailing_fetch() {
        let mock = mock_with_roles(&[("a", "X"), ("b", "X"), ("c", "X"), ("d", "X")]);
        let collector = ByServiceCollector::new(mock.clone(), TypeNameFilter::default(), 2);

        let result = collector.collect(CLUSTER, SERVICE).await.unwrap();
        assert_eq!(result.len(), 4);
        assert_eq!(role_config_offsets(&mock), vec![0, 2, 4]);
    }

    #[tokio::test]
    async fn test_by_service_filters_after_paging() {
        let mock = mock_with_roles(&[("hs2-1", "HIVESERVER2"), ("hms-1", "HIVEMETASTORE")]);
        let collector =
            ByServiceCollector::new(mock.clone(), TypeNameFilter::new(["hiveMetaStore"]), 1);

        let result = collector.collect(CLUSTER, SERVICE).await.unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.entries()[0].name, "hs2-1");
        assert_eq!(role_config_offsets(&mock), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_by_service_null_page_stops() {
        let mock = mock_with_roles(&[]);
        mock.script_roles_config_pages(
            CLUSTER,
            SERVICE,
            vec![
                Some(ItemList::new(vec![role_config("a", "X"), role_config("b", "X")])),
                None,
            ],
        );
        let collector = ByServiceCollector::new(mock.clone(), TypeNameFilter::default(), 2);

        let result = collector.collect(CLUSTER, SERVICE).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(role_config_offsets(&mock), vec![0, 2]);
    }

    #[tokio::test]
    async fn test_by_service_null_items_is_empty() {
        let mock = mock_with_roles(&[]);
        mock.script_roles_config_pages(CLUSTER, SERVICE, vec![Some(ItemList::default())]);
        let collector = ByServiceCollector::new(mock, TypeNameFilter::default(), 2);

        assert!(collector.collect(CLUSTER, SERVICE).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_by_service_propagates_errors() {
        let mock = mock_with_roles(&[("a", "X")]);
        mock.fail(ApiOperation::ReadRolesConfig);
        let collector = ByServiceCollector::new(mock, TypeNameFilter::default(), 2);

        assert!(collector.collect(CLUSTER, SERVICE).await.is_err());
    }
}
