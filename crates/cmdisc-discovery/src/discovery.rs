use crate::cluster::{Cluster, ServiceEntry};
use crate::collector::CollectorBuilder;
use crate::generator::{
    management_plane_role, management_plane_service, GeneratorContext, GeneratorRegistry,
};
use cmdisc_common::api::{
    ApiClientFactory, ApiConfigList, ApiRole, ApiService, ClusterManagerApi, DataView,
};
use cmdisc_common::config::{CollectorConfig, DiscoveryConfig};
use cmdisc_common::error::{DiscoveryError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Walks a cluster manager endpoint and assembles the [`Cluster`] model.
///
/// Discovery tolerates partial failure: a failed read for one service or
/// role is logged and treated as "no data" for that item. Only a failure to
/// list the cluster's services yields no cluster at all.
pub struct ClusterDiscovery {
    registry: Arc<GeneratorRegistry>,
    clients: Arc<dyn ApiClientFactory>,
    collector: CollectorBuilder,
}

impl ClusterDiscovery {
    /// Creates a new discovery orchestrator.
    ///
    /// # Arguments
    /// * `registry` - Generators that turn roles into service entries
    /// * `clients` - Builds management API clients from connection configs
    /// * `collector_config` - Selects how role configurations are fetched
    pub fn new(
        registry: Arc<GeneratorRegistry>,
        clients: Arc<dyn ApiClientFactory>,
        collector_config: &CollectorConfig,
    ) -> Self {
        Self {
            registry,
            clients,
            collector: CollectorBuilder::new(collector_config).tolerating_role_failures(),
        }
    }

    /// Discovers the named cluster.
    ///
    /// # Returns
    /// - `Ok(Some(Cluster))` - The discovered model
    /// - `Ok(None)` - The cluster's services could not be listed
    /// - `Err(DiscoveryError)` - The address or cluster name is missing
    pub async fn discover(
        &self,
        config: &DiscoveryConfig,
        cluster_name: &str,
    ) -> Result<Option<Cluster>> {
        config.require_address()?;
        if cluster_name.trim().is_empty() {
            return Err(DiscoveryError::MissingCluster);
        }

        let api = self.clients.create(config)?;
        Ok(self.discover_cluster(api, cluster_name).await)
    }

    /// Discovers the cluster named by the connection config itself.
    pub async fn discover_configured(&self, config: &DiscoveryConfig) -> Result<Option<Cluster>> {
        config.require_address()?;
        let cluster_name = config.require_cluster()?;
        self.discover(config, cluster_name).await
    }

    /// Discovers every cluster managed by the endpoint.
    ///
    /// Clusters whose discovery yields nothing are left out; a failure to
    /// list the clusters yields an empty map.
    pub async fn discover_all(&self, config: &DiscoveryConfig) -> Result<HashMap<String, Cluster>> {
        config.require_address()?;
        let api = self.clients.create(config)?;

        let clusters = match api.read_clusters(DataView::Summary).await {
            Ok(Some(list)) => list.into_entries(),
            Ok(None) => {
                warn!("No clusters returned by {}", api.address());
                Vec::new()
            }
            Err(e) => {
                error!("Failed to list clusters at {}: {}", api.address(), e);
                Vec::new()
            }
        };

        let mut discovered = HashMap::new();
        for cluster in clusters {
            if let Some(model) = self.discover_cluster(api.clone(), &cluster.name).await {
                discovered.insert(cluster.name, model);
            }
        }
        Ok(discovered)
    }

    async fn discover_cluster(
        &self,
        api: Arc<dyn ClusterManagerApi>,
        cluster_name: &str,
    ) -> Option<Cluster> {
        info!("Discovering cluster {} at {}", cluster_name, api.address());

        let services = match api.read_services(cluster_name, DataView::Summary).await {
            Ok(Some(list)) => list.into_entries(),
            Ok(None) => {
                warn!("No services returned for cluster {}", cluster_name);
                return None;
            }
            Err(e) => {
                error!("Failed to list services of cluster {}: {}", cluster_name, e);
                return None;
            }
        };

        let collector = self.collector.build(api.clone());
        let mut entries = HashSet::new();

        for service in &services {
            debug!("Discovered service {} ({})", service.name, service.service_type);

            let service_config = match api
                .read_service_config(cluster_name, &service.name, DataView::Full)
                .await
            {
                Ok(config) => config.unwrap_or_default(),
                Err(e) => {
                    warn!("Failed to read configuration of service {}: {}", service.name, e);
                    ApiConfigList::default()
                }
            };

            let role_configs = match collector.collect(cluster_name, &service.name).await {
                Ok(list) => list,
                Err(e) => {
                    warn!("Failed to read role configurations of service {}: {}", service.name, e);
                    continue;
                }
            };

            for role_config in role_configs.entries() {
                let role = role_config.role();
                let config = role_config.config_or_empty();
                self.generate(api.as_ref(), service, &service_config, &role, &config, &mut entries)
                    .await;
            }
        }

        // The management plane has no configuration of its own to read.
        let empty = ApiConfigList::default();
        self.generate(
            api.as_ref(),
            &management_plane_service(),
            &empty,
            &management_plane_role(),
            &empty,
            &mut entries,
        )
        .await;

        let mut cluster = Cluster::new(cluster_name);
        for entry in entries {
            cluster.add_service_entry(entry);
        }
        info!(
            "Discovered {} services in cluster {}",
            cluster.service_names().len(),
            cluster_name
        );
        Some(cluster)
    }

    async fn generate(
        &self,
        api: &dyn ClusterManagerApi,
        service: &ApiService,
        service_config: &ApiConfigList,
        role: &ApiRole,
        role_config: &ApiConfigList,
        entries: &mut HashSet<ServiceEntry>,
    ) {
        let context = GeneratorContext {
            api,
            service,
            service_config,
            role,
            role_config,
        };

        for generator in self.registry.generators_for(&service.service_type) {
            let result = generator.handles(&context);
            if result.handled {
                match generator.generate(&context).await {
                    Ok(entry) => {
                        debug!("Generated {} entry {} for role {}", entry.service, entry.url, role.name);
                        entries.insert(entry);
                    }
                    Err(e) => warn!(
                        "Failed to generate {} for role {} of {}: {}",
                        generator.service(),
                        role.name,
                        service.name,
                        e
                    ),
                }
            } else {
                for issue in &result.issues {
                    info!(
                        "{} not generated for role {} of {}: {}",
                        generator.service(),
                        role.name,
                        service.name,
                        issue
                    );
                }
            }
        }
    }
}
