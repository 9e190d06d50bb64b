use crate::cache::ClusterConfigCache;
use crate::gateway::{ConfigurationChangeListener, DescriptorInventory, ReadinessProbe};
use crate::poller::PollingAnalyzer;
use crate::snapshot::ServiceConfigModel;
use crate::store::{
    DiscoveryConfigFileStore, DiscoveryConfigStore, ServiceConfigFileStore, ServiceConfigRecord,
    ServiceConfigStore,
};
use cmdisc_common::api::ApiClientFactory;
use cmdisc_common::config::{ClusterKey, DiscoveryConfig, GatewayConfig};
use cmdisc_discovery::{Cluster, GeneratorRegistry};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Cache, stores and listeners shared by the monitor and its loop.
pub(crate) struct MonitorState {
    pub(crate) cache: ClusterConfigCache,
    discovery_store: Box<dyn DiscoveryConfigStore>,
    service_store: Box<dyn ServiceConfigStore>,
    listeners: RwLock<Vec<Arc<dyn ConfigurationChangeListener>>>,
}

impl MonitorState {
    /// Fills the cache from the persistent stores.
    async fn load_persisted(&self) {
        for config in self.discovery_store.load_all() {
            if let Some(cluster) = config.cluster.clone() {
                debug!("Loaded discovery configuration for {} @ {}", cluster, config.address);
                self.cache.add_discovery_config(&cluster, config).await;
            }
        }

        for record in self.service_store.load_all() {
            debug!(
                "Loaded service configurations for {} @ {}",
                record.cluster_name, record.discovery_address
            );
            self.cache
                .add_service_configurations(
                    &record.discovery_address,
                    &record.cluster_name,
                    record.configs.into_iter().collect(),
                )
                .await;
        }
    }

    /// Drops a cluster's snapshots from the cache and from disk.
    pub(crate) async fn clear_cache(&self, address: &str, cluster: &str) {
        self.cache.remove_service_configurations(address, cluster).await;
        if let Err(e) = self.service_store.remove(address, cluster) {
            warn!("Failed to remove persisted service configurations of {} @ {}: {}", cluster, address, e);
        }
        if let Err(e) = self.discovery_store.remove(address, cluster) {
            warn!("Failed to remove persisted discovery configuration of {} @ {}: {}", cluster, address, e);
        }
    }

    pub(crate) async fn notify_listeners(&self, address: &str, cluster: &str) {
        let listeners = self.listeners.read().await.clone();
        info!(
            "Notifying {} listener(s) of a configuration change in {} @ {}",
            listeners.len(),
            cluster,
            address
        );
        for listener in listeners {
            listener.on_configuration_change(address, cluster);
        }
    }
}

/// Watches discovered clusters for configuration changes.
///
/// Feed it every successful discovery through
/// [`add_service_configuration`](Self::add_service_configuration); once
/// started, its loop notifies listeners whenever a restarted service's
/// configuration no longer matches what discovery recorded.
pub struct ClusterConfigMonitor {
    state: Arc<MonitorState>,
    analyzer: Arc<PollingAnalyzer>,
    enabled: bool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ClusterConfigMonitor {
    /// Monitor type, also the name of its persistence directory.
    pub const TYPE: &'static str = "CM";

    /// Creates a monitor persisting under the gateway's data directory and
    /// loads the persisted state.
    ///
    /// `registry` should be the one discovery uses: restarts of service types
    /// without generators are ignored.
    pub async fn new(
        config: &GatewayConfig,
        clients: Arc<dyn ApiClientFactory>,
        registry: Arc<GeneratorRegistry>,
    ) -> Self {
        Self::builder(clients, registry).gateway_config(config).build().await
    }

    pub fn builder(
        clients: Arc<dyn ApiClientFactory>,
        registry: Arc<GeneratorRegistry>,
    ) -> MonitorBuilder {
        MonitorBuilder::new(clients, registry)
    }

    pub fn monitor_type(&self) -> &'static str {
        Self::TYPE
    }

    /// Starts the background loop; a no-op when already running or disabled.
    pub fn start(&self) {
        if !self.enabled {
            info!("Cluster configuration monitoring is disabled");
            return;
        }
        let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.analyzer.mark_running() {
            debug!("Cluster configuration monitor is already running");
            return;
        }
        *handle = Some(self.analyzer.clone().spawn());
    }

    /// Stops the loop after its current cycle. A loop sleeping between
    /// cycles exits when the sleep ends.
    pub fn stop(&self) {
        self.analyzer.stop();
    }

    pub fn is_running(&self) -> bool {
        self.analyzer.is_running()
    }

    /// Waits for a stopped loop to exit.
    pub async fn join(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("Cluster configuration monitor task failed: {}", e);
            }
        }
    }

    /// Ignored unless `seconds` is positive.
    pub fn set_polling_interval(&self, seconds: u64) {
        self.analyzer.set_polling_interval(seconds);
    }

    pub fn polling_interval(&self) -> std::time::Duration {
        self.analyzer.polling_interval()
    }

    pub async fn add_listener(&self, listener: Arc<dyn ConfigurationChangeListener>) {
        self.state.listeners.write().await.push(listener);
    }

    /// Records the outcome of a discovery.
    ///
    /// Resets the cluster's event watermark to now, then caches and persists
    /// the connection config and one snapshot per service type.
    pub async fn add_service_configuration(&self, cluster: &Cluster, config: &DiscoveryConfig) {
        let key = ClusterKey::new(config.address.clone(), cluster.name.clone());
        self.analyzer.reset_watermark(&key).await;

        let mut config = config.clone();
        config.cluster = Some(cluster.name.clone());
        if let Err(e) = self.state.discovery_store.store(&config) {
            warn!("Failed to persist discovery configuration of {}: {}", key, e);
        }
        self.state.cache.add_discovery_config(&cluster.name, config).await;

        let snapshots = ServiceConfigModel::from_cluster(cluster);
        let record = ServiceConfigRecord {
            cluster_name: cluster.name.clone(),
            discovery_address: key.address.clone(),
            configs: snapshots.clone().into_iter().collect(),
        };
        if let Err(e) = self.state.service_store.store(&record) {
            warn!("Failed to persist service configurations of {}: {}", key, e);
        }
        self.state
            .cache
            .add_service_configurations(&key.address, &key.cluster, snapshots)
            .await;

        debug!("Recorded configuration of {}", key);
    }

    /// Forgets a cluster's snapshots, in memory and on disk.
    pub async fn clear_cache(&self, source: &str, cluster: &str) {
        self.state.clear_cache(source, cluster).await;
        self.analyzer
            .forget_cluster(&ClusterKey::new(source, cluster))
            .await;
    }

    /// Runs one reconciliation cycle on the caller's task.
    pub async fn run_cycle(&self) {
        self.analyzer.run_cycle().await;
    }

    pub fn cache(&self) -> &ClusterConfigCache {
        &self.state.cache
    }

    pub fn analyzer(&self) -> &PollingAnalyzer {
        &self.analyzer
    }
}

/// Assembles a [`ClusterConfigMonitor`].
pub struct MonitorBuilder {
    clients: Arc<dyn ApiClientFactory>,
    registry: Arc<GeneratorRegistry>,
    config: GatewayConfig,
    discovery_store: Option<Box<dyn DiscoveryConfigStore>>,
    service_store: Option<Box<dyn ServiceConfigStore>>,
    inventory: Option<Arc<dyn DescriptorInventory>>,
    readiness: Option<Arc<dyn ReadinessProbe>>,
}

impl MonitorBuilder {
    pub fn new(clients: Arc<dyn ApiClientFactory>, registry: Arc<GeneratorRegistry>) -> Self {
        Self {
            clients,
            registry,
            config: GatewayConfig::default(),
            discovery_store: None,
            service_store: None,
            inventory: None,
            readiness: None,
        }
    }

    pub fn gateway_config(mut self, config: &GatewayConfig) -> Self {
        self.config = config.clone();
        self
    }

    /// Replaces the file stores under the data directory.
    pub fn stores(
        mut self,
        discovery_store: Box<dyn DiscoveryConfigStore>,
        service_store: Box<dyn ServiceConfigStore>,
    ) -> Self {
        self.discovery_store = Some(discovery_store);
        self.service_store = Some(service_store);
        self
    }

    pub fn inventory(mut self, inventory: Arc<dyn DescriptorInventory>) -> Self {
        self.inventory = Some(inventory);
        self
    }

    pub fn readiness(mut self, readiness: Arc<dyn ReadinessProbe>) -> Self {
        self.readiness = Some(readiness);
        self
    }

    /// Builds the monitor and loads the persisted state into its cache.
    pub async fn build(self) -> ClusterConfigMonitor {
        let monitor_type = ClusterConfigMonitor::TYPE;
        let discovery_store = self.discovery_store.unwrap_or_else(|| {
            Box::new(DiscoveryConfigFileStore::new(
                self.config.discovery_store_dir(monitor_type),
            ))
        });
        let service_store = self.service_store.unwrap_or_else(|| {
            Box::new(ServiceConfigFileStore::new(
                self.config.service_store_dir(monitor_type),
            ))
        });

        let state = Arc::new(MonitorState {
            cache: ClusterConfigCache::new(),
            discovery_store,
            service_store,
            listeners: RwLock::new(Vec::new()),
        });
        state.load_persisted().await;

        let analyzer = Arc::new(PollingAnalyzer::new(
            state.clone(),
            self.clients,
            &self.registry,
            &self.config.monitor,
            &self.config.collector,
            self.inventory,
            self.readiness,
        ));

        ClusterConfigMonitor {
            state,
            analyzer,
            enabled: self.config.monitor.enabled,
            handle: Mutex::new(None),
        }
    }
}
