use crate::events::{event_query, format_timestamp, EventFilter, EventKind, RestartEvent};
use crate::gateway::{DescriptorInventory, ReadinessProbe};
use crate::monitor::MonitorState;
use crate::snapshot::{detect_change, ServiceConfigModel};
use chrono::{DateTime, Utc};
use cmdisc_common::api::{ApiClientFactory, ClusterManagerApi, DataView};
use cmdisc_common::config::{ClusterKey, CollectorConfig, DiscoveryConfig, MonitorConfig};
use cmdisc_common::error::{DiscoveryError, Result};
use cmdisc_discovery::{CollectorBuilder, GeneratorRegistry};
use lru::LruCache;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Upper bound on remembered event ids.
const MAX_PROCESSED_EVENTS: usize = 1000;

/// Ids of events already acted on, forgotten after a TTL. Past capacity the
/// least recently recorded id is evicted.
#[derive(Debug)]
struct ProcessedEvents {
    seen: LruCache<String, Instant>,
}

impl ProcessedEvents {
    fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            seen: LruCache::new(capacity),
        }
    }

    /// Entries are ordered by recording time, so expired ids sit at the
    /// least recently used end.
    fn purge(&mut self, ttl: Duration) {
        let now = Instant::now();
        while let Some((_, at)) = self.seen.peek_lru() {
            if now.duration_since(*at) < ttl {
                break;
            }
            self.seen.pop_lru();
        }
    }

    fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    fn insert(&mut self, id: String) {
        self.seen.put(id, Instant::now());
    }
}

fn to_time_delta(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero())
}

/// The reconciliation loop.
///
/// Every cycle visits each cluster with a recorded snapshot, looks for
/// restart events since the cluster's watermark and compares the recorded
/// configuration of restarted services with their live configuration.
/// Listeners are notified once per changed cluster.
pub struct PollingAnalyzer {
    state: Arc<MonitorState>,
    clients: Arc<dyn ApiClientFactory>,
    collector: CollectorBuilder,
    filter: EventFilter,
    lookback: Duration,
    overlap: Duration,
    interval_secs: AtomicU64,
    running: AtomicBool,
    ready: AtomicBool,
    watermarks: Mutex<HashMap<ClusterKey, DateTime<Utc>>>,
    api_clients: Mutex<HashMap<String, Arc<dyn ClusterManagerApi>>>,
    processed: Mutex<ProcessedEvents>,
    inventory: Option<Arc<dyn DescriptorInventory>>,
    readiness: Option<Arc<dyn ReadinessProbe>>,
}

impl PollingAnalyzer {
    pub(crate) fn new(
        state: Arc<MonitorState>,
        clients: Arc<dyn ApiClientFactory>,
        registry: &GeneratorRegistry,
        config: &MonitorConfig,
        collector_config: &CollectorConfig,
        inventory: Option<Arc<dyn DescriptorInventory>>,
        readiness: Option<Arc<dyn ReadinessProbe>>,
    ) -> Self {
        Self {
            state,
            clients,
            collector: CollectorBuilder::new(collector_config),
            filter: EventFilter::new(config, registry.service_types()),
            lookback: config.lookback(),
            overlap: config.event_query_overlap(),
            interval_secs: AtomicU64::new(config.polling_interval_secs.max(1)),
            running: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            watermarks: Mutex::new(HashMap::new()),
            api_clients: Mutex::new(HashMap::new()),
            processed: Mutex::new(ProcessedEvents::new(MAX_PROCESSED_EVENTS)),
            inventory,
            readiness,
        }
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.load(Ordering::SeqCst))
    }

    /// Ignored unless `seconds` is positive.
    pub fn set_polling_interval(&self, seconds: u64) {
        if seconds > 0 {
            self.interval_secs.store(seconds, Ordering::SeqCst);
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Marks the loop as running. Returns false if it already was.
    pub(crate) fn mark_running(&self) -> bool {
        !self.running.swap(true, Ordering::SeqCst)
    }

    /// Asks the loop to exit once its current cycle and sleep are over.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Starts the loop task. The caller marks the loop running first.
    pub(crate) fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        info!(
            "Monitoring cluster configurations for changes every {} seconds",
            self.polling_interval().as_secs()
        );

        while self.is_running() {
            if self.is_gateway_ready() {
                self.run_cycle().await;
            } else {
                info!("Gateway is not ready yet; skipping cluster configuration check");
            }
            tokio::time::sleep(self.polling_interval()).await;
        }

        info!("Stopped monitoring cluster configurations");
    }

    fn is_gateway_ready(&self) -> bool {
        if self.ready.load(Ordering::SeqCst) {
            return true;
        }
        let ready = self.readiness.as_ref().map_or(true, |probe| probe.is_ready());
        if ready {
            self.ready.store(true, Ordering::SeqCst);
        }
        ready
    }

    /// One pass over every cluster with a recorded snapshot.
    pub async fn run_cycle(&self) {
        self.processed
            .lock()
            .await
            .purge(self.polling_interval() * 3);

        let mut unreferenced = Vec::new();

        for key in self.state.cache.cluster_keys().await {
            let Some(config) = self
                .state
                .cache
                .get_discovery_config(&key.address, &key.cluster)
                .await
            else {
                debug!("No discovery configuration for {}; skipping", key);
                continue;
            };

            if !self.is_referenced(&key) {
                unreferenced.push(key);
                continue;
            }

            debug!("Checking {} for configuration changes", key);
            match self.check_cluster(&key, &config).await {
                Ok(true) => self.state.notify_listeners(&key.address, &key.cluster).await,
                Ok(false) => debug!("No configuration changes detected for {}", key),
                Err(e) => error!("Error checking {} for configuration changes: {}", key, e),
            }
        }

        for key in unreferenced {
            info!(
                "Cluster {} is no longer referenced by any topology; stopping its configuration monitoring",
                key
            );
            self.state.clear_cache(&key.address, &key.cluster).await;
            self.forget_cluster(&key).await;
        }
    }

    fn is_referenced(&self, key: &ClusterKey) -> bool {
        self.inventory
            .as_ref()
            .map_or(true, |inventory| inventory.is_referenced(&key.address, &key.cluster))
    }

    /// Only events after "now" are considered for the cluster from here on.
    pub(crate) async fn reset_watermark(&self, key: &ClusterKey) {
        self.watermarks.lock().await.insert(key.clone(), Utc::now());
    }

    pub(crate) async fn forget_cluster(&self, key: &ClusterKey) {
        self.watermarks.lock().await.remove(key);
    }

    /// Watermark of a cluster, if one was recorded.
    pub async fn watermark(&self, key: &ClusterKey) -> Option<DateTime<Utc>> {
        self.watermarks.lock().await.get(key).copied()
    }

    async fn api_client(&self, config: &DiscoveryConfig) -> Result<Arc<dyn ClusterManagerApi>> {
        let mut clients = self.api_clients.lock().await;
        if let Some(client) = clients.get(&config.address) {
            return Ok(client.clone());
        }
        let client = self.clients.create(config)?;
        clients.insert(config.address.clone(), client.clone());
        Ok(client)
    }

    /// Returns true when a relevant event shows a configuration change.
    async fn check_cluster(&self, key: &ClusterKey, config: &DiscoveryConfig) -> Result<bool> {
        let events = self.restart_events(key, config).await?;
        if events.is_empty() {
            return Ok(false);
        }

        let changed = self.has_configuration_changed(key, config, &events).await;

        let mut processed = self.processed.lock().await;
        for event in events {
            processed.insert(event.id);
        }
        Ok(changed)
    }

    /// Relevant events since the watermark that have not been acted on yet.
    async fn restart_events(
        &self,
        key: &ClusterKey,
        config: &DiscoveryConfig,
    ) -> Result<Vec<RestartEvent>> {
        let now = Utc::now();
        let since = {
            let mut watermarks = self.watermarks.lock().await;
            let default_since = now - to_time_delta(self.lookback);
            let since = watermarks.get(key).copied().unwrap_or(default_since);
            watermarks.insert(key.clone(), now);
            since - to_time_delta(self.overlap)
        };

        debug!("Querying restart events for {} since {}", key, format_timestamp(since));
        let api = self.api_client(config).await?;
        let query = event_query(&key.cluster, Some(since));
        let Some(result) = api.read_events(None, &query, 0).await? else {
            return Ok(Vec::new());
        };

        let processed = self.processed.lock().await;
        let events = result
            .entries()
            .iter()
            .filter_map(|event| self.filter.classify(event))
            .filter(|event| !processed.contains(&event.id))
            .collect::<Vec<_>>();

        for event in &events {
            info!(
                "Service {} ({}) in cluster {}: {:?} event {}",
                event.service, event.service_type, key.cluster, event.kind, event.id
            );
        }
        Ok(events)
    }

    async fn has_configuration_changed(
        &self,
        key: &ClusterKey,
        config: &DiscoveryConfig,
        events: &[RestartEvent],
    ) -> bool {
        let recorded = self
            .state
            .cache
            .get_service_configurations(&key.address, &key.cluster)
            .await;
        let mut analyzed = HashSet::new();

        for event in events {
            match event.kind {
                EventKind::RoleCreated | EventKind::RoleDeleted => {
                    info!(
                        "{} role {:?} on {:?} changed the topology of {}",
                        event.service_type, event.role_type, event.hosts, key
                    );
                    return true;
                }
                EventKind::Activation => {}
            }

            if !analyzed.insert(event.service_type.as_str()) {
                continue;
            }

            let Some(previous) = recorded.get(&event.service_type) else {
                info!(
                    "The {} service in {} has no recorded configuration, so it may have been enabled for proxying",
                    event.service_type, key
                );
                return true;
            };

            match self.current_configuration(config, &key.cluster, &event.service).await {
                Ok(current) => {
                    if let Some(change) = detect_change(previous, &current) {
                        info!("Configuration of {} in {} changed: {}", event.service, key, change);
                        return true;
                    }
                }
                Err(e) => error!(
                    "Error analyzing current {} configuration for changes: {}",
                    event.service, e
                ),
            }
        }

        false
    }

    async fn current_configuration(
        &self,
        config: &DiscoveryConfig,
        cluster: &str,
        service: &str,
    ) -> Result<ServiceConfigModel> {
        let api = self.api_client(config).await?;
        let service_config = api
            .read_service_config(cluster, service, DataView::Full)
            .await?
            .ok_or_else(|| {
                DiscoveryError::InvalidResponse(format!("no configuration returned for {}", service))
            })?;
        let role_configs = self.collector.build(api).collect(cluster, service).await?;
        if role_configs.is_empty() {
            warn!("No role configurations returned for {}", service);
        }
        Ok(ServiceConfigModel::from_api(&service_config, &role_configs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_processed_events_expire() {
        let mut processed = ProcessedEvents::new(MAX_PROCESSED_EVENTS);
        processed.insert("a".into());
        tokio::time::advance(Duration::from_secs(100)).await;
        processed.insert("b".into());

        processed.purge(Duration::from_secs(180));
        assert!(processed.contains("a"));

        tokio::time::advance(Duration::from_secs(90)).await;
        processed.purge(Duration::from_secs(180));
        assert!(!processed.contains("a"));
        assert!(processed.contains("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_processed_events_are_bounded() {
        let mut processed = ProcessedEvents::new(MAX_PROCESSED_EVENTS);
        for i in 0..MAX_PROCESSED_EVENTS {
            processed.insert(format!("ev-{}", i));
            tokio::time::advance(Duration::from_millis(1)).await;
        }
        processed.insert("newest".into());

        assert_eq!(processed.seen.len(), MAX_PROCESSED_EVENTS);
        assert!(!processed.contains("ev-0"));
        assert!(processed.contains("newest"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recorded_again_event_moves_past_expiry() {
        let mut processed = ProcessedEvents::new(MAX_PROCESSED_EVENTS);
        processed.insert("a".into());
        processed.insert("b".into());
        tokio::time::advance(Duration::from_secs(100)).await;
        processed.insert("a".into());

        tokio::time::advance(Duration::from_secs(90)).await;
        processed.purge(Duration::from_secs(180));
        assert!(processed.contains("a"));
        assert!(!processed.contains("b"));
    }

    #[tokio::test]
    async fn test_zero_capacity_keeps_one_event() {
        let mut processed = ProcessedEvents::new(0);
        processed.insert("a".into());
        processed.insert("b".into());
        assert!(!processed.contains("a"));
        assert!(processed.contains("b"));
    }
}
