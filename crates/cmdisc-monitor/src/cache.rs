use crate::snapshot::ServiceConfigModel;
use cmdisc_common::config::{ClusterKey, DiscoveryConfig};
use std::collections::HashMap;
use tokio::sync::RwLock;

type SnapshotsByType = HashMap<String, ServiceConfigModel>;

/// In-memory state of the monitor: connection configs and configuration
/// snapshots, both keyed by management address then cluster name.
///
/// The two maps are guarded by separate locks, so snapshot writes never
/// block connection config lookups.
#[derive(Default)]
pub struct ClusterConfigCache {
    discovery_configs: RwLock<HashMap<String, HashMap<String, DiscoveryConfig>>>,
    snapshots: RwLock<HashMap<String, HashMap<String, SnapshotsByType>>>,
}

impl ClusterConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caches a connection config under its address and `cluster`.
    pub async fn add_discovery_config(&self, cluster: &str, config: DiscoveryConfig) {
        self.discovery_configs
            .write()
            .await
            .entry(config.address.clone())
            .or_default()
            .insert(cluster.to_string(), config);
    }

    pub async fn get_discovery_config(&self, address: &str, cluster: &str) -> Option<DiscoveryConfig> {
        self.discovery_configs
            .read()
            .await
            .get(address)
            .and_then(|clusters| clusters.get(cluster))
            .cloned()
    }

    /// Replaces the snapshots recorded for a cluster.
    pub async fn add_service_configurations(
        &self,
        address: &str,
        cluster: &str,
        snapshots: SnapshotsByType,
    ) {
        self.snapshots
            .write()
            .await
            .entry(address.to_string())
            .or_default()
            .insert(cluster.to_string(), snapshots);
    }

    /// Snapshots recorded for a cluster, keyed by service type. Empty when
    /// nothing has been recorded.
    pub async fn get_service_configurations(&self, address: &str, cluster: &str) -> SnapshotsByType {
        self.snapshots
            .read()
            .await
            .get(address)
            .and_then(|clusters| clusters.get(cluster))
            .cloned()
            .unwrap_or_default()
    }

    pub async fn get_service_configuration(
        &self,
        address: &str,
        cluster: &str,
        service_type: &str,
    ) -> Option<ServiceConfigModel> {
        self.snapshots
            .read()
            .await
            .get(address)
            .and_then(|clusters| clusters.get(cluster))
            .and_then(|snapshots| snapshots.get(service_type))
            .cloned()
    }

    /// Drops a cluster's snapshots. The connection config stays cached.
    pub async fn remove_service_configurations(&self, address: &str, cluster: &str) {
        let mut snapshots = self.snapshots.write().await;
        if let Some(clusters) = snapshots.get_mut(address) {
            clusters.remove(cluster);
            if clusters.is_empty() {
                snapshots.remove(address);
            }
        }
    }

    /// Every cluster with recorded snapshots, sorted.
    pub async fn cluster_keys(&self) -> Vec<ClusterKey> {
        let snapshots = self.snapshots.read().await;
        let mut keys: Vec<ClusterKey> = snapshots
            .iter()
            .flat_map(|(address, clusters)| {
                clusters
                    .keys()
                    .map(move |cluster| ClusterKey::new(address.clone(), cluster.clone()))
            })
            .collect();
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const ADDRESS: &str = "http://cm:7180";

    fn hdfs_snapshot(replication: &str) -> SnapshotsByType {
        let mut model = ServiceConfigModel::new();
        model.add_service_property("dfs.replication", replication);
        HashMap::from([("HDFS".to_string(), model)])
    }

    #[tokio::test]
    async fn test_discovery_config_roundtrip() {
        let cache = ClusterConfigCache::new();
        let config = DiscoveryConfig::new(ADDRESS).with_user("admin");
        cache.add_discovery_config("c1", config.clone()).await;

        assert_eq!(cache.get_discovery_config(ADDRESS, "c1").await, Some(config));
        assert!(cache.get_discovery_config(ADDRESS, "c2").await.is_none());
        assert!(cache.get_discovery_config("http://other", "c1").await.is_none());
    }

    #[tokio::test]
    async fn test_snapshots_replace_previous() {
        let cache = ClusterConfigCache::new();
        cache.add_service_configurations(ADDRESS, "c1", hdfs_snapshot("3")).await;
        cache.add_service_configurations(ADDRESS, "c1", hdfs_snapshot("2")).await;

        let snapshot = cache.get_service_configuration(ADDRESS, "c1", "HDFS").await.unwrap();
        assert_eq!(snapshot.service_properties["dfs.replication"], "2");
        assert!(cache.get_service_configuration(ADDRESS, "c1", "HIVE").await.is_none());
    }

    #[tokio::test]
    async fn test_cluster_keys_follow_snapshots() {
        let cache = ClusterConfigCache::new();
        cache.add_discovery_config("only-config", DiscoveryConfig::new(ADDRESS)).await;
        cache.add_service_configurations(ADDRESS, "c2", hdfs_snapshot("3")).await;
        cache.add_service_configurations(ADDRESS, "c1", hdfs_snapshot("3")).await;

        assert_eq!(
            cache.cluster_keys().await,
            vec![ClusterKey::new(ADDRESS, "c1"), ClusterKey::new(ADDRESS, "c2")]
        );
    }

    #[tokio::test]
    async fn test_remove_keeps_discovery_config() {
        let cache = ClusterConfigCache::new();
        cache.add_discovery_config("c1", DiscoveryConfig::new(ADDRESS)).await;
        cache.add_service_configurations(ADDRESS, "c1", hdfs_snapshot("3")).await;

        cache.remove_service_configurations(ADDRESS, "c1").await;
        assert!(cache.cluster_keys().await.is_empty());
        assert!(cache.get_service_configurations(ADDRESS, "c1").await.is_empty());
        assert!(cache.get_discovery_config(ADDRESS, "c1").await.is_some());

        // Removing an unknown cluster is a no-op.
        cache.remove_service_configurations("http://other", "c9").await;
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let cache = Arc::new(ClusterConfigCache::new());
        let mut tasks = tokio::task::JoinSet::new();

        for i in 0..10 {
            let cache = cache.clone();
            tasks.spawn(async move {
                let cluster = format!("c{}", i);
                cache
                    .add_discovery_config(&cluster, DiscoveryConfig::new(ADDRESS))
                    .await;
                cache
                    .add_service_configurations(ADDRESS, &cluster, hdfs_snapshot("3"))
                    .await;
                cache.get_service_configurations(ADDRESS, &cluster).await.len()
            });
        }

        while let Some(result) = tasks.join_next().await {
            assert_eq!(result.unwrap(), 1);
        }
        assert_eq!(cache.cluster_keys().await.len(), 10);
    }
}
