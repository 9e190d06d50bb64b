//! Connection and runtime configuration.

use crate::error::{DiscoveryError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default page size used by the by-service role configuration collector.
pub const DEFAULT_PAGE_SIZE: u64 = 500;

/// Default management API version segment.
pub const DEFAULT_API_VERSION: &str = "v32";

/// Password alias consulted when a connection config names none.
pub const DEFAULT_PASSWORD_ALIAS: &str = "cm.discovery.password";

/// How to reach one management endpoint and which cluster to discover there.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryConfig {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_alias: Option<String>,
}

impl DiscoveryConfig {
    pub fn new(address: impl Into<String>) -> Self {
        DiscoveryConfig {
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = Some(cluster.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_password_alias(mut self, alias: impl Into<String>) -> Self {
        self.password_alias = Some(alias.into());
        self
    }

    /// Fails with [`DiscoveryError::MissingAddress`] for a blank address.
    pub fn require_address(&self) -> Result<&str> {
        let address = self.address.trim();
        if address.is_empty() {
            return Err(DiscoveryError::MissingAddress);
        }
        Ok(address)
    }

    /// The configured cluster name, or [`DiscoveryError::MissingCluster`].
    pub fn require_cluster(&self) -> Result<&str> {
        match self.cluster.as_deref().map(str::trim) {
            Some(cluster) if !cluster.is_empty() => Ok(cluster),
            _ => Err(DiscoveryError::MissingCluster),
        }
    }

    pub fn password_alias_or_default(&self) -> &str {
        self.password_alias
            .as_deref()
            .filter(|a| !a.is_empty())
            .unwrap_or(DEFAULT_PASSWORD_ALIAS)
    }
}

/// Identifies one monitored cluster: `(management address, cluster name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterKey {
    pub address: String,
    pub cluster: String,
}

impl ClusterKey {
    pub fn new(address: impl Into<String>, cluster: impl Into<String>) -> Self {
        ClusterKey {
            address: address.into(),
            cluster: cluster.into(),
        }
    }
}

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {}", self.cluster, self.address)
    }
}

/// Settings of the role configuration collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectorConfig {
    /// `byRole` or `byService`; anything else falls back to `byRole`.
    pub strategy: String,
    /// Page size of the by-service strategy.
    pub page_size: u64,
    /// Role types whose configuration is never collected (case-insensitive).
    pub excluded_role_types: Vec<String>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            strategy: "byRole".to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            excluded_role_types: Vec::new(),
        }
    }
}

/// Settings of the polling reconciliation loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorConfig {
    pub enabled: bool,
    /// Seconds between reconciliation cycles
    pub polling_interval_secs: u64,
    /// How far back the first event query for a cluster looks
    pub lookback_secs: u64,
    /// Subtracted from every watermark before querying, to absorb clock skew
    pub event_query_overlap_secs: u64,
    /// Command attribute values that mark a service (re)start
    pub activation_commands: Vec<String>,
    /// Command status values accepted alongside an activation command
    pub activation_statuses: Vec<String>,
    /// Treat role created/deleted audit events as changes
    pub scale_events: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            polling_interval_secs: 60,
            lookback_secs: 60 * 60,
            event_query_overlap_secs: 0,
            activation_commands: vec!["Start".to_string(), "Restart".to_string()],
            activation_statuses: vec!["SUCCEEDED".to_string(), "STARTED".to_string()],
            scale_events: false,
        }
    }
}

impl MonitorConfig {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_secs)
    }

    pub fn lookback(&self) -> Duration {
        Duration::from_secs(self.lookback_secs)
    }

    pub fn event_query_overlap(&self) -> Duration {
        Duration::from_secs(self.event_query_overlap_secs)
    }

    /// Processed event ids are forgotten after three polling intervals.
    pub fn processed_event_ttl(&self) -> Duration {
        self.polling_interval() * 3
    }
}

/// Settings of the HTTP management API client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpClientConfig {
    pub api_version: String,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            api_version: DEFAULT_API_VERSION.to_string(),
            connect_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
        }
    }
}

/// Gateway-level configuration file.
///
/// Every field is optional in the JSON form; missing fields take the
/// defaults of the individual config structs.
///
/// ```json
/// {
///   "dataDir": "/var/lib/gateway",
///   "monitor": { "pollingIntervalSecs": 30 },
///   "collector": { "strategy": "byService", "pageSize": 200 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatewayConfig {
    pub data_dir: PathBuf,
    pub monitor: MonitorConfig,
    pub collector: CollectorConfig,
    pub http: HttpClientConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            monitor: MonitorConfig::default(),
            collector: CollectorConfig::default(),
            http: HttpClientConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Reads and validates a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: GatewayConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.collector.page_size == 0 {
            return Err(DiscoveryError::InvalidConfig(
                "collector page size must be greater than zero".to_string(),
            ));
        }
        if self.monitor.polling_interval_secs == 0 {
            return Err(DiscoveryError::InvalidConfig(
                "monitor polling interval must be greater than zero".to_string(),
            ));
        }
        if self.http.api_version.trim().is_empty() {
            return Err(DiscoveryError::InvalidConfig(
                "API version must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Persistence root of the monitor of the given type.
    pub fn monitor_dir(&self, monitor_type: &str) -> PathBuf {
        self.data_dir
            .join("cluster-configuration")
            .join("monitor")
            .join(monitor_type)
    }

    pub fn discovery_store_dir(&self, monitor_type: &str) -> PathBuf {
        self.monitor_dir(monitor_type).join("discovery")
    }

    pub fn service_store_dir(&self, monitor_type: &str) -> PathBuf {
        self.monitor_dir(monitor_type).join("services")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_address() {
        assert!(matches!(
            DiscoveryConfig::new("  ").require_address(),
            Err(DiscoveryError::MissingAddress)
        ));
        assert_eq!(
            DiscoveryConfig::new("http://cm:7180").require_address().unwrap(),
            "http://cm:7180"
        );
    }

    #[test]
    fn test_require_cluster() {
        let config = DiscoveryConfig::new("http://cm:7180");
        assert!(matches!(
            config.require_cluster(),
            Err(DiscoveryError::MissingCluster)
        ));
        assert!(matches!(
            config.clone().with_cluster("").require_cluster(),
            Err(DiscoveryError::MissingCluster)
        ));
        assert_eq!(config.with_cluster("Cluster 1").require_cluster().unwrap(), "Cluster 1");
    }

    #[test]
    fn test_password_alias_default() {
        let config = DiscoveryConfig::new("http://cm:7180");
        assert_eq!(config.password_alias_or_default(), DEFAULT_PASSWORD_ALIAS);
        let config = config.with_password_alias("my.alias");
        assert_eq!(config.password_alias_or_default(), "my.alias");
    }

    #[test]
    fn test_monitor_config_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.polling_interval(), Duration::from_secs(60));
        assert_eq!(config.lookback(), Duration::from_secs(3600));
        assert_eq!(config.event_query_overlap(), Duration::ZERO);
        assert_eq!(config.processed_event_ttl(), Duration::from_secs(180));
        assert!(!config.scale_events);
    }

    #[test]
    fn test_gateway_config_partial_json() {
        let config: GatewayConfig = serde_json::from_str(
            r#"{"dataDir": "/tmp/gw", "collector": {"strategy": "byService", "pageSize": 10}}"#,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/gw"));
        assert_eq!(config.collector.strategy, "byService");
        assert_eq!(config.collector.page_size, 10);
        assert_eq!(config.monitor, MonitorConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_gateway_config_validation() {
        let mut config = GatewayConfig::default();
        config.collector.page_size = 0;
        assert!(config.validate().unwrap_err().is_configuration_error());

        let mut config = GatewayConfig::default();
        config.monitor.polling_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_store_dirs() {
        let config = GatewayConfig {
            data_dir: PathBuf::from("/data"),
            ..Default::default()
        };
        assert_eq!(
            config.discovery_store_dir("CM"),
            PathBuf::from("/data/cluster-configuration/monitor/CM/discovery")
        );
        assert_eq!(
            config.service_store_dir("CM"),
            PathBuf::from("/data/cluster-configuration/monitor/CM/services")
        );
    }

    #[test]
    fn test_cluster_key_display() {
        let key = ClusterKey::new("http://cm:7180", "Cluster 1");
        assert_eq!(key.to_string(), "Cluster 1 @ http://cm:7180");
    }
}
