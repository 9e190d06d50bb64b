//! Cluster Configuration Monitor
//!
//! Keeps discovered clusters in sync with their cluster manager: after each
//! discovery the monitor records a normalized snapshot of the configuration
//! the discovered endpoints depend on, and a background loop watches the
//! management API's audit events for service restarts. When a restarted
//! service's live configuration differs from the snapshot, registered
//! listeners are told to re-run discovery.
//!
//! # Components
//!
//! - [`snapshot`] - Normalized configuration snapshots and change detection
//! - [`cache`] - In-memory connection configs and snapshots
//! - [`store`] - File persistence, so monitoring resumes after a restart
//! - [`events`] - Audit event query and interpretation
//! - [`poller`] - The reconciliation loop
//! - [`monitor`] - The public lifecycle object
//!
//! # Example
//!
//! ```no_run
//! use cmdisc_monitor::{ClusterConfigMonitor, ConfigurationChangeListener};
//! use cmdisc_common::{ApiClientFactory, GatewayConfig};
//! use cmdisc_discovery::GeneratorRegistry;
//! use std::sync::Arc;
//!
//! struct Rediscover;
//!
//! impl ConfigurationChangeListener for Rediscover {
//!     fn on_configuration_change(&self, source: &str, cluster: &str) {
//!         println!("{} @ {} changed", cluster, source);
//!     }
//! }
//!
//! # async fn example(clients: Arc<dyn ApiClientFactory>) {
//! let registry = Arc::new(GeneratorRegistry::with_builtin());
//! let monitor = ClusterConfigMonitor::new(&GatewayConfig::default(), clients, registry).await;
//! monitor.add_listener(Arc::new(Rediscover)).await;
//! monitor.start();
//! # }
//! ```

pub mod cache;
pub mod events;
pub mod gateway;
pub mod monitor;
pub mod poller;
pub mod snapshot;
pub mod store;

pub use cache::ClusterConfigCache;
pub use events::{event_query, EventFilter, EventKind, RestartEvent};
pub use gateway::{
    ConfigurationChangeListener, DescriptorInventory, ReadinessProbe, StaticDescriptorInventory,
};
pub use monitor::{ClusterConfigMonitor, MonitorBuilder};
pub use poller::PollingAnalyzer;
pub use snapshot::{detect_change, has_changed, ConfigChange, ServiceConfigModel};
pub use store::{
    DiscoveryConfigFileStore, DiscoveryConfigStore, ServiceConfigFileStore, ServiceConfigRecord,
    ServiceConfigStore,
};
