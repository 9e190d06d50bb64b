//! Cluster Manager Service Discovery
//!
//! Builds a gateway-oriented model of the services running on a cluster by
//! walking the cluster manager's management API.
//!
//! # Components
//!
//! - [`cluster`] - The discovered model ([`Cluster`], [`ServiceEntry`])
//! - [`collector`] - Strategies for fetching every role's configuration
//! - [`generator`] - Pluggable mapping from roles to service entries
//! - [`discovery`] - The orchestrator tying the above together
//!
//! # Example
//!
//! ```no_run
//! use cmdisc_discovery::{ClusterDiscovery, GeneratorRegistry};
//! use cmdisc_common::{ApiClientFactory, CollectorConfig, DiscoveryConfig};
//! use std::sync::Arc;
//!
//! # async fn example(clients: Arc<dyn ApiClientFactory>) -> cmdisc_common::Result<()> {
//! let discovery = ClusterDiscovery::new(
//!     Arc::new(GeneratorRegistry::with_builtin()),
//!     clients,
//!     &CollectorConfig::default(),
//! );
//!
//! let config = DiscoveryConfig::new("http://cm-host:7180");
//! if let Some(cluster) = discovery.discover(&config, "Cluster 1").await? {
//!     for name in cluster.service_names() {
//!         println!("{}", name);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod cluster;
pub mod collector;
pub mod discovery;
pub mod generator;

pub use cluster::{
    Cluster, EntryKind, ServiceEntry, DISCOVERY_SERVICE_DISPLAY_NAME, DISCOVERY_SERVICE_NAME,
    QUALIFYING_PARAM_PREFIX,
};
pub use collector::{
    ByRoleCollector, ByServiceCollector, CollectionStrategy, CollectorBuilder,
    RoleConfigCollector, TypeNameFilter,
};
pub use discovery::ClusterDiscovery;
pub use generator::{
    GeneratorContext, GeneratorRegistry, HandleResult, ManagementPlaneGenerator,
    ServiceModelGenerator,
};
