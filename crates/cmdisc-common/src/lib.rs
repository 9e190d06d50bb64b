//! Cluster Manager Discovery Common Types
//!
//! Shared building blocks for discovering services hosted on clusters that
//! are administered by a cluster manager, and for monitoring those clusters
//! for configuration changes.
//!
//! # Overview
//!
//! - **Errors**: [`DiscoveryError`] and the crate-wide [`Result`] alias
//! - **Management API**: the data model of the remote REST API and the
//!   [`ClusterManagerApi`] contract that every client implements
//! - **Configuration**: connection configs ([`DiscoveryConfig`]) and the
//!   gateway-level runtime settings ([`GatewayConfig`])
//!
//! With the `mock` feature enabled, [`api::mock`] provides an in-memory
//! management API for tests.
//!
//! # Example
//!
//! ```
//! use cmdisc_common::{DiscoveryConfig, DiscoveryError};
//!
//! let config = DiscoveryConfig::new("http://cm-host:7180").with_cluster("Cluster 1");
//! assert_eq!(config.require_cluster().unwrap(), "Cluster 1");
//!
//! let missing = DiscoveryConfig::new("");
//! assert!(matches!(missing.require_address(), Err(DiscoveryError::MissingAddress)));
//! ```

pub mod api;
pub mod config;
pub mod error;

pub use api::{
    ApiClientFactory, ApiCluster, ApiClusterList, ApiConfig, ApiConfigList, ApiEvent,
    ApiEventQueryResult, ApiRole, ApiRoleConfig, ApiRoleConfigList, ApiRoleList, ApiService,
    ApiServiceConfig, ApiServiceList, ClusterManagerApi, CredentialResolver, DataView, ItemList,
    NULL_VALUE,
};
pub use config::{
    ClusterKey, CollectorConfig, DiscoveryConfig, GatewayConfig, HttpClientConfig, MonitorConfig,
};
pub use error::{DiscoveryError, Result};
