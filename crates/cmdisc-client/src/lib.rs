//! Cluster Manager HTTP Client
//!
//! HTTP/JSON implementation of [`ClusterManagerApi`] for the management REST
//! API of a cluster manager, plus the factory and credential resolvers used
//! to build clients from connection configs.
//!
//! # Example
//!
//! ```no_run
//! use cmdisc_client::HttpApiClient;
//! use cmdisc_common::{ClusterManagerApi, DataView, HttpClientConfig};
//!
//! # async fn example() -> cmdisc_common::Result<()> {
//! let client = HttpApiClient::new("http://cm-host:7180", &HttpClientConfig::default())?
//!     .with_basic_auth("admin", "admin");
//! let clusters = client.read_clusters(DataView::Summary).await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`ClusterManagerApi`]: cmdisc_common::ClusterManagerApi

pub mod client;
pub mod credentials;
pub mod factory;

pub use client::HttpApiClient;
pub use credentials::{EnvCredentialResolver, StaticCredentialResolver};
pub use factory::HttpClientFactory;
