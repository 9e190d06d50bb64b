//! # Cluster Manager Discovery CLI
//!
//! Support code for the `cmdisc` binary:
//!
//! - **discover**: discovers one or every cluster at a management endpoint
//!   and prints the result as JSON, or only the URLs of one service
//! - **monitor**: discovers a cluster, then watches it for configuration
//!   changes and re-runs discovery whenever one is detected
//!
//! The binary wires the HTTP client factory, the discovery engine and the
//! monitor together; this crate holds the pieces worth testing on their own.

use anyhow::{anyhow, Result};
use cmdisc_common::{ClusterKey, GatewayConfig};
use cmdisc_monitor::ConfigurationChangeListener;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Loads the gateway configuration file, or the defaults without one.
pub fn load_gateway_config(path: Option<&str>) -> Result<GatewayConfig> {
    match path {
        Some(path) => GatewayConfig::load(path)
            .map_err(|e| anyhow!("Invalid configuration file {}: {}", path, e)),
        None => Ok(GatewayConfig::default()),
    }
}

/// Parses `name=value` pairs into a parameter map.
///
/// # Errors
///
/// Returns an error for a pair without `=` or with an empty name.
pub fn parse_params(pairs: &[String]) -> Result<HashMap<String, String>> {
    let mut params = HashMap::new();
    for pair in pairs {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid parameter '{}': expected name=value", pair))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(anyhow!("Invalid parameter '{}': empty name", pair));
        }
        params.insert(name.to_string(), value.trim().to_string());
    }
    Ok(params)
}

/// Forwards change notifications to a channel so an async task can act on
/// them outside the monitor's loop.
pub struct ChannelListener {
    sender: mpsc::UnboundedSender<ClusterKey>,
}

impl ChannelListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ClusterKey>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl ConfigurationChangeListener for ChannelListener {
    fn on_configuration_change(&self, source: &str, cluster: &str) {
        if self.sender.send(ClusterKey::new(source, cluster)).is_err() {
            tracing::warn!(
                "Dropped configuration change notification for {} @ {}: receiver closed",
                cluster,
                source
            );
        }
    }
}
