//! Gateway-side collaborators of the monitor.

use cmdisc_common::config::ClusterKey;
use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

/// Receives change notifications; called at most once per cluster per cycle.
pub trait ConfigurationChangeListener: Send + Sync {
    fn on_configuration_change(&self, source: &str, cluster: &str);
}

/// Knows which clusters are still referenced by active topology descriptors.
pub trait DescriptorInventory: Send + Sync {
    fn is_referenced(&self, address: &str, cluster: &str) -> bool;
}

/// Reports whether the gateway has finished starting up.
pub trait ReadinessProbe: Send + Sync {
    fn is_ready(&self) -> bool;
}

/// A fixed set of referenced clusters that can be edited at runtime.
#[derive(Debug, Default)]
pub struct StaticDescriptorInventory {
    referenced: RwLock<HashSet<ClusterKey>>,
}

impl StaticDescriptorInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cluster(self, address: impl Into<String>, cluster: impl Into<String>) -> Self {
        self.add(ClusterKey::new(address, cluster));
        self
    }

    pub fn add(&self, key: ClusterKey) {
        self.referenced
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key);
    }

    pub fn remove(&self, address: &str, cluster: &str) {
        self.referenced
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&ClusterKey::new(address, cluster));
    }
}

impl DescriptorInventory for StaticDescriptorInventory {
    fn is_referenced(&self, address: &str, cluster: &str) -> bool {
        self.referenced
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&ClusterKey::new(address, cluster))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_inventory() {
        let inventory = StaticDescriptorInventory::new().with_cluster("http://cm:7180", "c1");
        assert!(inventory.is_referenced("http://cm:7180", "c1"));
        assert!(!inventory.is_referenced("http://cm:7180", "c2"));

        inventory.remove("http://cm:7180", "c1");
        assert!(!inventory.is_referenced("http://cm:7180", "c1"));
    }
}
