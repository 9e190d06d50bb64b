//! Normalized configuration snapshots and the change detector.

use cmdisc_common::api::{ApiRoleConfigList, ApiServiceConfig, NULL_VALUE};
use cmdisc_discovery::Cluster;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Flattened configuration of one service type: the service-level
/// properties plus, per role type, the role-level properties.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfigModel {
    #[serde(default)]
    pub service_properties: BTreeMap<String, String>,
    #[serde(default)]
    pub role_properties: BTreeMap<String, BTreeMap<String, String>>,
}

impl ServiceConfigModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_service_property(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.service_properties.insert(name.into(), value.into());
    }

    pub fn add_role_property(
        &mut self,
        role_type: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.role_properties
            .entry(role_type.into())
            .or_default()
            .insert(name.into(), value.into());
    }

    /// Builds the live configuration of a service from management API reads.
    ///
    /// Every listed property is recorded with its normalized value. Roles of
    /// the same type share one property map; later roles overwrite earlier
    /// ones.
    pub fn from_api(service_config: &ApiServiceConfig, role_configs: &ApiRoleConfigList) -> Self {
        let mut model = Self::new();
        for config in service_config.entries() {
            model.add_service_property(&config.name, config.normalized_value());
        }
        for role_config in role_configs.entries() {
            let properties = model
                .role_properties
                .entry(role_config.role_type.clone())
                .or_default();
            if let Some(config) = &role_config.config {
                for item in config.entries() {
                    properties.insert(item.name.clone(), item.normalized_value());
                }
            }
        }
        model
    }

    /// Merges the properties recorded on every entry of a discovered cluster
    /// into one snapshot per cluster-side service type.
    pub fn from_cluster(cluster: &Cluster) -> HashMap<String, ServiceConfigModel> {
        let mut snapshots: HashMap<String, ServiceConfigModel> = HashMap::new();
        for entry in cluster.entries() {
            let snapshot = snapshots.entry(entry.service_type.clone()).or_default();
            for (name, value) in &entry.service_properties {
                snapshot.add_service_property(name, value);
            }
            for (role_type, properties) in &entry.role_properties {
                for (name, value) in properties {
                    snapshot.add_role_property(role_type, name, value);
                }
            }
        }
        snapshots
    }
}

/// The first difference found between a recorded and a live snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigChange {
    ServiceProperty {
        name: String,
        previous: String,
        current: Option<String>,
    },
    RoleTypeRemoved {
        role_type: String,
    },
    RoleProperty {
        role_type: String,
        name: String,
        previous: String,
        current: Option<String>,
    },
}

impl fmt::Display for ConfigChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigChange::ServiceProperty {
                name,
                previous,
                current,
            } => write!(
                f,
                "service property {} changed from {} to {}",
                name,
                previous,
                current.as_deref().unwrap_or("<absent>")
            ),
            ConfigChange::RoleTypeRemoved { role_type } => {
                write!(f, "role type {} is no longer present", role_type)
            }
            ConfigChange::RoleProperty {
                role_type,
                name,
                previous,
                current,
            } => write!(
                f,
                "{} property {} changed from {} to {}",
                role_type,
                name,
                previous,
                current.as_deref().unwrap_or("<absent>")
            ),
        }
    }
}

/// Compares a recorded snapshot against the live configuration.
///
/// Only properties present in `previous` are compared. Service-level
/// properties are checked first and the first mismatch wins. A recorded
/// role-level property that is absent from `current` counts as a change
/// unless it was recorded as `"null"`.
pub fn detect_change(
    previous: &ServiceConfigModel,
    current: &ServiceConfigModel,
) -> Option<ConfigChange> {
    for (name, value) in &previous.service_properties {
        let current_value = current.service_properties.get(name);
        if current_value != Some(value) {
            return Some(ConfigChange::ServiceProperty {
                name: name.clone(),
                previous: value.clone(),
                current: current_value.cloned(),
            });
        }
    }

    for (role_type, properties) in &previous.role_properties {
        let Some(current_properties) = current.role_properties.get(role_type) else {
            return Some(ConfigChange::RoleTypeRemoved {
                role_type: role_type.clone(),
            });
        };

        for (name, value) in properties {
            let changed = match current_properties.get(name) {
                None => value != NULL_VALUE,
                Some(current_value) => current_value != value,
            };
            if changed {
                return Some(ConfigChange::RoleProperty {
                    role_type: role_type.clone(),
                    name: name.clone(),
                    previous: value.clone(),
                    current: current_properties.get(name).cloned(),
                });
            }
        }
    }

    None
}

pub fn has_changed(previous: &ServiceConfigModel, current: &ServiceConfigModel) -> bool {
    detect_change(previous, current).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmdisc_common::api::{ApiConfig, ApiRole, ApiRoleConfig, ItemList};
    use cmdisc_discovery::{EntryKind, ServiceEntry};

    fn snapshot() -> ServiceConfigModel {
        let mut model = ServiceConfigModel::new();
        model.add_service_property("dfs.replication", "3");
        model.add_role_property("NAMENODE", "dfs.namenode.http-address", "host1:50070");
        model.add_role_property("NAMENODE", "dfs.ha.enabled", NULL_VALUE);
        model
    }

    #[test]
    fn test_identical_snapshots_unchanged() {
        assert!(!has_changed(&snapshot(), &snapshot()));
    }

    #[test]
    fn test_extra_current_properties_are_ignored() {
        let mut current = snapshot();
        current.add_service_property("dfs.blocksize", "128m");
        current.add_role_property("DATANODE", "dfs.datanode.port", "9866");
        assert!(!has_changed(&snapshot(), &current));
    }

    #[test]
    fn test_service_property_change_short_circuits() {
        let mut current = snapshot();
        current.add_service_property("dfs.replication", "2");
        // Would also be a role-level change, but the service level wins.
        current.role_properties.clear();

        assert_eq!(
            detect_change(&snapshot(), &current),
            Some(ConfigChange::ServiceProperty {
                name: "dfs.replication".into(),
                previous: "3".into(),
                current: Some("2".into()),
            })
        );
    }

    #[test]
    fn test_missing_service_property_is_change() {
        let mut current = snapshot();
        current.service_properties.clear();
        assert!(matches!(
            detect_change(&snapshot(), &current),
            Some(ConfigChange::ServiceProperty { current: None, .. })
        ));
    }

    #[test]
    fn test_removed_role_type_is_change() {
        let mut current = snapshot();
        current.role_properties.remove("NAMENODE");
        assert_eq!(
            detect_change(&snapshot(), &current),
            Some(ConfigChange::RoleTypeRemoved {
                role_type: "NAMENODE".into()
            })
        );
    }

    #[test]
    fn test_absent_null_role_property_is_unchanged() {
        let mut current = snapshot();
        current
            .role_properties
            .get_mut("NAMENODE")
            .unwrap()
            .remove("dfs.ha.enabled");
        assert!(!has_changed(&snapshot(), &current));
    }

    #[test]
    fn test_absent_role_property_is_change() {
        let mut current = snapshot();
        current
            .role_properties
            .get_mut("NAMENODE")
            .unwrap()
            .remove("dfs.namenode.http-address");
        assert!(has_changed(&snapshot(), &current));
    }

    #[test]
    fn test_role_property_value_change() {
        let mut current = snapshot();
        current.add_role_property("NAMENODE", "dfs.namenode.http-address", "host2:50070");
        let change = detect_change(&snapshot(), &current).unwrap();
        assert_eq!(
            change.to_string(),
            "NAMENODE property dfs.namenode.http-address changed from host1:50070 to host2:50070"
        );
    }

    #[test]
    fn test_from_api_normalizes_values() {
        let service_config = ItemList::new(vec![
            ApiConfig::new("dfs.replication", "3"),
            ApiConfig::with_default("dfs.blocksize", "128m"),
            ApiConfig {
                name: "dfs.unset".into(),
                value: None,
                default: None,
            },
        ]);
        let role_configs = ItemList::new(vec![
            ApiRoleConfig::new(
                &ApiRole::new("nn-1", "NAMENODE"),
                ItemList::new(vec![ApiConfig::new("port", "1")]),
            ),
            ApiRoleConfig::new(
                &ApiRole::new("nn-2", "NAMENODE"),
                ItemList::new(vec![ApiConfig::new("port", "2")]),
            ),
        ]);

        let model = ServiceConfigModel::from_api(&service_config, &role_configs);
        assert_eq!(model.service_properties["dfs.replication"], "3");
        assert_eq!(model.service_properties["dfs.blocksize"], "128m");
        assert_eq!(model.service_properties["dfs.unset"], NULL_VALUE);
        assert_eq!(model.role_properties["NAMENODE"]["port"], "2");
    }

    #[test]
    fn test_from_cluster_merges_by_service_type() {
        let mut cluster = Cluster::new("c");
        cluster.add_service_entry(
            ServiceEntry::new(EntryKind::Ui, "WEBHDFS", "HDFS", "NAMENODE", "http://nn:50070")
                .with_service_property("dfs.replication", "3")
                .with_role_property("NAMENODE", "dfs.http.port", "50070"),
        );
        cluster.add_service_entry(
            ServiceEntry::new(EntryKind::Ui, "HDFSUI", "HDFS", "NAMENODE", "http://nn:50070")
                .with_role_property("NAMENODE", "dfs.https.port", "50470"),
        );
        cluster.add_service_entry(ServiceEntry::new(
            EntryKind::Api,
            "HIVE",
            "HIVE",
            "HIVESERVER2",
            "http://hs2:10001",
        ));

        let snapshots = ServiceConfigModel::from_cluster(&cluster);
        assert_eq!(snapshots.len(), 2);
        let hdfs = &snapshots["HDFS"];
        assert_eq!(hdfs.service_properties.len(), 1);
        assert_eq!(hdfs.role_properties["NAMENODE"].len(), 2);
        assert!(snapshots["HIVE"].service_properties.is_empty());
    }

    #[test]
    fn test_snapshot_json_shape() {
        let json = serde_json::to_value(snapshot()).unwrap();
        assert_eq!(json["serviceProperties"]["dfs.replication"], "3");
        assert_eq!(
            json["roleProperties"]["NAMENODE"]["dfs.namenode.http-address"],
            "host1:50070"
        );
    }
}
