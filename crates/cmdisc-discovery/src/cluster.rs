use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Prefix of descriptor parameters that select among the entries of a service.
pub const QUALIFYING_PARAM_PREFIX: &str = "discovery-";

/// Qualifying parameter carrying the cluster-side service name.
pub const DISCOVERY_SERVICE_NAME: &str = "discovery-service-name";

/// Qualifying parameter carrying the cluster-side service display name.
pub const DISCOVERY_SERVICE_DISPLAY_NAME: &str = "discovery-service-display-name";

/// What a discovered endpoint serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    Api,
    Ui,
    ApiAndUi,
    Unknown,
}

/// One externally-addressable endpoint produced by a generator.
///
/// Besides the URL, an entry records every configuration property the
/// generator read while producing it, so the monitor can later tell whether
/// a changed configuration affects the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEntry {
    pub kind: EntryKind,
    /// Gateway-facing service name (e.g. `WEBHDFS`)
    pub service: String,
    /// Cluster-side service type (e.g. `HDFS`)
    pub service_type: String,
    /// Cluster-side role type (e.g. `NAMENODE`)
    pub role_type: String,
    pub url: String,
    pub qualifying_params: BTreeMap<String, String>,
    pub service_properties: BTreeMap<String, String>,
    /// role type -> property name -> normalized value
    pub role_properties: BTreeMap<String, BTreeMap<String, String>>,
}

impl ServiceEntry {
    pub fn new(
        kind: EntryKind,
        service: impl Into<String>,
        service_type: impl Into<String>,
        role_type: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        ServiceEntry {
            kind,
            service: service.into(),
            service_type: service_type.into(),
            role_type: role_type.into(),
            url: url.into(),
            qualifying_params: BTreeMap::new(),
            service_properties: BTreeMap::new(),
            role_properties: BTreeMap::new(),
        }
    }

    pub fn with_qualifying_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.qualifying_params.insert(name.into(), value.into());
        self
    }

    pub fn with_service_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_service_property(name, value);
        self
    }

    pub fn with_role_property(
        mut self,
        role_type: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.add_role_property(role_type, name, value);
        self
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

    /// True when every qualifying parameter matches this entry's parameter
    /// of the same name.
    fn qualifies(&self, qualifying: &[(&str, &str)]) -> bool {
        qualifying
            .iter()
            .all(|(name, value)| self.qualifying_params.get(*name).map(String::as_str) == Some(*value))
    }
}

/// The discovered view of one cluster: service name -> endpoints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    services: HashMap<String, HashSet<ServiceEntry>>,
}

impl Cluster {
    pub fn new(name: impl Into<String>) -> Self {
        Cluster {
            name: name.into(),
            services: HashMap::new(),
        }
    }

    /// Adds an entry under its service name. Structurally equal entries are
    /// stored once.
    pub fn add_service_entry(&mut self, entry: ServiceEntry) {
        self.services
            .entry(entry.service.clone())
            .or_default()
            .insert(entry);
    }

    pub fn services(&self) -> &HashMap<String, HashSet<ServiceEntry>> {
        &self.services
    }

    pub fn service_entries(&self, service: &str) -> Option<&HashSet<ServiceEntry>> {
        self.services.get(service)
    }

    /// Gateway-facing service names, sorted.
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.services.keys().cloned().collect();
        names.sort();
        names
    }

    /// Every entry of every service.
    pub fn entries(&self) -> impl Iterator<Item = &ServiceEntry> {
        self.services.values().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// URLs of the entries of `service` that satisfy the qualifying
    /// parameters in `params`.
    ///
    /// Only parameters prefixed with `discovery-` are considered; each must
    /// equal the entry's qualifying parameter of the same name. The result
    /// is sorted and free of duplicates.
    pub fn service_urls(&self, service: &str, params: &HashMap<String, String>) -> Vec<String> {
        let qualifying: Vec<(&str, &str)> = params
            .iter()
            .filter(|(name, _)| name.starts_with(QUALIFYING_PARAM_PREFIX))
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();

        let mut urls: Vec<String> = self
            .services
            .get(service)
            .into_iter()
            .flatten()
            .filter(|entry| entry.qualifies(&qualifying))
            .map(|entry| entry.url.clone())
            .collect();
        urls.sort();
        urls.dedup();
        urls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hive_entry(name: &str, url: &str) -> ServiceEntry {
        ServiceEntry::new(EntryKind::Api, "HIVE", "HIVE", "HIVESERVER2", url)
            .with_qualifying_param(DISCOVERY_SERVICE_NAME, name)
            .with_qualifying_param(DISCOVERY_SERVICE_DISPLAY_NAME, format!("{} display", name))
    }

    fn two_hive_cluster() -> Cluster {
        let mut cluster = Cluster::new("Cluster 1");
        cluster.add_service_entry(hive_entry("HIVE-1", "http://host1:10001/cliservice"));
        cluster.add_service_entry(hive_entry("HIVE-2", "http://host2:10001/cliservice"));
        cluster
    }

    #[test]
    fn test_duplicate_entries_are_stored_once() {
        let mut cluster = Cluster::new("c");
        cluster.add_service_entry(hive_entry("HIVE-1", "http://host1"));
        cluster.add_service_entry(hive_entry("HIVE-1", "http://host1"));
        assert_eq!(cluster.service_entries("HIVE").unwrap().len(), 1);
    }

    #[test]
    fn test_entries_with_different_properties_are_distinct() {
        let mut cluster = Cluster::new("c");
        cluster.add_service_entry(hive_entry("HIVE-1", "http://host1"));
        cluster.add_service_entry(
            hive_entry("HIVE-1", "http://host1").with_service_property("hive.port", "10001"),
        );
        assert_eq!(cluster.service_entries("HIVE").unwrap().len(), 2);
        assert_eq!(cluster.service_urls("HIVE", &HashMap::new()), vec!["http://host1"]);
    }

    #[test]
    fn test_service_urls_without_params() {
        let cluster = two_hive_cluster();
        assert_eq!(
            cluster.service_urls("HIVE", &HashMap::new()),
            vec!["http://host1:10001/cliservice", "http://host2:10001/cliservice"]
        );
        assert!(cluster.service_urls("WEBHDFS", &HashMap::new()).is_empty());
    }

    #[test]
    fn test_service_urls_with_qualifying_param() {
        let cluster = two_hive_cluster();
        let params = HashMap::from([(DISCOVERY_SERVICE_NAME.to_string(), "HIVE-2".to_string())]);
        assert_eq!(
            cluster.service_urls("HIVE", &params),
            vec!["http://host2:10001/cliservice"]
        );
    }

    #[test]
    fn test_service_urls_all_qualifying_params_must_match() {
        let cluster = two_hive_cluster();
        let params = HashMap::from([
            (DISCOVERY_SERVICE_NAME.to_string(), "HIVE-1".to_string()),
            (DISCOVERY_SERVICE_DISPLAY_NAME.to_string(), "HIVE-2 display".to_string()),
        ]);
        assert!(cluster.service_urls("HIVE", &params).is_empty());
    }

    #[test]
    fn test_service_urls_ignores_non_qualifying_params() {
        let cluster = two_hive_cluster();
        let params = HashMap::from([
            ("haEnabled".to_string(), "true".to_string()),
            (DISCOVERY_SERVICE_NAME.to_string(), "HIVE-1".to_string()),
        ]);
        assert_eq!(
            cluster.service_urls("HIVE", &params),
            vec!["http://host1:10001/cliservice"]
        );
    }

    #[test]
    fn test_service_urls_unknown_param_matches_nothing() {
        let cluster = two_hive_cluster();
        let params = HashMap::from([("discovery-nameservice".to_string(), "ns1".to_string())]);
        assert!(cluster.service_urls("HIVE", &params).is_empty());
    }

    #[test]
    fn test_role_properties_grouped_by_role_type() {
        let entry = ServiceEntry::new(EntryKind::Ui, "HDFSUI", "HDFS", "NAMENODE", "http://nn:9870")
            .with_role_property("NAMENODE", "dfs.http.port", "9870")
            .with_role_property("NAMENODE", "dfs.https.port", "9871");
        assert_eq!(entry.role_properties["NAMENODE"].len(), 2);
    }

    #[test]
    fn test_cluster_serializes_entries() {
        let cluster = two_hive_cluster();
        let json = serde_json::to_value(&cluster).unwrap();
        assert_eq!(json["name"], "Cluster 1");
        assert_eq!(json["services"]["HIVE"].as_array().unwrap().len(), 2);
        assert_eq!(json["services"]["HIVE"][0]["kind"], "API");
    }
}
