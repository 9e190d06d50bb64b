//! In-memory management API used by tests across the workspace.
//!
//! The mock keeps a small model of clusters, services and roles, answers the
//! [`ClusterManagerApi`] reads from it, and records every call so tests can
//! assert on request counts and page offsets.

use super::*;
use crate::error::DiscoveryError;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// The operations of [`ClusterManagerApi`], used to inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiOperation {
    ReadClusters,
    ReadServices,
    ReadServiceConfig,
    ReadRoles,
    ReadRoleConfig,
    ReadRolesConfig,
    ReadEvents,
}

/// A recorded call against the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiCall {
    ReadClusters,
    ReadServices { cluster: String },
    ReadServiceConfig { cluster: String, service: String },
    ReadRoles { cluster: String, service: String },
    ReadRoleConfig { cluster: String, service: String, role: String },
    ReadRolesConfig { cluster: String, service: String, limit: u64, offset: u64 },
    ReadEvents { query: String },
}

impl ApiCall {
    pub fn operation(&self) -> ApiOperation {
        match self {
            ApiCall::ReadClusters => ApiOperation::ReadClusters,
            ApiCall::ReadServices { .. } => ApiOperation::ReadServices,
            ApiCall::ReadServiceConfig { .. } => ApiOperation::ReadServiceConfig,
            ApiCall::ReadRoles { .. } => ApiOperation::ReadRoles,
            ApiCall::ReadRoleConfig { .. } => ApiOperation::ReadRoleConfig,
            ApiCall::ReadRolesConfig { .. } => ApiOperation::ReadRolesConfig,
            ApiCall::ReadEvents { .. } => ApiOperation::ReadEvents,
        }
    }
}

type ServiceKey = (String, String);

#[derive(Default)]
struct MockState {
    clusters: Vec<ApiCluster>,
    services: HashMap<String, Vec<ApiService>>,
    service_configs: HashMap<ServiceKey, ApiServiceConfig>,
    roles: HashMap<ServiceKey, Vec<ApiRole>>,
    role_configs: HashMap<ServiceKey, ApiConfigList>,
    scripted_pages: HashMap<ServiceKey, VecDeque<Option<ApiRoleConfigList>>>,
    events: Vec<ApiEvent>,
    failing: HashSet<ApiOperation>,
    failing_role_configs: HashSet<ServiceKey>,
    calls: Vec<ApiCall>,
}

pub struct MockClusterManager {
    address: String,
    state: Mutex<MockState>,
}

impl MockClusterManager {
    pub fn new(address: impl Into<String>) -> Self {
        MockClusterManager {
            address: address.into(),
            state: Mutex::new(MockState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_cluster(&self, name: impl Into<String>) {
        let name = name.into();
        let mut state = self.state();
        state.services.entry(name.clone()).or_default();
        state.clusters.push(ApiCluster {
            name,
            ..Default::default()
        });
    }

    /// Registers a service and its service-level configuration.
    pub fn add_service(&self, cluster: &str, service: ApiService, config: ApiServiceConfig) {
        let key = (cluster.to_string(), service.name.clone());
        let mut state = self.state();
        state.service_configs.insert(key.clone(), config);
        state.roles.entry(key).or_default();
        state
            .services
            .entry(cluster.to_string())
            .or_default()
            .push(service);
    }

    pub fn set_service_config(&self, cluster: &str, service: &str, config: ApiServiceConfig) {
        self.state()
            .service_configs
            .insert((cluster.to_string(), service.to_string()), config);
    }

    pub fn remove_service_config(&self, cluster: &str, service: &str) {
        self.state()
            .service_configs
            .remove(&(cluster.to_string(), service.to_string()));
    }

    /// Registers a role of a service together with its configuration.
    pub fn add_role(&self, cluster: &str, service: &str, role: ApiRole, config: ApiConfigList) {
        let mut state = self.state();
        state
            .role_configs
            .insert((cluster.to_string(), role.name.clone()), config);
        state
            .roles
            .entry((cluster.to_string(), service.to_string()))
            .or_default()
            .push(role);
    }

    pub fn set_role_config(&self, cluster: &str, role: &str, config: ApiConfigList) {
        self.state()
            .role_configs
            .insert((cluster.to_string(), role.to_string()), config);
    }

    pub fn remove_role_config(&self, cluster: &str, role: &str) {
        self.state()
            .role_configs
            .remove(&(cluster.to_string(), role.to_string()));
    }

    /// Replaces the bulk role-config reads of a service with scripted pages,
    /// returned in order. Once exhausted, further reads return an empty page.
    pub fn script_roles_config_pages(
        &self,
        cluster: &str,
        service: &str,
        pages: Vec<Option<ApiRoleConfigList>>,
    ) {
        self.state()
            .scripted_pages
            .insert((cluster.to_string(), service.to_string()), pages.into());
    }

    /// Queues events for later event queries. A query drains the queued
    /// events of the cluster it filters on (events without a `CLUSTER`
    /// attribute match any query), mimicking a watermark that only moves
    /// forward.
    pub fn push_events(&self, events: impl IntoIterator<Item = ApiEvent>) {
        self.state().events.extend(events);
    }

    pub fn fail(&self, operation: ApiOperation) {
        self.state().failing.insert(operation);
    }

    /// Fails only the configuration reads of one role.
    pub fn fail_role_config(&self, cluster: &str, role: &str) {
        self.state()
            .failing_role_configs
            .insert((cluster.to_string(), role.to_string()));
    }

    pub fn recover(&self, operation: ApiOperation) {
        self.state().failing.remove(&operation);
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, operation: ApiOperation) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| c.operation() == operation)
            .count()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    fn record(&self, call: ApiCall) -> Result<MutexGuard<'_, MockState>> {
        let mut state = self.state();
        let operation = call.operation();
        state.calls.push(call);
        if state.failing.contains(&operation) {
            return Err(DiscoveryError::Api {
                status: 500,
                message: format!("injected failure for {:?}", operation),
            });
        }
        Ok(state)
    }
}

/// The cluster named by an `attributes.cluster=="<name>"` filter term.
fn queried_cluster(query: &str) -> Option<&str> {
    let start = query.find("attributes.cluster==\"")? + "attributes.cluster==\"".len();
    let len = query[start..].find('"')?;
    Some(&query[start..start + len])
}

fn key(a: &str, b: &str) -> ServiceKey {
    (a.to_string(), b.to_string())
}

#[async_trait]
impl ClusterManagerApi for MockClusterManager {
    fn address(&self) -> &str {
        &self.address
    }

    async fn read_clusters(&self, _view: DataView) -> Result<Option<ApiClusterList>> {
        let state = self.record(ApiCall::ReadClusters)?;
        Ok(Some(ItemList::new(state.clusters.clone())))
    }

    async fn read_services(&self, cluster: &str, _view: DataView) -> Result<Option<ApiServiceList>> {
        let state = self.record(ApiCall::ReadServices {
            cluster: cluster.to_string(),
        })?;
        Ok(state.services.get(cluster).cloned().map(ItemList::new))
    }

    async fn read_service_config(
        &self,
        cluster: &str,
        service: &str,
        _view: DataView,
    ) -> Result<Option<ApiServiceConfig>> {
        let state = self.record(ApiCall::ReadServiceConfig {
            cluster: cluster.to_string(),
            service: service.to_string(),
        })?;
        Ok(state.service_configs.get(&key(cluster, service)).cloned())
    }

    async fn read_roles(
        &self,
        cluster: &str,
        service: &str,
        _filter: &str,
        _view: DataView,
    ) -> Result<Option<ApiRoleList>> {
        let state = self.record(ApiCall::ReadRoles {
            cluster: cluster.to_string(),
            service: service.to_string(),
        })?;
        Ok(state.roles.get(&key(cluster, service)).cloned().map(ItemList::new))
    }

    async fn read_role_config(
        &self,
        cluster: &str,
        role: &str,
        service: &str,
        _view: DataView,
    ) -> Result<Option<ApiConfigList>> {
        let state = self.record(ApiCall::ReadRoleConfig {
            cluster: cluster.to_string(),
            service: service.to_string(),
            role: role.to_string(),
        })?;
        if state.failing_role_configs.contains(&key(cluster, role)) {
            return Err(DiscoveryError::Api {
                status: 500,
                message: format!("injected failure reading configuration of role {}", role),
            });
        }
        Ok(state.role_configs.get(&key(cluster, role)).cloned())
    }

    async fn read_roles_config(
        &self,
        cluster: &str,
        service: &str,
        limit: u64,
        offset: u64,
        _view: DataView,
    ) -> Result<Option<ApiRoleConfigList>> {
        let mut state = self.record(ApiCall::ReadRolesConfig {
            cluster: cluster.to_string(),
            service: service.to_string(),
            limit,
            offset,
        })?;

        if let Some(pages) = state.scripted_pages.get_mut(&key(cluster, service)) {
            return Ok(pages.pop_front().unwrap_or_else(|| Some(ItemList::new(Vec::new()))));
        }

        let Some(roles) = state.roles.get(&key(cluster, service)) else {
            return Ok(None);
        };
        let page = roles
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|role| {
                let config = state
                    .role_configs
                    .get(&key(cluster, &role.name))
                    .cloned()
                    .unwrap_or_default();
                ApiRoleConfig::new(role, config)
            })
            .collect();
        Ok(Some(ItemList::new(page)))
    }

    async fn read_events(
        &self,
        _max_results: Option<u64>,
        query: &str,
        _offset: u64,
    ) -> Result<Option<ApiEventQueryResult>> {
        let mut state = self.record(ApiCall::ReadEvents {
            query: query.to_string(),
        })?;
        let cluster = queried_cluster(query);
        let (matching, rest): (Vec<_>, Vec<_>) =
            std::mem::take(&mut state.events)
                .into_iter()
                .partition(|event| match (cluster, event.attribute("CLUSTER")) {
                    (Some(queried), Some(owner)) => queried == owner,
                    _ => true,
                });
        state.events = rest;
        Ok(Some(ApiEventQueryResult::new(matching)))
    }
}

/// Hands out the same [`MockClusterManager`] for every connection config.
pub struct MockClientFactory {
    client: Arc<MockClusterManager>,
    created: AtomicUsize,
}

impl MockClientFactory {
    pub fn new(client: Arc<MockClusterManager>) -> Self {
        MockClientFactory {
            client,
            created: AtomicUsize::new(0),
        }
    }

    /// Number of clients handed out so far.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ApiClientFactory for MockClientFactory {
    fn create(&self, config: &DiscoveryConfig) -> Result<Arc<dyn ClusterManagerApi>> {
        config.require_address()?;
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(self.client.clone())
    }
}
