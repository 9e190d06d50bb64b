//! Data model of the cluster manager management API.
//!
//! Every collection response wraps its elements in an `items` array that the
//! server may omit entirely, so list types keep `items` optional and expose
//! [`ItemList::entries`] for callers that treat "absent" as "empty".

use serde::{Deserialize, Serialize};

/// Value recorded for a configuration property that has neither an explicit
/// value nor a default.
pub const NULL_VALUE: &str = "null";

/// Event category of audit events, the only category the monitor queries.
pub const AUDIT_EVENT_CATEGORY: &str = "AUDIT_EVENT";

/// Amount of detail requested from the management API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataView {
    Summary,
    Full,
}

impl DataView {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataView::Summary => "summary",
            DataView::Full => "full",
        }
    }
}

/// A collection response: `{"items": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemList<T> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<T>>,
}

impl<T> Default for ItemList<T> {
    fn default() -> Self {
        ItemList { items: None }
    }
}

impl<T> ItemList<T> {
    pub fn new(items: Vec<T>) -> Self {
        ItemList { items: Some(items) }
    }

    /// The listed elements, or an empty slice when `items` was absent.
    pub fn entries(&self) -> &[T] {
        self.items.as_deref().unwrap_or(&[])
    }

    pub fn into_entries(self) -> Vec<T> {
        self.items.unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn push(&mut self, item: T) {
        self.items.get_or_insert_with(Vec::new).push(item);
    }
}

impl<T> From<Vec<T>> for ItemList<T> {
    fn from(items: Vec<T>) -> Self {
        ItemList::new(items)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCluster {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_version: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiService {
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl ApiService {
    pub fn new(name: impl Into<String>, service_type: impl Into<String>) -> Self {
        ApiService {
            name: name.into(),
            service_type: service_type.into(),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHostRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRole {
    pub name: String,
    #[serde(rename = "type")]
    pub role_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_ref: Option<ApiHostRef>,
}

impl ApiRole {
    pub fn new(name: impl Into<String>, role_type: impl Into<String>) -> Self {
        ApiRole {
            name: name.into(),
            role_type: role_type.into(),
            host_ref: None,
        }
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.host_ref = Some(ApiHostRef {
            host_id: None,
            hostname: Some(hostname.into()),
        });
        self
    }

    pub fn hostname(&self) -> Option<&str> {
        self.host_ref.as_ref().and_then(|h| h.hostname.as_deref())
    }
}

/// A single configuration property.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl ApiConfig {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        ApiConfig {
            name: name.into(),
            value: Some(value.into()),
            default: None,
        }
    }

    pub fn with_default(name: impl Into<String>, default: impl Into<String>) -> Self {
        ApiConfig {
            name: name.into(),
            value: None,
            default: Some(default.into()),
        }
    }

    /// The explicit value, else the default, else `"null"`. Empty strings
    /// count as absent.
    pub fn normalized_value(&self) -> String {
        non_empty(&self.value)
            .or_else(|| non_empty(&self.default))
            .unwrap_or(NULL_VALUE)
            .to_string()
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

pub type ApiConfigList = ItemList<ApiConfig>;

impl ItemList<ApiConfig> {
    pub fn get(&self, name: &str) -> Option<&ApiConfig> {
        self.entries().iter().find(|c| c.name == name)
    }

    /// Normalized value of the named property, if the property is listed.
    pub fn normalized_value(&self, name: &str) -> Option<String> {
        self.get(name).map(ApiConfig::normalized_value)
    }
}

/// Service-level configuration; shaped like a plain configuration list.
pub type ApiServiceConfig = ApiConfigList;

/// The configuration of one role, as returned by the bulk role-config read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRoleConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_ref: Option<ApiHostRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<ApiConfigList>,
}

impl ApiRoleConfig {
    pub fn new(role: &ApiRole, config: ApiConfigList) -> Self {
        ApiRoleConfig {
            name: role.name.clone(),
            role_type: role.role_type.clone(),
            host_ref: role.host_ref.clone(),
            config: Some(config),
        }
    }

    pub fn role(&self) -> ApiRole {
        ApiRole {
            name: self.name.clone(),
            role_type: self.role_type.clone(),
            host_ref: self.host_ref.clone(),
        }
    }

    pub fn config_or_empty(&self) -> ApiConfigList {
        self.config.clone().unwrap_or_default()
    }
}

pub type ApiClusterList = ItemList<ApiCluster>;
pub type ApiServiceList = ItemList<ApiService>;
pub type ApiRoleList = ItemList<ApiRole>;
pub type ApiRoleConfigList = ItemList<ApiRoleConfig>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiEventAttribute {
    pub name: String,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEvent {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_occurred: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_received: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default)]
    pub attributes: Vec<ApiEventAttribute>,
}

impl ApiEvent {
    pub fn new(id: impl Into<String>, category: impl Into<String>) -> Self {
        ApiEvent {
            id: id.into(),
            category: category.into(),
            ..Default::default()
        }
    }

    pub fn with_time_occurred(mut self, time: impl Into<String>) -> Self {
        self.time_occurred = Some(time.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(attr) => attr.values.push(value.into()),
            None => self.attributes.push(ApiEventAttribute {
                name,
                values: vec![value.into()],
            }),
        }
        self
    }

    /// First value of the named attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attribute_values(name).first().map(String::as_str)
    }

    pub fn attribute_values(&self, name: &str) -> &[String] {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.values.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_audit_event(&self) -> bool {
        self.category == AUDIT_EVENT_CATEGORY
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEventQueryResult {
    #[serde(default)]
    pub total_results: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<ApiEvent>>,
}

impl ApiEventQueryResult {
    pub fn new(items: Vec<ApiEvent>) -> Self {
        ApiEventQueryResult {
            total_results: items.len() as u64,
            items: Some(items),
        }
    }

    pub fn entries(&self) -> &[ApiEvent] {
        self.items.as_deref().unwrap_or(&[])
    }
}
