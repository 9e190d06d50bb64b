//! Interpretation of management API audit events.

use chrono::{DateTime, SecondsFormat, Utc};
use cmdisc_common::api::{ApiEvent, AUDIT_EVENT_CATEGORY};
use cmdisc_common::config::MonitorConfig;
use std::collections::HashSet;

pub const ATTR_CLUSTER: &str = "CLUSTER";
pub const ATTR_SERVICE_TYPE: &str = "SERVICE_TYPE";
pub const ATTR_SERVICE: &str = "SERVICE";
pub const ATTR_ROLE_TYPE: &str = "ROLE_TYPE";
pub const ATTR_HOSTS: &str = "HOSTS";
pub const ATTR_COMMAND: &str = "COMMAND";
pub const ATTR_COMMAND_STATUS: &str = "COMMAND_STATUS";
pub const ATTR_EVENT_CODE: &str = "EVENTCODE";

pub const EV_ROLE_CREATED: &str = "EV_ROLE_CREATED";
pub const EV_ROLE_DELETED: &str = "EV_ROLE_DELETED";

/// Why an event matters to the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A service was started or restarted
    Activation,
    RoleCreated,
    RoleDeleted,
}

/// A relevant audit event, reduced to what change detection needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestartEvent {
    pub id: String,
    pub kind: EventKind,
    pub cluster_name: String,
    pub service_type: String,
    pub service: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub role_type: Option<String>,
    pub hosts: Vec<String>,
}

/// Decides which audit events are relevant.
///
/// Only events of service types some generator is registered for can affect
/// discovered endpoints; all others are irrelevant.
#[derive(Debug, Clone)]
pub struct EventFilter {
    commands: HashSet<String>,
    statuses: HashSet<String>,
    scale_events: bool,
    service_types: HashSet<String>,
}

impl EventFilter {
    pub fn new<I, S>(config: &MonitorConfig, service_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: config.activation_commands.iter().cloned().collect(),
            statuses: config.activation_statuses.iter().cloned().collect(),
            scale_events: config.scale_events,
            service_types: service_types.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the event as a [`RestartEvent`] if it is relevant.
    ///
    /// Activation events need an accepted command together with an accepted
    /// command status. When scale events are enabled, role created/deleted
    /// events are relevant too. Events without a service type, or of a type
    /// no generator handles, never are.
    pub fn classify(&self, event: &ApiEvent) -> Option<RestartEvent> {
        if !event.is_audit_event() {
            return None;
        }
        let service_type = event.attribute(ATTR_SERVICE_TYPE)?;
        if !self.service_types.contains(service_type) {
            return None;
        }

        let is_activation = matches!(
            (event.attribute(ATTR_COMMAND), event.attribute(ATTR_COMMAND_STATUS)),
            (Some(command), Some(status))
                if self.commands.contains(command) && self.statuses.contains(status)
        );
        let kind = if is_activation {
            EventKind::Activation
        } else if self.scale_events {
            match event.attribute(ATTR_EVENT_CODE) {
                Some(EV_ROLE_CREATED) => EventKind::RoleCreated,
                Some(EV_ROLE_DELETED) => EventKind::RoleDeleted,
                _ => return None,
            }
        } else {
            return None;
        };

        Some(RestartEvent {
            id: event.id.clone(),
            kind,
            cluster_name: event.attribute(ATTR_CLUSTER).unwrap_or_default().to_string(),
            service_type: service_type.to_string(),
            service: event.attribute(ATTR_SERVICE).unwrap_or_default().to_string(),
            timestamp: event
                .time_occurred
                .as_deref()
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map(|t| t.with_timezone(&Utc)),
            role_type: event.attribute(ATTR_ROLE_TYPE).map(String::from),
            hosts: event.attribute_values(ATTR_HOSTS).to_vec(),
        })
    }
}

/// ISO-8601 UTC rendering used in event queries, e.g. `2024-01-01T10:00:00Z`.
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Filter expression selecting a cluster's audit events, optionally only
/// those that occurred after `since`.
pub fn event_query(cluster: &str, since: Option<DateTime<Utc>>) -> String {
    let mut query = format!(
        "category=={};attributes.cluster==\"{}\"",
        AUDIT_EVENT_CATEGORY, cluster
    );
    if let Some(since) = since {
        query.push_str(";timeOccurred=gt=");
        query.push_str(&format_timestamp(since));
    }
    query
}
