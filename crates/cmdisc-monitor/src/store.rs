//! File-backed persistence of connection configs and snapshots.
//!
//! Each (address, cluster) pair gets one file per store, named after the
//! address and cluster with unsafe characters percent-encoded. Writes go
//! through a temporary sibling file that is renamed into place.

use crate::snapshot::ServiceConfigModel;
use cmdisc_common::config::DiscoveryConfig;
use cmdisc_common::error::{DiscoveryError, Result};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DISCOVERY_CONFIG_EXTENSION: &str = "conf";
pub const SERVICE_CONFIG_EXTENSION: &str = "ver";

/// Characters kept as-is in file names. `-` separates address and cluster,
/// so it is encoded inside them.
const FILE_NAME_UNSAFE: &AsciiSet = &NON_ALPHANUMERIC.remove(b'.').remove(b'_');

const PROP_SOURCE: &str = "cluster.source";
const PROP_NAME: &str = "cluster.name";
const PROP_USER: &str = "cluster.user";
const PROP_PASSWORD_ALIAS: &str = "cluster.pwd.alias";

/// Persisted snapshots of one cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfigRecord {
    pub cluster_name: String,
    pub discovery_address: String,
    #[serde(default)]
    pub configs: BTreeMap<String, ServiceConfigModel>,
}

pub trait DiscoveryConfigStore: Send + Sync {
    /// Persists a connection config; its `cluster` must be set.
    fn store(&self, config: &DiscoveryConfig) -> Result<()>;

    /// Every readable persisted config. Unreadable records are skipped.
    fn load_all(&self) -> Vec<DiscoveryConfig>;

    fn remove(&self, address: &str, cluster: &str) -> Result<()>;
}

pub trait ServiceConfigStore: Send + Sync {
    fn store(&self, record: &ServiceConfigRecord) -> Result<()>;

    /// Every readable persisted record. Unreadable records are skipped.
    fn load_all(&self) -> Vec<ServiceConfigRecord>;

    fn remove(&self, address: &str, cluster: &str) -> Result<()>;
}

/// A directory of one-file-per-cluster records sharing an extension.
#[derive(Debug, Clone)]
struct RecordDir {
    dir: PathBuf,
    extension: &'static str,
}

impl RecordDir {
    fn new(dir: PathBuf, extension: &'static str) -> Self {
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!("Failed to create persistence directory {}: {}", dir.display(), e);
        }
        Self { dir, extension }
    }

    fn file_for(&self, address: &str, cluster: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", persistence_file_stem(address, cluster), self.extension))
    }

    fn write(&self, address: &str, cluster: &str, contents: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.file_for(address, cluster);
        write_atomically(&path, contents)?;
        debug!("Persisted {}", path.display());
        Ok(())
    }

    fn remove(&self, address: &str, cluster: &str) -> Result<()> {
        let path = self.file_for(address, cluster);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Paths of every record, sorted.
    fn records(&self) -> Vec<PathBuf> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to list {}: {}", self.dir.display(), e);
                return Vec::new();
            }
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.is_file()
                    && path.extension().and_then(|e| e.to_str()) == Some(self.extension)
            })
            .collect();
        paths.sort();
        paths
    }
}

/// `<address>-<cluster>` with every character outside `[A-Za-z0-9._]`
/// percent-encoded in both parts, so distinct pairs never share a file.
pub fn persistence_file_stem(address: &str, cluster: &str) -> String {
    format!(
        "{}-{}",
        utf8_percent_encode(address, FILE_NAME_UNSAFE),
        utf8_percent_encode(cluster, FILE_NAME_UNSAFE)
    )
}

fn write_atomically(path: &Path, contents: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// Connection configs as `key=value` files with the `.conf` extension.
#[derive(Debug, Clone)]
pub struct DiscoveryConfigFileStore {
    records: RecordDir,
}

impl DiscoveryConfigFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            records: RecordDir::new(dir.into(), DISCOVERY_CONFIG_EXTENSION),
        }
    }

    pub fn file_for(&self, address: &str, cluster: &str) -> PathBuf {
        self.records.file_for(address, cluster)
    }
}

impl DiscoveryConfigStore for DiscoveryConfigFileStore {
    fn store(&self, config: &DiscoveryConfig) -> Result<()> {
        let cluster = config.require_cluster()?;
        self.records
            .write(&config.address, cluster, encode_properties(config).as_bytes())
    }

    fn load_all(&self) -> Vec<DiscoveryConfig> {
        let mut configs = Vec::new();
        for path in self.records.records() {
            match fs::read_to_string(&path)
                .map_err(DiscoveryError::from)
                .and_then(|contents| decode_properties(&contents))
            {
                Ok(config) => configs.push(config),
                Err(e) => warn!("Skipping unreadable discovery config {}: {}", path.display(), e),
            }
        }
        configs
    }

    fn remove(&self, address: &str, cluster: &str) -> Result<()> {
        self.records.remove(address, cluster)
    }
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn encode_properties(config: &DiscoveryConfig) -> String {
    let mut out = String::from("# Cluster manager discovery configuration\n");
    let mut put = |key: &str, value: &str| {
        out.push_str(key);
        out.push('=');
        out.push_str(&escape(value));
        out.push('\n');
    };
    put(PROP_SOURCE, &config.address);
    put(PROP_NAME, config.cluster.as_deref().unwrap_or_default());
    if let Some(user) = &config.user {
        put(PROP_USER, user);
    }
    if let Some(alias) = &config.password_alias {
        put(PROP_PASSWORD_ALIAS, alias);
    }
    out
}

fn decode_properties(contents: &str) -> Result<DiscoveryConfig> {
    let mut properties = BTreeMap::new();
    for line in contents.lines() {
        let line = line.trim_start();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            properties.insert(key.trim().to_string(), unescape(value.trim_start()));
        }
    }

    let address = properties
        .remove(PROP_SOURCE)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| DiscoveryError::Persistence(format!("missing {}", PROP_SOURCE)))?;
    let cluster = properties
        .remove(PROP_NAME)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| DiscoveryError::Persistence(format!("missing {}", PROP_NAME)))?;

    Ok(DiscoveryConfig {
        address,
        cluster: Some(cluster),
        user: properties.remove(PROP_USER),
        password_alias: properties.remove(PROP_PASSWORD_ALIAS),
    })
}

/// Snapshot records as JSON files with the `.ver` extension.
#[derive(Debug, Clone)]
pub struct ServiceConfigFileStore {
    records: RecordDir,
}

impl ServiceConfigFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            records: RecordDir::new(dir.into(), SERVICE_CONFIG_EXTENSION),
        }
    }

    pub fn file_for(&self, address: &str, cluster: &str) -> PathBuf {
        self.records.file_for(address, cluster)
    }
}

impl ServiceConfigStore for ServiceConfigFileStore {
    fn store(&self, record: &ServiceConfigRecord) -> Result<()> {
        let contents = serde_json::to_vec_pretty(record)?;
        self.records
            .write(&record.discovery_address, &record.cluster_name, &contents)
    }

    fn load_all(&self) -> Vec<ServiceConfigRecord> {
        let mut records = Vec::new();
        for path in self.records.records() {
            let parsed = fs::read(&path)
                .map_err(DiscoveryError::from)
                .and_then(|bytes| Ok(serde_json::from_slice::<ServiceConfigRecord>(&bytes)?));
            match parsed {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unreadable service configuration {}: {}", path.display(), e),
            }
        }
        records
    }

    fn remove(&self, address: &str, cluster: &str) -> Result<()> {
        self.records.remove(address, cluster)
    }
}
