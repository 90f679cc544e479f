//! Configuration types
//!
//! Plain serde structs loaded once at process start and passed into the
//! components that need them. Replication caches and the queue service each
//! have their own YAML file, mirroring the server's `subscriber.yaml` and
//! `queueservice.yaml`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use lookup_api::Query;
use lookup_common::error::LookupError;

fn default_heartbeat_interval() -> u64 {
    300
}

/// Top of the replication YAML file: the caches this node maintains.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplicationConfig {
    #[serde(default)]
    pub caches: Vec<CacheConfig>,
    /// Seconds between heartbeat poll cycles.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
}

impl ReplicationConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LookupError> {
        load_yaml(path)
    }
}

/// A named group of upstream sources replicated as one unit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub name: String,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// One upstream node and the queries replicated from it. No queries means
/// replicate everything.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// URL of the remote node, e.g. `http://ls.example.net:8090/lookup/records`.
    pub access_point: String,
    #[serde(default)]
    pub queries: Vec<Query>,
}

fn default_queue_port() -> u16 {
    5672
}

fn default_batch_size() -> u32 {
    10
}

fn default_push_interval() -> u64 {
    120
}

fn default_message_ttl_ms() -> u64 {
    120_000
}

/// Settings for the node's own notification queue service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueueServiceConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_queue_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub vhost: String,
    #[serde(default)]
    pub persistent: bool,
    #[serde(default = "default_message_ttl_ms")]
    pub message_ttl_ms: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_push_interval")]
    pub push_interval_secs: u64,
}

impl Default for QueueServiceConfig {
    fn default() -> Self {
        QueueServiceConfig {
            enabled: false,
            host: String::new(),
            port: default_queue_port(),
            username: String::new(),
            password: String::new(),
            vhost: String::new(),
            persistent: false,
            message_ttl_ms: default_message_ttl_ms(),
            batch_size: default_batch_size(),
            push_interval_secs: default_push_interval(),
        }
    }
}

impl QueueServiceConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LookupError> {
        load_yaml(path)
    }
}

fn load_yaml<T: serde::de::DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, LookupError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| LookupError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    serde_yaml::from_str(&text)
        .map_err(|e| LookupError::Config(format!("cannot parse {}: {}", path.display(), e)))
}
