//! Network configuration
//!
//! Everything a node needs is passed in explicitly at construction or
//! initialization. `NetworkConfig` is the file-level shape (YAML); the
//! per-node mappings handed to `Node::initialize` deserialize into the
//! smaller structs here.

use crate::fact::ChannelId;
use crate::gateway::AckPolicy;
use crate::routing::PolicyKind;
use crate::sink::QueueServerSpec;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Errors that prevent a network from starting.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("eddy '{0}' is listed more than once")]
    DuplicateEddy(ChannelId),

    #[error("component id '{0}' is used more than once")]
    DuplicateComponent(ChannelId),

    #[error("channel '{channel}' declares {declared:?}, expected [action, isAssertion, graphFragment, timestamp]")]
    SchemaMismatch {
        channel: ChannelId,
        declared: Vec<String>,
    },

    #[error("channel '{channel}' was never declared{}", by_producer(.producer))]
    UndeclaredDestination {
        producer: Option<ChannelId>,
        channel: ChannelId,
    },

    #[error("unknown component: {0}")]
    UnknownComponent(ChannelId),

    #[error("invalid node configuration: {0}")]
    NodeConfig(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn by_producer(producer: &Option<ChannelId>) -> String {
    producer
        .as_ref()
        .map(|p| format!(" by '{}'", p))
        .unwrap_or_default()
}

/// Read a node's initialization mapping; `null` means all defaults.
pub fn parse_node_config<T: DeserializeOwned + Default>(mapping: &serde_json::Value) -> Result<T, ConfigError> {
    if mapping.is_null() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(mapping.clone())?)
}

/// Bounded retry for sink publishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles on each further attempt
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 50,
        }
    }
}

/// Settings a router node reads from its initialization mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterNodeConfig {
    pub ack_policy: AckPolicy,
}

/// Settings a conflict-set node reads from its initialization mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictSetConfig {
    pub retry: RetryConfig,
}

/// One router component in the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterConfig {
    pub id: ChannelId,
    /// Downstream matchers this router can address, in declaration order
    pub eddies: Vec<ChannelId>,
    #[serde(default)]
    pub policy: PolicyKind,
    #[serde(default)]
    pub ack_policy: AckPolicy,
    /// Parallel instances of this router
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

fn default_parallelism() -> usize {
    1
}

impl RouterConfig {
    pub fn new(id: impl Into<ChannelId>, eddies: Vec<ChannelId>) -> Self {
        Self {
            id: id.into(),
            eddies,
            policy: PolicyKind::default(),
            ack_policy: AckPolicy::default(),
            parallelism: 1,
        }
    }

    /// The mapping handed to each instance's `initialize`.
    pub fn node_config(&self) -> Result<serde_json::Value, ConfigError> {
        Ok(serde_json::to_value(RouterNodeConfig {
            ack_policy: self.ack_policy,
        })?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for eddy in &self.eddies {
            if !seen.insert(eddy) {
                return Err(ConfigError::DuplicateEddy(eddy.clone()));
            }
        }
        if self.parallelism == 0 {
            return Err(ConfigError::Invalid(format!(
                "router '{}' needs at least one instance",
                self.id
            )));
        }
        Ok(())
    }
}

/// Where the conflict set publishes derived facts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkConfig {
    /// In-process collector
    #[default]
    Collector,
    /// Durable queue, trying servers in order
    Queue {
        servers: Vec<QueueServerSpec>,
        queue: String,
    },
}

/// The whole network as loaded from a config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub routers: Vec<RouterConfig>,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl NetworkConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut ids = HashSet::new();
        for router in &self.routers {
            if !ids.insert(&router.id) {
                return Err(ConfigError::DuplicateComponent(router.id.clone()));
            }
            router.validate()?;
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        if let SinkConfig::Queue { servers, queue } = &self.sink {
            if servers.is_empty() {
                return Err(ConfigError::Invalid("queue sink needs at least one server".into()));
            }
            if queue.is_empty() {
                return Err(ConfigError::Invalid("queue sink needs a queue name".into()));
            }
        }
        Ok(())
    }

    pub fn conflict_set_config(&self) -> Result<serde_json::Value, ConfigError> {
        Ok(serde_json::to_value(ConflictSetConfig { retry: self.retry })?)
    }
}
