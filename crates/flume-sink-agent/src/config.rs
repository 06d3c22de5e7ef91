// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SinkError;

const CONFIG_PATH_ENV_VAR: &str = "FLUME_SINK_CONFIG";

const DEFAULT_TOPOLOGY_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_COLLECTOR_DIAL_TIMEOUT_SECS: u64 = 5;
const DEFAULT_COLLECTOR_MAX_CONNECTIONS: usize = 20;

/// One queue broker to consume from, bound to a named queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSource {
    pub host: String,
    pub port: u16,
    pub timeout_seconds: u64,
    pub max_connections: usize,
    pub queue_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base address of the coordination service, e.g. `http://127.0.0.1:2181`.
    pub coordination_address: String,
    /// Business names to serve.
    pub businesses: Vec<String>,
    pub queue_sources: Vec<QueueSource>,
    /// How often each business's topology is re-fetched, in seconds.
    #[serde(default = "default_topology_poll_interval_secs")]
    pub topology_poll_interval_secs: u64,
    #[serde(default = "default_collector_dial_timeout_secs")]
    pub collector_dial_timeout_secs: u64,
    /// Connection cap of each shared collector pool; idle cap is half of this.
    #[serde(default = "default_collector_max_connections")]
    pub collector_max_connections: usize,
}

fn default_topology_poll_interval_secs() -> u64 {
    DEFAULT_TOPOLOGY_POLL_INTERVAL_SECS
}

fn default_collector_dial_timeout_secs() -> u64 {
    DEFAULT_COLLECTOR_DIAL_TIMEOUT_SECS
}

fn default_collector_max_connections() -> usize {
    DEFAULT_COLLECTOR_MAX_CONNECTIONS
}

impl Config {
    /// Load the configuration from the file named by `FLUME_SINK_CONFIG`.
    pub fn new() -> Result<Config, SinkError> {
        let path = env::var(CONFIG_PATH_ENV_VAR).map_err(|_| {
            SinkError::InvalidConfig(format!(
                "{CONFIG_PATH_ENV_VAR} environment variable is not set"
            ))
        })?;
        Config::from_file(&path)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Config, SinkError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            SinkError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| {
            SinkError::InvalidConfig(format!("cannot parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), SinkError> {
        if self.coordination_address.is_empty() {
            return Err(SinkError::InvalidConfig(
                "coordination_address must not be empty".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for business in &self.businesses {
            if business.is_empty() {
                return Err(SinkError::InvalidConfig(
                    "business names must not be empty".to_string(),
                ));
            }
            if !seen.insert(business.as_str()) {
                return Err(SinkError::InvalidConfig(format!(
                    "duplicate business name: {business}"
                )));
            }
        }
        for source in &self.queue_sources {
            if source.queue_name.is_empty() {
                return Err(SinkError::InvalidConfig(format!(
                    "queue source {}:{} has an empty queue_name",
                    source.host, source.port
                )));
            }
            if source.max_connections == 0 {
                return Err(SinkError::InvalidConfig(format!(
                    "queue source {}:{} must allow at least one connection",
                    source.host, source.port
                )));
            }
            if source.timeout_seconds == 0 {
                return Err(SinkError::InvalidConfig(format!(
                    "queue source {}:{} must have a non-zero timeout",
                    source.host, source.port
                )));
            }
        }
        if self.collector_max_connections == 0 {
            return Err(SinkError::InvalidConfig(
                "collector_max_connections must be at least one".to_string(),
            ));
        }
        Ok(())
    }
}
