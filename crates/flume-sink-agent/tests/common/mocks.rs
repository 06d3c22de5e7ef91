// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mock implementations of the manager's collaborators for testing

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use flume_sink_agent::agent_pool::{AgentPool, AgentPoolProvider, PoolStatus};
use flume_sink_agent::coordination::{CoordinationClient, TopologyWatcher};
use flume_sink_agent::endpoint::Endpoint;
use flume_sink_agent::error::SinkError;

/// Pool that records sends and destroy calls instead of dialing anything.
pub struct MockAgentPool {
    pub destroy_count: AtomicUsize,
    pub sent: Mutex<Vec<Vec<u8>>>,
}

#[async_trait]
impl AgentPool for MockAgentPool {
    async fn send(&self, payload: &[u8]) -> Result<(), SinkError> {
        self.sent
            .lock()
            .expect("sent lock poisoned")
            .push(payload.to_vec());
        Ok(())
    }

    fn status(&self) -> PoolStatus {
        PoolStatus {
            active: 0,
            idle: 2,
            max: 4,
        }
    }

    fn destroy(&self) {
        self.destroy_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Provider counting creations per endpoint and keeping every pool it
/// handed out so tests can assert on teardown behavior.
#[derive(Default)]
pub struct MockPoolProvider {
    pub creations: Mutex<HashMap<Endpoint, usize>>,
    pub pools: Mutex<HashMap<Endpoint, Arc<MockAgentPool>>>,
    pub fail_endpoints: Mutex<HashSet<Endpoint>>,
    pub create_delay: Option<Duration>,
}

impl MockPoolProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(MockPoolProvider::default())
    }

    #[allow(dead_code)]
    pub fn with_create_delay(delay: Duration) -> Arc<Self> {
        Arc::new(MockPoolProvider {
            create_delay: Some(delay),
            ..MockPoolProvider::default()
        })
    }

    #[allow(dead_code)]
    pub fn fail_for(&self, endpoint: Endpoint) {
        self.fail_endpoints
            .lock()
            .expect("fail set lock poisoned")
            .insert(endpoint);
    }

    pub fn creation_count(&self, endpoint: &Endpoint) -> usize {
        *self
            .creations
            .lock()
            .expect("creations lock poisoned")
            .get(endpoint)
            .unwrap_or(&0)
    }

    pub fn pool(&self, endpoint: &Endpoint) -> Option<Arc<MockAgentPool>> {
        self.pools
            .lock()
            .expect("pools lock poisoned")
            .get(endpoint)
            .cloned()
    }
}

#[async_trait]
impl AgentPoolProvider for MockPoolProvider {
    async fn create(&self, endpoint: &Endpoint) -> Result<Arc<dyn AgentPool>, SinkError> {
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        if self
            .fail_endpoints
            .lock()
            .expect("fail set lock poisoned")
            .contains(endpoint)
        {
            return Err(SinkError::PoolCreation {
                endpoint: endpoint.clone(),
                reason: "connection refused".to_string(),
            });
        }
        *self
            .creations
            .lock()
            .expect("creations lock poisoned")
            .entry(endpoint.clone())
            .or_insert(0) += 1;
        let pool = Arc::new(MockAgentPool {
            destroy_count: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        });
        self.pools
            .lock()
            .expect("pools lock poisoned")
            .insert(endpoint.clone(), Arc::clone(&pool));
        Ok(pool)
    }
}

/// Coordination client serving a fixed topology map and capturing the
/// watcher registered per business so tests can fire change notifications.
#[derive(Default)]
pub struct MockCoordinationClient {
    pub topology: Mutex<HashMap<String, Vec<Endpoint>>>,
    pub watchers: Mutex<HashMap<String, Arc<dyn TopologyWatcher>>>,
    pub shutdown_count: AtomicUsize,
}

impl MockCoordinationClient {
    pub fn new(topology: HashMap<String, Vec<Endpoint>>) -> Arc<Self> {
        Arc::new(MockCoordinationClient {
            topology: Mutex::new(topology),
            ..MockCoordinationClient::default()
        })
    }

    /// Deliver a topology change the way the coordination service would.
    #[allow(dead_code)]
    pub async fn notify(&self, business: &str, endpoints: Vec<Endpoint>) {
        let watcher = self
            .watchers
            .lock()
            .expect("watchers lock poisoned")
            .get(business)
            .cloned();
        if let Some(watcher) = watcher {
            watcher.on_topology_change(business, endpoints).await;
        }
    }
}

#[async_trait]
impl CoordinationClient for MockCoordinationClient {
    async fn get_and_watch(
        &self,
        business: &str,
        watcher: Arc<dyn TopologyWatcher>,
    ) -> Result<Vec<Endpoint>, SinkError> {
        self.watchers
            .lock()
            .expect("watchers lock poisoned")
            .insert(business.to_string(), watcher);
        let endpoints = self
            .topology
            .lock()
            .expect("topology lock poisoned")
            .get(business)
            .cloned()
            .unwrap_or_default();
        Ok(endpoints)
    }

    fn shutdown(&self) {
        self.shutdown_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// Watcher recording every notification it receives.
#[derive(Default)]
pub struct RecordingWatcher {
    pub notifications: Mutex<Vec<(String, Vec<Endpoint>)>>,
}

#[async_trait]
impl TopologyWatcher for RecordingWatcher {
    async fn on_topology_change(&self, business: &str, endpoints: Vec<Endpoint>) {
        self.notifications
            .lock()
            .expect("notifications lock poisoned")
            .push((business.to_string(), endpoints));
    }
}
