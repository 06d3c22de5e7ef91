// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared connection pools to log-collector agents.
//!
//! A [`AgentPoolLink`] binds one pool to its endpoint plus the set of
//! businesses currently shipping through it. Links are handed out by the
//! [`AgentPoolRegistry`](crate::pool_registry::AgentPoolRegistry) and shared
//! by every business whose resolved endpoint set includes the endpoint.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use deadpool::managed::{Object, Pool};
use deadpool::Runtime;
use tracing::debug;

use crate::endpoint::Endpoint;
use crate::error::SinkError;
use crate::transport::{AgentConnectionManager, AgentConnectionPool};

/// Point-in-time pool saturation: in-use connections, idle cap, max cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    pub active: usize,
    pub idle: usize,
    pub max: usize,
}

/// One shared pool of connections to a single collector endpoint.
#[async_trait]
pub trait AgentPool: Send + Sync {
    /// Claim a connection and ship one event payload.
    async fn send(&self, payload: &[u8]) -> Result<(), SinkError>;

    fn status(&self) -> PoolStatus;

    /// Tear the pool down; safe to call more than once.
    fn destroy(&self);
}

/// Builds the shared pool for an endpoint on first use.
#[async_trait]
pub trait AgentPoolProvider: Send + Sync {
    async fn create(&self, endpoint: &Endpoint) -> Result<Arc<dyn AgentPool>, SinkError>;
}

/// A pool bound to its endpoint plus the businesses currently attached.
///
/// The link's own lock guards only the business set; the registry map that
/// hands links out is guarded separately by the registry.
pub struct AgentPoolLink {
    endpoint: Endpoint,
    pool: Arc<dyn AgentPool>,
    businesses: Mutex<BTreeSet<String>>,
}

impl AgentPoolLink {
    pub fn new(endpoint: Endpoint, pool: Arc<dyn AgentPool>) -> Self {
        AgentPoolLink {
            endpoint,
            pool,
            businesses: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn attach(&self, business: &str) {
        let mut businesses = self.businesses.lock().expect("business set lock poisoned");
        businesses.insert(business.to_string());
    }

    pub fn detach(&self, business: &str) {
        let mut businesses = self.businesses.lock().expect("business set lock poisoned");
        if businesses.remove(business) {
            debug!("business [{business}] detached from collector {}", self.endpoint);
        }
    }

    pub fn serves(&self, business: &str) -> bool {
        self.businesses
            .lock()
            .expect("business set lock poisoned")
            .contains(business)
    }

    /// Attached business names, in order.
    pub fn businesses(&self) -> Vec<String> {
        self.businesses
            .lock()
            .expect("business set lock poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub async fn send(&self, payload: &[u8]) -> Result<(), SinkError> {
        self.pool.send(payload).await
    }

    pub fn status(&self) -> PoolStatus {
        self.pool.status()
    }

    pub(crate) fn destroy(&self) {
        self.pool.destroy();
    }
}

/// Production pool over framed TCP connections.
pub struct TcpAgentPool {
    pool: AgentConnectionPool,
    idle: usize,
}

#[async_trait]
impl AgentPool for TcpAgentPool {
    async fn send(&self, payload: &[u8]) -> Result<(), SinkError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| SinkError::PoolClaim(e.to_string()))?;
        match conn.send_event(payload).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // A write failure means the socket is suspect; drop it
                // instead of returning it to the pool.
                let _ = Object::take(conn);
                Err(SinkError::Transport(e))
            }
        }
    }

    fn status(&self) -> PoolStatus {
        let status = self.pool.status();
        PoolStatus {
            active: status.size.saturating_sub(status.available),
            idle: self.idle,
            max: status.max_size,
        }
    }

    fn destroy(&self) {
        self.pool.close();
    }
}

/// Provider dialing collectors over TCP with a configured timeout.
pub struct TcpAgentPoolProvider {
    dial_timeout: Duration,
    max_connections: usize,
}

impl TcpAgentPoolProvider {
    pub fn new(dial_timeout: Duration, max_connections: usize) -> Self {
        TcpAgentPoolProvider {
            dial_timeout,
            max_connections,
        }
    }
}

#[async_trait]
impl AgentPoolProvider for TcpAgentPoolProvider {
    async fn create(&self, endpoint: &Endpoint) -> Result<Arc<dyn AgentPool>, SinkError> {
        let manager = AgentConnectionManager::new(endpoint.clone(), self.dial_timeout);
        let pool = Pool::builder(manager)
            .max_size(self.max_connections)
            .create_timeout(Some(self.dial_timeout))
            .wait_timeout(Some(self.dial_timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| SinkError::PoolCreation {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;
        Ok(Arc::new(TcpAgentPool {
            pool,
            idle: self.max_connections / 2,
        }))
    }
}
