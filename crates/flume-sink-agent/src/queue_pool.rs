// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Connection pools to queue brokers, built once at startup.
//!
//! Queue pools are static for the process lifetime; no reconfiguration
//! protocol applies to them. Several sources may share a queue name, in
//! which case their pools accumulate in an ordered list under that name.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use deadpool::managed::{Object, Pool};
use deadpool::Runtime;
use tracing::debug;

use crate::agent_pool::PoolStatus;
use crate::config::{Config, QueueSource};
use crate::endpoint::Endpoint;
use crate::error::SinkError;
use crate::transport::{QueueConnectionManager, QueueConnectionPool};

pub struct QueuePool {
    name: String,
    endpoint: Endpoint,
    pool: QueueConnectionPool,
    idle: usize,
}

impl QueuePool {
    pub fn new(source: &QueueSource) -> Result<Arc<QueuePool>, SinkError> {
        let endpoint = Endpoint::new(source.host.clone(), source.port);
        let timeout = Duration::from_secs(source.timeout_seconds);
        let manager = QueueConnectionManager::new(endpoint.clone(), timeout);
        let pool = Pool::builder(manager)
            .max_size(source.max_connections)
            .create_timeout(Some(timeout))
            .wait_timeout(Some(timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| SinkError::QueuePool(e.to_string()))?;
        Ok(Arc::new(QueuePool {
            name: source.queue_name.clone(),
            endpoint,
            pool,
            idle: source.max_connections / 2,
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Claim a broker connection and wait for the next event frame.
    pub async fn pop_event(&self) -> Result<Vec<u8>, SinkError> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| SinkError::PoolClaim(e.to_string()))?;
        match conn.pop_event().await {
            Ok(payload) => Ok(payload),
            Err(e) => {
                // The socket is suspect after a read failure; drop it.
                let _ = Object::take(conn);
                Err(SinkError::Transport(e))
            }
        }
    }

    pub fn status(&self) -> PoolStatus {
        let status = self.pool.status();
        PoolStatus {
            active: status.size.saturating_sub(status.available),
            idle: self.idle,
            max: status.max_size,
        }
    }

    pub fn close(&self) {
        self.pool.close();
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}

/// Build one pool per configured queue source, keyed by queue name.
pub fn build_queue_pools(
    config: &Config,
) -> Result<HashMap<String, Vec<Arc<QueuePool>>>, SinkError> {
    let mut pools: HashMap<String, Vec<Arc<QueuePool>>> = HashMap::new();
    for source in &config.queue_sources {
        let pool = QueuePool::new(source)?;
        debug!(
            "queue pool built for [{}] at {}:{} (idle {}, max {})",
            source.queue_name,
            source.host,
            source.port,
            source.max_connections / 2,
            source.max_connections
        );
        pools.entry(source.queue_name.clone()).or_default().push(pool);
    }
    Ok(pools)
}
