// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process-wide registry mapping collector endpoints to shared pool links.
//!
//! The registry guarantees at most one pool per distinct endpoint. The map
//! lock covers only slot lookup; the actual pool construction (which may
//! dial with a timeout) runs inside a per-endpoint cell, so concurrent
//! resolutions of the same endpoint from different businesses collapse to a
//! single creation and never block the registry-wide lock on the dial.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::OnceCell;
use tracing::debug;

use crate::agent_pool::{AgentPoolLink, AgentPoolProvider};
use crate::endpoint::Endpoint;
use crate::error::SinkError;

type PoolCell = Arc<OnceCell<Arc<AgentPoolLink>>>;

pub struct AgentPoolRegistry {
    provider: Arc<dyn AgentPoolProvider>,
    links: Mutex<HashMap<Endpoint, PoolCell>>,
}

impl AgentPoolRegistry {
    pub fn new(provider: Arc<dyn AgentPoolProvider>) -> Self {
        AgentPoolRegistry {
            provider,
            links: Mutex::new(HashMap::new()),
        }
    }

    /// Return the shared link for `endpoint`, creating it on first use.
    ///
    /// The second element reports whether this call performed the creation.
    /// A creation failure leaves the slot empty; the next resolution of the
    /// endpoint retries.
    pub async fn resolve(
        &self,
        endpoint: &Endpoint,
    ) -> Result<(Arc<AgentPoolLink>, bool), SinkError> {
        let cell = {
            let mut links = self.links.lock().expect("registry lock poisoned");
            Arc::clone(links.entry(endpoint.clone()).or_default())
        };

        let created = AtomicBool::new(false);
        let link = cell
            .get_or_try_init(|| {
                created.store(true, Ordering::Relaxed);
                async {
                    let pool = self.provider.create(endpoint).await?;
                    debug!("collector pool created for {endpoint}");
                    Ok::<_, SinkError>(Arc::new(AgentPoolLink::new(endpoint.clone(), pool)))
                }
            })
            .await?;
        Ok((Arc::clone(link), created.load(Ordering::Relaxed)))
    }

    pub fn get(&self, endpoint: &Endpoint) -> Option<Arc<AgentPoolLink>> {
        let links = self.links.lock().expect("registry lock poisoned");
        links.get(endpoint).and_then(|cell| cell.get().cloned())
    }

    /// Number of endpoints with an initialized pool.
    pub fn len(&self) -> usize {
        let links = self.links.lock().expect("registry lock poisoned");
        links.values().filter(|cell| cell.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove `business` from every link whose endpoint is not in `keep`.
    pub fn detach_missing(&self, business: &str, keep: &HashSet<Endpoint>) {
        let links = self.links.lock().expect("registry lock poisoned");
        for (endpoint, cell) in links.iter() {
            if keep.contains(endpoint) {
                continue;
            }
            if let Some(link) = cell.get() {
                link.detach(business);
            }
        }
    }

    /// All initialized links, for monitoring snapshots.
    pub fn snapshot(&self) -> Vec<Arc<AgentPoolLink>> {
        let links = self.links.lock().expect("registry lock poisoned");
        links
            .values()
            .filter_map(|cell| cell.get().cloned())
            .collect()
    }

    /// Destroy every distinct pool exactly once and empty the registry.
    pub fn destroy_all(&self) {
        let drained: Vec<PoolCell> = {
            let mut links = self.links.lock().expect("registry lock poisoned");
            links.drain().map(|(_, cell)| cell).collect()
        };
        for cell in drained {
            if let Some(link) = cell.get() {
                link.destroy();
            }
        }
    }
}
