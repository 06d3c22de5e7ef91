// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Top-level orchestrator of the sidecar.
//!
//! The manager owns the collector pool registry, the static queue pools,
//! and the per-business sink servers, wires each business to the pools its
//! current topology resolves to, and drives the start/monitor/close
//! lifecycle.
//!
//! Lock discipline, per structure:
//! - `state` guards the business→server and business→watcher maps.
//! - the registry serializes its own endpoint→link map internally.
//! - each [`AgentPoolLink`] guards only its own business set.
//! - `business_locks` serializes resolutions of one business end to end;
//!   resolutions of different businesses run in parallel.
//!
//! No lock above is ever held across a dial.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::agent_pool::AgentPoolProvider;
use crate::config::Config;
use crate::coordination::{CoordinationClient, TopologyWatcher};
use crate::endpoint::Endpoint;
use crate::error::SinkError;
use crate::monitor;
use crate::pool_registry::AgentPoolRegistry;
use crate::queue_pool::{build_queue_pools, QueuePool};
use crate::sink_server::SinkServer;

#[derive(Default)]
pub(crate) struct ManagerState {
    pub(crate) sink_servers: HashMap<String, Arc<SinkServer>>,
    watchers: HashMap<String, Arc<dyn TopologyWatcher>>,
}

pub(crate) struct ManagerShared {
    pub(crate) registry: AgentPoolRegistry,
    queue_pools: HashMap<String, Vec<Arc<QueuePool>>>,
    coordination: Arc<dyn CoordinationClient>,
    pub(crate) state: TokioMutex<ManagerState>,
    business_locks: Mutex<HashMap<String, Arc<TokioMutex<()>>>>,
    running: AtomicBool,
    cancel: CancellationToken,
}

/// Watcher registration bound to one business, invoked by the coordination
/// client on every endpoint-set change for that business.
struct SinkNodeWatcher {
    business: String,
    shared: Weak<ManagerShared>,
}

#[async_trait]
impl TopologyWatcher for SinkNodeWatcher {
    async fn on_topology_change(&self, business: &str, endpoints: Vec<Endpoint>) {
        if business != self.business {
            warn!(
                "topology change for [{business}] delivered to watcher of [{}]",
                self.business
            );
            return;
        }
        let Some(shared) = self.shared.upgrade() else {
            debug!("manager gone, dropping topology change for [{business}]");
            return;
        };
        shared.rebuild_sink_server(business, endpoints).await;
    }
}

pub struct SinkManager {
    shared: Arc<ManagerShared>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl SinkManager {
    /// Build queue pools, register a topology watcher per configured
    /// business, and resolve each business's current endpoint set into a
    /// running sink server.
    ///
    /// The coordination client must already be connected; a failure to
    /// reach the coordination service is fatal and belongs to the caller.
    /// Per-business resolution failures are logged and leave that business
    /// unserved without aborting the rest.
    pub async fn initialize(
        config: &Config,
        coordination: Arc<dyn CoordinationClient>,
        provider: Arc<dyn AgentPoolProvider>,
    ) -> Result<SinkManager, SinkError> {
        let queue_pools = build_queue_pools(config)?;
        let shared = Arc::new(ManagerShared {
            registry: AgentPoolRegistry::new(provider),
            queue_pools,
            coordination: Arc::clone(&coordination),
            state: TokioMutex::new(ManagerState::default()),
            business_locks: Mutex::new(HashMap::new()),
            running: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        });

        for business in &config.businesses {
            let watcher = Arc::new(SinkNodeWatcher {
                business: business.clone(),
                shared: Arc::downgrade(&shared),
            });
            {
                let mut state = shared.state.lock().await;
                state.watchers.insert(business.clone(), watcher.clone());
            }
            match coordination.get_and_watch(business, watcher).await {
                Ok(endpoints) => shared.rebuild_sink_server(business, endpoints).await,
                Err(e) => {
                    error!("topology fetch failed for [{business}], left unserved: {e}");
                }
            }
        }

        Ok(SinkManager {
            shared,
            monitor: Mutex::new(None),
        })
    }

    /// Start every registered sink server and launch the monitor loop.
    ///
    /// Returns whether this call performed the transition; repeated calls
    /// re-issue the (idempotent) per-server starts but never spawn a
    /// second monitor task.
    pub async fn start(&self) -> bool {
        {
            let state = self.shared.state.lock().await;
            for (name, server) in &state.sink_servers {
                server.start();
                info!("sink server start [{name}]");
            }
        }

        if self
            .shared
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        let handle = tokio::spawn(monitor::run_monitor(
            Arc::clone(&self.shared),
            self.shared.cancel.clone(),
        ));
        *self.monitor.lock().expect("monitor handle lock poisoned") = Some(handle);
        true
    }

    /// Stop every sink server, close every distinct queue pool once,
    /// destroy every distinct collector pool once, and signal the monitor
    /// loop to exit.
    ///
    /// Safe to call while a monitor cycle is in flight; the loop works on
    /// snapshots, observes the cancellation at its next wait, and is
    /// joined before the running flag clears. The flag reads false as
    /// soon as this returns.
    pub async fn close(&self) {
        {
            let state = self.shared.state.lock().await;
            for server in state.sink_servers.values() {
                server.stop();
            }
        }

        for pools in self.shared.queue_pools.values() {
            for pool in pools {
                pool.close();
            }
        }
        self.shared.registry.destroy_all();

        self.shared.coordination.shutdown();
        self.shared.cancel.cancel();
        let handle = self
            .monitor
            .lock()
            .expect("monitor handle lock poisoned")
            .take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.shared.running.store(false, Ordering::SeqCst);
        info!("sink manager closed");
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Re-run topology resolution for one business, as the coordination
    /// service does on a change notification.
    pub async fn reconfigure(&self, business: &str, endpoints: Vec<Endpoint>) {
        self.shared.rebuild_sink_server(business, endpoints).await;
    }

    pub fn registry(&self) -> &AgentPoolRegistry {
        &self.shared.registry
    }

    pub async fn sink_server(&self, business: &str) -> Option<Arc<SinkServer>> {
        let state = self.shared.state.lock().await;
        state.sink_servers.get(business).cloned()
    }

    pub fn queue_pools(&self, queue_name: &str) -> Option<Vec<Arc<QueuePool>>> {
        self.shared.queue_pools.get(queue_name).cloned()
    }
}

impl ManagerShared {
    /// Resolve business `B`'s new endpoint set into shared pool links and
    /// swap in a freshly-built sink server.
    ///
    /// Per-endpoint pool failures skip that endpoint and keep going; the
    /// resolution never fails wholesale because one collector is down. If
    /// no endpoint is usable the previous assignment is left untouched.
    pub(crate) async fn rebuild_sink_server(&self, business: &str, endpoints: Vec<Endpoint>) {
        let business_lock = {
            let mut locks = self.business_locks.lock().expect("business locks poisoned");
            Arc::clone(locks.entry(business.to_string()).or_default())
        };
        let _guard = business_lock.lock().await;

        let supported = {
            let state = self.state.lock().await;
            state.watchers.contains_key(business)
        };
        if !supported {
            warn!("unsupported business [{business}], endpoints: {endpoints:?}");
            return;
        }

        if endpoints.is_empty() {
            warn!("no valid collector endpoint for [{business}]");
            return;
        }

        let mut endpoints = endpoints;
        endpoints.sort();
        endpoints.dedup();

        let mut links = Vec::with_capacity(endpoints.len());
        for endpoint in &endpoints {
            match self.registry.resolve(endpoint).await {
                Ok((link, created)) => {
                    if created {
                        info!("collector pool registered for {endpoint}");
                    }
                    link.attach(business);
                    links.push(link);
                }
                Err(e) => {
                    error!("collector pool init failed for {endpoint}, skipping: {e}");
                }
            }
        }
        if links.is_empty() {
            warn!("no reachable collector endpoint for [{business}], keeping previous assignment");
            return;
        }

        // The business no longer ships to endpoints outside its resolved
        // set; drop it from those links' business sets.
        let keep: HashSet<Endpoint> = links.iter().map(|link| link.endpoint().clone()).collect();
        self.registry.detach_missing(business, &keep);

        let server = SinkServer::new(business, self.queue_pools_for(business), links);
        server.start();
        let prior = {
            let mut state = self.state.lock().await;
            state
                .sink_servers
                .insert(business.to_string(), Arc::clone(&server))
        };
        match prior {
            Some(prior) => {
                prior.stop();
                info!("sink server replaced [{business}]");
            }
            None => info!("sink server installed [{business}]"),
        }
    }

    /// Queue pools assigned to a business: the pools registered under the
    /// business's own queue name when present, otherwise every configured
    /// pool in queue-name order.
    fn queue_pools_for(&self, business: &str) -> Vec<Arc<QueuePool>> {
        if let Some(pools) = self.queue_pools.get(business) {
            return pools.clone();
        }
        let mut names: Vec<&String> = self.queue_pools.keys().collect();
        names.sort();
        let mut all = Vec::new();
        for name in names {
            all.extend(self.queue_pools[name].iter().cloned());
        }
        all
    }
}
