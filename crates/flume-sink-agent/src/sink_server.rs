// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-business worker: consumes from the business's queue pools and
//! forwards events through its assigned collector pool links.
//!
//! A worker is replaced wholesale when its business's topology changes;
//! the manager stops the prior instance after installing the new one.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent_pool::AgentPoolLink;
use crate::error::SinkError;
use crate::queue_pool::QueuePool;

/// Pause after a failed queue fetch so a dead broker doesn't spin the loop.
const FETCH_BACKOFF: Duration = Duration::from_secs(1);

pub struct SinkServer {
    business: String,
    queue_pools: Vec<Arc<QueuePool>>,
    pool_links: Vec<Arc<AgentPoolLink>>,
    success: AtomicU64,
    failure: AtomicU64,
    started: AtomicBool,
    next_link: AtomicUsize,
    cancel: CancellationToken,
}

impl SinkServer {
    pub fn new(
        business: impl Into<String>,
        queue_pools: Vec<Arc<QueuePool>>,
        pool_links: Vec<Arc<AgentPoolLink>>,
    ) -> Arc<Self> {
        Arc::new(SinkServer {
            business: business.into(),
            queue_pools,
            pool_links,
            success: AtomicU64::new(0),
            failure: AtomicU64::new(0),
            started: AtomicBool::new(false),
            next_link: AtomicUsize::new(0),
            cancel: CancellationToken::new(),
        })
    }

    pub fn business(&self) -> &str {
        &self.business
    }

    /// Start the forwarding loop. Starting an already-started worker is a
    /// no-op, never a duplicate task.
    pub fn start(self: &Arc<Self>) {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        if self.queue_pools.is_empty() || self.pool_links.is_empty() {
            warn!(
                "sink server [{}] has no queue pools or collector links, nothing to forward",
                self.business
            );
            return;
        }
        let server = Arc::clone(self);
        tokio::spawn(server.run());
    }

    pub fn stop(&self) {
        if !self.started.swap(false, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        info!("sink server stop [{}]", self.business);
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Drain the success/failure counters accumulated since the last call.
    pub fn snapshot_counts(&self) -> (u64, u64) {
        (
            self.success.swap(0, Ordering::Relaxed),
            self.failure.swap(0, Ordering::Relaxed),
        )
    }

    async fn run(self: Arc<Self>) {
        debug!("sink server loop started [{}]", self.business);
        let mut source = 0usize;
        loop {
            let fetched = tokio::select! {
                _ = self.cancel.cancelled() => break,
                fetched = self.next_event(&mut source) => fetched,
            };
            match fetched {
                Ok(payload) => self.forward(&payload).await,
                Err(e) => {
                    debug!("queue fetch failed for [{}]: {e}", self.business);
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(FETCH_BACKOFF) => {}
                    }
                }
            }
        }
        debug!("sink server loop stopped [{}]", self.business);
    }

    /// Claim the next event, rotating across the business's queue pools.
    async fn next_event(&self, source: &mut usize) -> Result<Vec<u8>, SinkError> {
        let pool = &self.queue_pools[*source % self.queue_pools.len()];
        *source = source.wrapping_add(1);
        pool.pop_event().await
    }

    async fn forward(&self, payload: &[u8]) {
        let idx = self.next_link.fetch_add(1, Ordering::Relaxed) % self.pool_links.len();
        let link = &self.pool_links[idx];
        match link.send(payload).await {
            Ok(()) => {
                self.success.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.failure.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "forward to {} failed for [{}]: {e}",
                    link.endpoint(),
                    self.business
                );
            }
        }
    }
}
