// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Periodic throughput and pool-saturation reporting.
//!
//! One background task, one cycle per second. Every cycle takes
//! independent point-in-time snapshots; no lock is held across the wait,
//! and entries that vanish mid-cycle (e.g. during shutdown) are simply
//! absent from the snapshot rather than an error.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::agent_pool::PoolStatus;
use crate::sink_manager::ManagerShared;
use crate::sink_server::SinkServer;

pub(crate) const MONITOR_INTERVAL: Duration = Duration::from_secs(1);

pub(crate) async fn run_monitor(shared: Arc<ManagerShared>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(MONITOR_INTERVAL);
    ticker.tick().await; // discard first tick, which is instantaneous
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let servers: Vec<(String, Arc<SinkServer>)> = {
            let state = shared.state.lock().await;
            let mut entries: Vec<_> = state
                .sink_servers
                .iter()
                .map(|(name, server)| (name.clone(), Arc::clone(server)))
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            entries
        };
        let throughput: Vec<(String, u64, u64)> = servers
            .iter()
            .map(|(name, server)| {
                let (success, failure) = server.snapshot_counts();
                (name.clone(), success, failure)
            })
            .collect();
        info!("{}", format_tps_line(&throughput));

        let saturation: Vec<(String, PoolStatus)> = shared
            .registry
            .snapshot()
            .iter()
            .map(|link| (link.endpoint().to_string(), link.status()))
            .collect();
        info!("{}", format_pool_block(saturation));
    }
    debug!("monitor loop stopped");
}

fn format_tps_line(entries: &[(String, u64, u64)]) -> String {
    let mut line = String::from("FLUME_TPS|");
    for (business, success, failure) in entries {
        line.push_str(&format!("{business}|{success}/{failure} \t"));
    }
    line
}

/// Endpoints are listed ascending by their `host:port` string so the block
/// diffs cleanly across cycles, independent of registration order.
fn format_pool_block(mut entries: Vec<(String, PoolStatus)>) -> String {
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    let mut block = String::from("FLUME_POOL|\n");
    for (endpoint, status) in entries {
        block.push_str(&format!(
            "{endpoint}|{}/{}/{}\n",
            status.active, status.idle, status.max
        ));
    }
    block
}
