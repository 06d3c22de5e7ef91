// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, sync::Arc, time::Duration};

use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use flume_sink_agent::{
    agent_pool::TcpAgentPoolProvider, config::Config, coordination::HttpCoordinationClient,
    sink_manager::SinkManager,
};

#[tokio::main]
pub async fn main() {
    let log_level = env::var("FLUME_SINK_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("hyper=off,reqwest=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match Config::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading configuration on sink sidecar startup: {e}");
            return;
        }
    };

    let coordination = match HttpCoordinationClient::connect(
        &config.coordination_address,
        Duration::from_secs(config.topology_poll_interval_secs),
    )
    .await
    {
        Ok(client) => Arc::new(client),
        Err(e) => {
            // Without a topology source nothing can be routed; shut down.
            error!("Error connecting to coordination service: {e}");
            return;
        }
    };

    let provider = Arc::new(TcpAgentPoolProvider::new(
        Duration::from_secs(config.collector_dial_timeout_secs),
        config.collector_max_connections,
    ));

    let manager = match SinkManager::initialize(&config, coordination, provider).await {
        Ok(manager) => manager,
        Err(e) => {
            error!("Error initializing sink manager: {e}");
            return;
        }
    };
    manager.start().await;
    info!(
        "flume sink sidecar started, serving {} business(es)",
        config.businesses.len()
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Error waiting for shutdown signal: {e}");
    }
    info!("Shutdown signal received, closing sink manager");
    manager.close().await;
}
