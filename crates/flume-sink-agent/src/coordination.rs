// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Coordination-service client: the topology source of truth.
//!
//! The manager consumes the [`CoordinationClient`] trait only. The bundled
//! implementation polls the coordination service over HTTP with one task
//! per watched business, which keeps callbacks for a single business
//! strictly sequential while letting different businesses proceed in
//! parallel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::endpoint::Endpoint;
use crate::error::SinkError;

const HEALTH_PATH: &str = "v1/health";
const TOPOLOGY_PATH: &str = "v1/topology";
const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Callback object bound to one business, invoked on endpoint-set changes.
#[async_trait]
pub trait TopologyWatcher: Send + Sync {
    async fn on_topology_change(&self, business: &str, endpoints: Vec<Endpoint>);
}

#[async_trait]
pub trait CoordinationClient: Send + Sync {
    /// Return the business's current endpoint set and register `watcher`
    /// for every subsequent change.
    async fn get_and_watch(
        &self,
        business: &str,
        watcher: Arc<dyn TopologyWatcher>,
    ) -> Result<Vec<Endpoint>, SinkError>;

    /// Stop delivering change notifications.
    fn shutdown(&self) {}
}

/// Polling client over the coordination service's HTTP API.
pub struct HttpCoordinationClient {
    base_url: String,
    http: reqwest::Client,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl HttpCoordinationClient {
    /// Connect to the coordination service, verifying it is reachable.
    pub async fn connect(address: &str, poll_interval: Duration) -> Result<Self, SinkError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SinkError::Coordination(e.to_string()))?;

        let base_url = address.trim_end_matches('/').to_string();
        let health_url = format!("{base_url}/{HEALTH_PATH}");
        let response = http
            .get(&health_url)
            .send()
            .await
            .map_err(|e| SinkError::Coordination(format!("{address} unreachable: {e}")))?;
        if !response.status().is_success() {
            return Err(SinkError::Coordination(format!(
                "{address} health probe returned {}",
                response.status()
            )));
        }

        Ok(HttpCoordinationClient {
            base_url,
            http,
            poll_interval,
            cancel: CancellationToken::new(),
        })
    }

    async fn fetch(&self, business: &str) -> Result<Vec<Endpoint>, SinkError> {
        let url = format!("{}/{TOPOLOGY_PATH}/{business}", self.base_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| SinkError::Coordination(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SinkError::Coordination(format!(
                "topology fetch for [{business}] returned {}",
                response.status()
            )));
        }
        let raw: Vec<String> = response
            .json()
            .await
            .map_err(|e| SinkError::Coordination(e.to_string()))?;

        let mut endpoints = Vec::with_capacity(raw.len());
        for entry in raw {
            match entry.parse::<Endpoint>() {
                Ok(endpoint) => endpoints.push(endpoint),
                // One malformed entry must not hide the rest of the set.
                Err(_) => warn!("skipping malformed endpoint {entry:?} for [{business}]"),
            }
        }
        endpoints.sort();
        endpoints.dedup();
        Ok(endpoints)
    }
}

#[async_trait]
impl CoordinationClient for HttpCoordinationClient {
    async fn get_and_watch(
        &self,
        business: &str,
        watcher: Arc<dyn TopologyWatcher>,
    ) -> Result<Vec<Endpoint>, SinkError> {
        let current = self.fetch(business).await?;

        let poller = HttpCoordinationClient {
            base_url: self.base_url.clone(),
            http: self.http.clone(),
            poll_interval: self.poll_interval,
            cancel: self.cancel.clone(),
        };
        let business = business.to_string();
        let mut last = current.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = poller.cancel.cancelled() => break,
                    _ = tokio::time::sleep(poller.poll_interval) => {}
                }
                match poller.fetch(&business).await {
                    Ok(endpoints) => {
                        if endpoints != last {
                            debug!(
                                "topology change for [{business}]: {} endpoint(s)",
                                endpoints.len()
                            );
                            last = endpoints.clone();
                            watcher.on_topology_change(&business, endpoints).await;
                        }
                    }
                    Err(e) => warn!("topology poll for [{business}] failed: {e}"),
                }
            }
            debug!("topology poller for [{business}] stopped");
        });

        Ok(current)
    }

    fn shutdown(&self) {
        self.cancel.cancel();
    }
}
