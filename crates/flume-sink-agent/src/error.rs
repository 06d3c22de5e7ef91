// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::endpoint::Endpoint;

/// Errors surfaced by the sink manager and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid endpoint address: {0}")]
    InvalidEndpoint(String),

    #[error("Coordination service error: {0}")]
    Coordination(String),

    #[error("Failed to create collector pool for {endpoint}: {reason}")]
    PoolCreation { endpoint: Endpoint, reason: String },

    #[error("Failed to claim pooled connection: {0}")]
    PoolClaim(String),

    #[error("Queue pool error: {0}")]
    QueuePool(String),

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),
}
