// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Resource-lifecycle manager of a log-shipping sidecar.
//!
//! Routes per-business event streams, read from queue brokers, to a
//! dynamically-discovered set of downstream log-collector agents,
//! multiplexing shared connection pools across businesses and reacting to
//! live topology changes from the coordination service.

pub mod agent_pool;
pub mod config;
pub mod coordination;
pub mod endpoint;
pub mod error;
mod monitor;
pub mod pool_registry;
pub mod queue_pool;
pub mod sink_manager;
pub mod sink_server;
pub mod transport;
