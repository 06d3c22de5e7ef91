// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Framed TCP transport for collector agents and queue brokers.
//!
//! Events are opaque byte payloads carried in length-prefixed frames; the
//! payload encoding is owned by the producers and collectors, not by this
//! sidecar.

use std::io;
use std::time::Duration;

use deadpool::managed::{self, Metrics, RecycleResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::endpoint::Endpoint;

/// Frames larger than this are treated as corrupt input, not data.
const MAX_FRAME_LEN: u32 = 8 * 1024 * 1024;

async fn dial(endpoint: &Endpoint, timeout: Duration) -> io::Result<TcpStream> {
    let stream = tokio::time::timeout(
        timeout,
        TcpStream::connect((endpoint.host.as_str(), endpoint.port)),
    )
    .await
    .map_err(|_| {
        io::Error::new(
            io::ErrorKind::TimedOut,
            format!("dial {endpoint} timed out after {timeout:?}"),
        )
    })??;
    stream.set_nodelay(true)?;
    Ok(stream)
}

async fn write_frame(stream: &mut TcpStream, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "frame too large"));
    }
    stream.write_u32(len).await?;
    stream.write_all(payload).await?;
    stream.flush().await
}

async fn read_frame(stream: &mut TcpStream) -> io::Result<Vec<u8>> {
    let len = stream.read_u32().await?;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {len} bytes exceeds limit"),
        ));
    }
    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload).await?;
    Ok(payload)
}

/// One connection to a log-collector agent.
#[derive(Debug)]
pub struct AgentConnection {
    stream: TcpStream,
}

impl AgentConnection {
    pub async fn connect(endpoint: &Endpoint, timeout: Duration) -> io::Result<Self> {
        let stream = dial(endpoint, timeout).await?;
        Ok(AgentConnection { stream })
    }

    pub async fn send_event(&mut self, payload: &[u8]) -> io::Result<()> {
        write_frame(&mut self.stream, payload).await
    }
}

/// One connection to a queue broker.
#[derive(Debug)]
pub struct QueueConnection {
    stream: TcpStream,
}

impl QueueConnection {
    pub async fn connect(endpoint: &Endpoint, timeout: Duration) -> io::Result<Self> {
        let stream = dial(endpoint, timeout).await?;
        Ok(QueueConnection { stream })
    }

    /// Wait for the next event frame from the broker.
    pub async fn pop_event(&mut self) -> io::Result<Vec<u8>> {
        read_frame(&mut self.stream).await
    }
}

#[derive(Debug)]
pub struct AgentConnectionManager {
    endpoint: Endpoint,
    dial_timeout: Duration,
}

impl AgentConnectionManager {
    pub fn new(endpoint: Endpoint, dial_timeout: Duration) -> Self {
        AgentConnectionManager {
            endpoint,
            dial_timeout,
        }
    }
}

impl managed::Manager for AgentConnectionManager {
    type Type = AgentConnection;
    type Error = io::Error;

    async fn create(&self) -> Result<AgentConnection, io::Error> {
        AgentConnection::connect(&self.endpoint, self.dial_timeout).await
    }

    async fn recycle(
        &self,
        _conn: &mut AgentConnection,
        _metrics: &Metrics,
    ) -> RecycleResult<io::Error> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct QueueConnectionManager {
    endpoint: Endpoint,
    dial_timeout: Duration,
}

impl QueueConnectionManager {
    pub fn new(endpoint: Endpoint, dial_timeout: Duration) -> Self {
        QueueConnectionManager {
            endpoint,
            dial_timeout,
        }
    }
}

impl managed::Manager for QueueConnectionManager {
    type Type = QueueConnection;
    type Error = io::Error;

    async fn create(&self) -> Result<QueueConnection, io::Error> {
        QueueConnection::connect(&self.endpoint, self.dial_timeout).await
    }

    async fn recycle(
        &self,
        _conn: &mut QueueConnection,
        _metrics: &Metrics,
    ) -> RecycleResult<io::Error> {
        Ok(())
    }
}

pub type AgentConnectionPool = managed::Pool<AgentConnectionManager>;
pub type QueueConnectionPool = managed::Pool<QueueConnectionManager>;
