// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Minimal TCP servers standing in for collectors, brokers, and the
//! coordination service during tests

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Collector stand-in: accepts connections and counts the length-prefixed
/// frames it receives.
#[derive(Clone)]
pub struct FrameSinkServer {
    pub addr: SocketAddr,
    received: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl FrameSinkServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind frame sink");
        let addr = listener.local_addr().expect("failed to get local addr");
        let received = Arc::new(Mutex::new(Vec::new()));

        let frames = Arc::clone(&received);
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };
                let frames = Arc::clone(&frames);
                tokio::spawn(async move {
                    loop {
                        let len = match stream.read_u32().await {
                            Ok(len) => len,
                            Err(_) => break,
                        };
                        let mut payload = vec![0u8; len as usize];
                        if stream.read_exact(&mut payload).await.is_err() {
                            break;
                        }
                        frames.lock().expect("frames lock poisoned").push(payload);
                    }
                });
            }
        });

        FrameSinkServer { addr, received }
    }

    pub fn received_count(&self) -> usize {
        self.received.lock().expect("frames lock poisoned").len()
    }

    pub fn received(&self) -> Vec<Vec<u8>> {
        self.received.lock().expect("frames lock poisoned").clone()
    }
}

/// Broker stand-in: writes a fixed sequence of frames to the first
/// connection that claims them, then holds every connection open.
pub struct FrameSourceServer {
    pub addr: SocketAddr,
}

impl FrameSourceServer {
    pub async fn start(frames: Vec<Vec<u8>>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind frame source");
        let addr = listener.local_addr().expect("failed to get local addr");

        let pending = Arc::new(Mutex::new(Some(frames)));
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };
                let batch = pending.lock().expect("pending lock poisoned").take();
                tokio::spawn(async move {
                    if let Some(batch) = batch {
                        for frame in batch {
                            let len = frame.len() as u32;
                            if stream.write_u32(len).await.is_err() {
                                return;
                            }
                            if stream.write_all(&frame).await.is_err() {
                                return;
                            }
                        }
                        let _ = stream.flush().await;
                    }
                    // Keep the connection open so the consumer blocks on
                    // the next read instead of erroring.
                    let mut sink = [0u8; 1];
                    let _ = stream.read(&mut sink).await;
                });
            }
        });

        FrameSourceServer { addr }
    }
}

/// Coordination-service stand-in speaking just enough HTTP/1.1 for the
/// polling client: `/v1/health` and `/v1/topology/{business}`.
#[derive(Clone)]
pub struct MockCoordinationServer {
    pub addr: SocketAddr,
    topology: Arc<Mutex<HashMap<String, Vec<String>>>>,
}

impl MockCoordinationServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind coordination server");
        let addr = listener.local_addr().expect("failed to get local addr");
        let topology: Arc<Mutex<HashMap<String, Vec<String>>>> =
            Arc::new(Mutex::new(HashMap::new()));

        let routes = Arc::clone(&topology);
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };
                let routes = Arc::clone(&routes);
                tokio::spawn(async move {
                    let mut buf = Vec::new();
                    let mut chunk = [0u8; 1024];
                    // Read until the end of the request head; these are
                    // bodyless GETs.
                    loop {
                        let n = match stream.read(&mut chunk).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => n,
                        };
                        buf.extend_from_slice(&chunk[..n]);
                        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }
                    let head = String::from_utf8_lossy(&buf);
                    let path = head
                        .lines()
                        .next()
                        .and_then(|line| line.split_whitespace().nth(1))
                        .unwrap_or("/")
                        .to_string();

                    let (status, body) = if path == "/v1/health" {
                        ("200 OK", "{}".to_string())
                    } else if let Some(business) = path.strip_prefix("/v1/topology/") {
                        let entries = routes
                            .lock()
                            .expect("topology lock poisoned")
                            .get(business)
                            .cloned()
                            .unwrap_or_default();
                        (
                            "200 OK",
                            serde_json::to_string(&entries).expect("serialize failed"),
                        )
                    } else {
                        ("404 Not Found", "{}".to_string())
                    };

                    let response = format!(
                        "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.flush().await;
                });
            }
        });

        MockCoordinationServer { addr, topology }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_topology(&self, business: &str, entries: Vec<&str>) {
        self.topology
            .lock()
            .expect("topology lock poisoned")
            .insert(
                business.to_string(),
                entries.into_iter().map(str::to_string).collect(),
            );
    }
}
