//! QueueSink: durable sink backed by an external queue client
//!
//! The sink serializes each derived fact to JSON bytes keyed by the field
//! schema and hands them to a `QueueClient`. The payload is opaque to the
//! client. Servers are tried in order on (re)connect.

use super::traits::{DerivedFact, Sink, SinkError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

/// Address of one queue server, interpreted by the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueServerSpec {
    pub endpoint: String,
}

impl QueueServerSpec {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl std::fmt::Display for QueueServerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.endpoint)
    }
}

/// Client for a durable queue service.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Connect to `server`. Connecting again replaces any earlier connection.
    async fn connect(&self, server: &QueueServerSpec) -> Result<(), SinkError>;

    /// Append an opaque payload to `queue`.
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), SinkError>;
}

/// A `Sink` that publishes to a named queue through a `QueueClient`.
pub struct QueueSink<C: QueueClient> {
    client: C,
    servers: Vec<QueueServerSpec>,
    queue: String,
    connected: AtomicBool,
}

impl<C: QueueClient> QueueSink<C> {
    pub fn new(client: C, servers: Vec<QueueServerSpec>, queue: impl Into<String>) -> Self {
        Self {
            client,
            servers,
            queue: queue.into(),
            connected: AtomicBool::new(false),
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Connect to the first reachable server.
    pub async fn connect(&self) -> Result<&QueueServerSpec, SinkError> {
        let mut last = None;
        for server in &self.servers {
            match self.client.connect(server).await {
                Ok(()) => {
                    self.connected.store(true, Ordering::Release);
                    info!(server = %server, queue = %self.queue, "queue sink connected");
                    return Ok(server);
                }
                Err(e) => {
                    warn!(server = %server, error = %e, "queue server unreachable");
                    last = Some((server.endpoint.clone(), e.to_string()));
                }
            }
        }
        let (endpoint, reason) = last.unwrap_or_else(|| ("<none>".to_string(), "no servers configured".to_string()));
        Err(SinkError::Unreachable { endpoint, reason })
    }
}

#[async_trait]
impl<C: QueueClient> Sink for QueueSink<C> {
    fn id(&self) -> &str {
        &self.queue
    }

    async fn publish(&self, fact: &DerivedFact) -> Result<(), SinkError> {
        if !self.is_connected() {
            self.connect().await?;
        }
        let payload = serde_json::to_vec(fact)?;
        if let Err(e) = self.client.publish(&self.queue, payload).await {
            // Reconnect on the next attempt; the server may have gone away.
            self.connected.store(false, Ordering::Release);
            return Err(e);
        }
        Ok(())
    }
}
