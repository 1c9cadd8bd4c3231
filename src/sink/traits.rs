//! Sink trait and the derived-fact record it publishes
//!
//! The conflict set hands each fully matched fact to a sink. Sinks are
//! swappable behind `publish()`; routing never knows which one is in use.

use crate::fact::{AnchorId, ChannelId, Fact};
use crate::schema::FactFields;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A fact that reached the end of the network.
///
/// Serialized with the schema fields at the top level, next to the
/// bookkeeping fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedFact {
    #[serde(flatten)]
    pub fields: FactFields,
    /// The unit of work it was delivered under
    pub anchor: AnchorId,
    /// The component that produced it
    pub source: ChannelId,
    pub derived_at: DateTime<Utc>,
}

impl DerivedFact {
    pub fn from_fact(fact: &Fact, derived_at: DateTime<Utc>) -> Self {
        Self {
            fields: fact.fields.clone(),
            anchor: fact.provenance,
            source: fact.source_channel.clone(),
            derived_at,
        }
    }
}

/// Errors from publishing to a sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink is not connected")]
    NotConnected,

    #[error("no queue server reachable (last tried {endpoint}: {reason})")]
    Unreachable { endpoint: String, reason: String },

    #[error("publish rejected: {0}")]
    Rejected(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// The terminal publishing boundary of the network.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Stable identifier for logs
    fn id(&self) -> &str;

    /// Publish one derived fact. Success means the sink has taken ownership.
    async fn publish(&self, fact: &DerivedFact) -> Result<(), SinkError>;
}
