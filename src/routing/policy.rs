//! RoutingPolicy trait and routing decision types
//!
//! A policy is pure decision logic: given a fact, which channels should see
//! it next and what single timestamp should it carry. It never blocks,
//! performs no I/O and never touches the graph fragment.

use super::broadcast::BroadcastRouter;
use super::eddy::EddyRouter;
use crate::config::ConfigError;
use crate::fact::{ChannelId, Fact, TimestampSeq};
use crate::schema::{FactFields, Field, OutputSchema};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Per-fact errors raised while reading or routing a delivery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("missing required field '{0}'")]
    MissingField(Field),

    #[error("field '{field}' has type {found}, expected {expected}")]
    WrongFieldType {
        field: Field,
        expected: &'static str,
        found: &'static str,
    },

    #[error("timestamp sequence is empty")]
    EmptyTimestamp,
}

/// The outcome of routing one fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingDecision {
    /// Channels to emit on, without duplicates
    pub destinations: Vec<ChannelId>,
    /// Reconciled timestamp carried on every emission
    pub resolved_timestamp: i64,
}

impl RoutingDecision {
    pub fn new(destinations: Vec<ChannelId>, resolved_timestamp: i64) -> Self {
        Self {
            destinations,
            resolved_timestamp,
        }
    }

    /// True if the fact goes nowhere
    pub fn is_unrouted(&self) -> bool {
        self.destinations.is_empty()
    }

    /// The fields emitted on each destination: the fact's own fields with
    /// the timestamp replaced by the resolved value.
    pub fn outgoing(&self, fact: &Fact) -> FactFields {
        FactFields::new(
            fact.action(),
            fact.is_assertion(),
            fact.graph_fragment().clone(),
            TimestampSeq::single(self.resolved_timestamp),
        )
    }
}

/// Decides where a fact goes next.
pub trait RoutingPolicy: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Every channel this policy can route to
    fn channels(&self) -> &[ChannelId];

    /// Route one fact. Pure: same fact and configuration, same decision.
    fn decide(&self, fact: &Fact) -> Result<RoutingDecision, RouteError>;

    /// One output channel per routable channel, all with the full schema.
    fn declare_outputs(&self) -> OutputSchema {
        OutputSchema::uniform(self.channels())
    }
}

/// Which policy a router runs, chosen when the topology is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Source-aware fan-out (see [`EddyRouter`])
    #[default]
    Eddy,
    /// Static plan: every fact to every channel
    Broadcast,
}

impl PolicyKind {
    pub fn build(self, eddies: Vec<ChannelId>) -> Result<Arc<dyn RoutingPolicy>, ConfigError> {
        Ok(match self {
            Self::Eddy => Arc::new(EddyRouter::new(eddies)?),
            Self::Broadcast => Arc::new(BroadcastRouter::new(eddies)?),
        })
    }
}
