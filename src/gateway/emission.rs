//! EmissionGateway: emit to every destination, then settle the anchor once
//!
//! The gateway wraps a routing decision with the reliability contract:
//! 1. Open the anchor in the ledger (refused if already in flight)
//! 2. Emit the outgoing fields on each destination, anchored to the input
//! 3. Settle the ledger entry, then ack or fail per the `AckPolicy`
//!
//! The anchor is never acknowledged before every emission has been issued.

use super::ledger::AckLedger;
use super::output::{EmitError, OutputHandle};
use crate::fact::{Anchor, ChannelId};
use crate::routing::RoutingDecision;
use crate::schema::{FactFields, OutputSchema};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// What to do with an anchor whose fan-out was incomplete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckPolicy {
    /// Best effort: acknowledge even if emissions were rejected or the
    /// fact had nowhere to go.
    AckRegardless,
    /// Fail the anchor if any emission was rejected. An empty route is
    /// still a successful no-op.
    #[default]
    FailOnRejected,
    /// Fail on any rejection, and also when the fact had no destination.
    FailOnUnrouted,
}

impl AckPolicy {
    fn should_fail(self, rejected: usize, unrouted: bool) -> bool {
        match self {
            Self::AckRegardless => false,
            Self::FailOnRejected => rejected > 0,
            Self::FailOnUnrouted => rejected > 0 || unrouted,
        }
    }
}

/// How an anchor was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Acked { emitted: usize },
    Failed { emitted: usize, reason: String },
}

impl Settlement {
    pub fn is_acked(&self) -> bool {
        matches!(self, Self::Acked { .. })
    }

    pub fn emitted(&self) -> usize {
        match self {
            Self::Acked { emitted } | Self::Failed { emitted, .. } => *emitted,
        }
    }
}

/// Issues a node's emissions and settles each anchor exactly once.
pub struct EmissionGateway {
    output: Arc<dyn OutputHandle>,
    declared: OutputSchema,
    policy: AckPolicy,
    ledger: AckLedger,
}

impl EmissionGateway {
    pub fn new(output: Arc<dyn OutputHandle>, declared: OutputSchema, policy: AckPolicy) -> Self {
        Self {
            output,
            declared,
            policy,
            ledger: AckLedger::new(),
        }
    }

    /// Anchors currently between open and settle
    pub fn in_flight(&self) -> usize {
        self.ledger.in_flight()
    }

    /// Emit `fields` on every destination of `decision`, then settle `anchor`.
    ///
    /// Returns an error only if the anchor was already being dispatched;
    /// rejected emissions are reflected in the returned `Settlement`.
    pub fn dispatch(
        &self,
        anchor: &Anchor,
        decision: &RoutingDecision,
        fields: &FactFields,
    ) -> Result<Settlement, EmitError> {
        self.ledger.open(anchor.id)?;

        let values = fields.to_values();
        let emitted_fields = values.fields();
        let mut rejected: Vec<(ChannelId, EmitError)> = Vec::new();

        for channel in &decision.destinations {
            let issued = self
                .declared
                .check_emission(channel, &emitted_fields)
                .and_then(|()| self.output.emit(channel, anchor, values.clone()));
            match issued {
                Ok(()) => {
                    self.ledger.record_emission(anchor.id)?;
                }
                Err(e) => {
                    warn!(anchor = %anchor.id, channel = %channel, error = %e, "emission rejected");
                    rejected.push((channel.clone(), e));
                }
            }
        }

        let emitted = self.ledger.settle(anchor.id)?;
        let unrouted = decision.is_unrouted();

        if self.policy.should_fail(rejected.len(), unrouted) {
            let reason = match rejected.first() {
                Some((_, e)) => format!("{} of {} emissions rejected: {}", rejected.len(), decision.destinations.len(), e),
                None => "no destination for fact".to_string(),
            };
            self.output.fail(anchor);
            warn!(anchor = %anchor.id, %reason, "anchor failed");
            return Ok(Settlement::Failed { emitted, reason });
        }

        self.output.ack(anchor);
        debug!(anchor = %anchor.id, emitted, "anchor acknowledged");
        Ok(Settlement::Acked { emitted })
    }

    /// Acknowledge an anchor that legitimately produced no emissions.
    pub fn consume(&self, anchor: &Anchor) -> Result<Settlement, EmitError> {
        self.ledger.open(anchor.id)?;
        let emitted = self.ledger.settle(anchor.id)?;
        self.output.ack(anchor);
        Ok(Settlement::Acked { emitted })
    }

    /// Fail an anchor without emitting, so the substrate can redeliver it.
    pub fn reject(&self, anchor: &Anchor, reason: impl Into<String>) -> Result<Settlement, EmitError> {
        self.ledger.open(anchor.id)?;
        let emitted = self.ledger.settle(anchor.id)?;
        let reason = reason.into();
        self.output.fail(anchor);
        debug!(anchor = %anchor.id, %reason, "anchor rejected");
        Ok(Settlement::Failed { emitted, reason })
    }
}
