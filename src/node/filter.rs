//! FilterNode: a matcher that re-dispatches satisfied facts
//!
//! The match itself is an opaque `MatchCondition`. A satisfied fact comes
//! back as a (possibly augmented) fragment and is routed onward as a probe;
//! an unsatisfied one is simply acknowledged.

use super::lifecycle::{Node, NodeError};
use crate::config::{parse_node_config, ConfigError, RouterNodeConfig};
use crate::fact::{Anchor, ChannelId, Fact, GraphFragment};
use crate::gateway::{EmissionGateway, OutputHandle, Settlement};
use crate::routing::{RouteError, RoutingPolicy};
use crate::schema::{FactFields, FieldValues, OutputSchema};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, trace};

/// A join or pattern condition evaluated against one fact.
pub trait MatchCondition: Send + Sync {
    /// The fragment to pass on if the fact satisfies the condition.
    fn evaluate(&self, fact: &Fact) -> Option<GraphFragment>;
}

impl<F> MatchCondition for F
where
    F: Fn(&Fact) -> Option<GraphFragment> + Send + Sync,
{
    fn evaluate(&self, fact: &Fact) -> Option<GraphFragment> {
        self(fact)
    }
}

pub struct FilterNode {
    id: ChannelId,
    condition: Arc<dyn MatchCondition>,
    policy: Arc<dyn RoutingPolicy>,
    gateway: Option<EmissionGateway>,
}

impl FilterNode {
    pub fn new(
        id: impl Into<ChannelId>,
        condition: Arc<dyn MatchCondition>,
        policy: Arc<dyn RoutingPolicy>,
    ) -> Self {
        Self {
            id: id.into(),
            condition,
            policy,
            gateway: None,
        }
    }

    fn matched(&self, anchor: &Anchor, values: &FieldValues) -> Result<Option<Fact>, RouteError> {
        let fact = Fact::from_delivery(anchor, values)?;
        Ok(self.condition.evaluate(&fact).map(|fragment| {
            let fields = FactFields::probe(fact.is_assertion(), fragment, fact.timestamp().clone());
            Fact::new(fields, fact.provenance, fact.source_channel.clone())
        }))
    }
}

#[async_trait]
impl Node for FilterNode {
    fn id(&self) -> &ChannelId {
        &self.id
    }

    fn initialize(
        &mut self,
        config: &serde_json::Value,
        output: Arc<dyn OutputHandle>,
    ) -> Result<(), ConfigError> {
        let config: RouterNodeConfig = parse_node_config(config)?;
        let declared = self.declare_outputs();
        declared.validate()?;
        info!(node = %self.id, policy = self.policy.name(), "filter initialized");
        self.gateway = Some(EmissionGateway::new(output, declared, config.ack_policy));
        Ok(())
    }

    async fn on_fact(&mut self, anchor: &Anchor, values: &FieldValues) -> Result<Settlement, NodeError> {
        let gateway = self
            .gateway
            .as_ref()
            .ok_or_else(|| NodeError::NotInitialized(self.id.clone()))?;

        let routed = self.matched(anchor, values).and_then(|matched| match matched {
            Some(fact) => self.policy.decide(&fact).map(|decision| Some((fact, decision))),
            None => Ok(None),
        });

        match routed {
            Ok(Some((fact, decision))) => Ok(gateway.dispatch(anchor, &decision, &decision.outgoing(&fact))?),
            Ok(None) => {
                trace!(node = %self.id, anchor = %anchor.id, "no match");
                Ok(gateway.consume(anchor)?)
            }
            Err(e) => {
                error!(node = %self.id, anchor = %anchor.id, error = %e, "cannot evaluate fact");
                Ok(gateway.reject(anchor, e.to_string())?)
            }
        }
    }

    fn declare_outputs(&self) -> OutputSchema {
        self.policy.declare_outputs()
    }

    fn shutdown(&mut self) {
        if self.gateway.take().is_some() {
            info!(node = %self.id, "filter shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact::{Action, Statement, TimestampSeq};
    use crate::routing::BroadcastRouter;
    use crate::runtime::{OutputEvent, RecordingOutput};

    /// Matches facts mentioning `ex:knows` and tags them with an inferred statement.
    fn knows_condition() -> Arc<dyn MatchCondition> {
        Arc::new(|fact: &Fact| {
            let hit = fact
                .graph_fragment()
                .statements()
                .iter()
                .find(|s| s.predicate == "ex:knows")?;
            let mut statements = fact.graph_fragment().statements().to_vec();
            statements.push(Statement::new(hit.object.clone(), "ex:knownBy", hit.subject.clone()));
            Some(GraphFragment::new(statements))
        })
    }

    fn node(output: Arc<RecordingOutput>) -> FilterNode {
        let policy = Arc::new(BroadcastRouter::new(vec![ChannelId::from("conflict-set")]).unwrap());
        let mut node = FilterNode::new("stem-knows", knows_condition(), policy);
        node.initialize(&serde_json::Value::Null, output).unwrap();
        node
    }

    fn values(predicate: &str) -> FieldValues {
        FactFields::new(
            Action::Build,
            false,
            GraphFragment::new(vec![Statement::new("ex:alice", predicate, "ex:bob")]),
            TimestampSeq::new(vec![6, 2]),
        )
        .to_values()
    }

    #[tokio::test]
    async fn match_is_routed_as_probe_with_augmented_fragment() {
        let output = Arc::new(RecordingOutput::new());
        let mut node = node(output.clone());
        let anchor = Anchor::new("junction");

        let settlement = node.on_fact(&anchor, &values("ex:knows")).await.unwrap();

        assert_eq!(settlement, Settlement::Acked { emitted: 1 });
        let out = FactFields::from_values(&output.emissions_on(&ChannelId::from("conflict-set"))[0]).unwrap();
        assert_eq!(out.action, Action::Probe);
        assert!(!out.is_assertion);
        assert_eq!(out.graph_fragment.len(), 2);
        assert_eq!(out.timestamp, TimestampSeq::single(6));
    }

    #[tokio::test]
    async fn no_match_is_acknowledged_without_emission() {
        let output = Arc::new(RecordingOutput::new());
        let mut node = node(output.clone());
        let anchor = Anchor::new("junction");

        node.on_fact(&anchor, &values("ex:likes")).await.unwrap();

        assert_eq!(output.events(), vec![OutputEvent::Ack(anchor.id)]);
    }
}
