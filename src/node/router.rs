//! RouterNode: hosts a routing policy behind the node lifecycle
//!
//! Per delivery: read the four schema fields, ask the policy for a
//! decision, then hand the decision to the emission gateway. Malformed
//! deliveries fail their anchor so the substrate can redeliver them.

use super::lifecycle::{Node, NodeError};
use crate::config::{parse_node_config, ConfigError, RouterNodeConfig};
use crate::fact::{Anchor, ChannelId, Fact};
use crate::gateway::{EmissionGateway, OutputHandle, Settlement};
use crate::routing::RoutingPolicy;
use crate::schema::{FieldValues, OutputSchema};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

pub struct RouterNode {
    id: ChannelId,
    policy: Arc<dyn RoutingPolicy>,
    gateway: Option<EmissionGateway>,
}

impl RouterNode {
    pub fn new(id: impl Into<ChannelId>, policy: Arc<dyn RoutingPolicy>) -> Self {
        Self {
            id: id.into(),
            policy,
            gateway: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.gateway.is_some()
    }
}

#[async_trait]
impl Node for RouterNode {
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
        info!(
            node = %self.id,
            policy = self.policy.name(),
            channels = declared.len(),
            ack_policy = ?config.ack_policy,
            "router initialized"
        );
        self.gateway = Some(EmissionGateway::new(output, declared, config.ack_policy));
        Ok(())
    }

    async fn on_fact(&mut self, anchor: &Anchor, values: &FieldValues) -> Result<Settlement, NodeError> {
        let gateway = self
            .gateway
            .as_ref()
            .ok_or_else(|| NodeError::NotInitialized(self.id.clone()))?;

        let routed = Fact::from_delivery(anchor, values)
            .and_then(|fact| self.policy.decide(&fact).map(|decision| (fact, decision)));

        match routed {
            Ok((fact, decision)) => Ok(gateway.dispatch(anchor, &decision, &decision.outgoing(&fact))?),
            Err(e) => {
                error!(node = %self.id, anchor = %anchor.id, error = %e, "cannot route fact");
                Ok(gateway.reject(anchor, e.to_string())?)
            }
        }
    }

    fn declare_outputs(&self) -> OutputSchema {
        self.policy.declare_outputs()
    }

    fn shutdown(&mut self) {
        if self.gateway.take().is_some() {
            info!(node = %self.id, "router shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact::{Action, GraphFragment, Statement, TimestampSeq, SUPPRESS};
    use crate::gateway::AckPolicy;
    use crate::routing::EddyRouter;
    use crate::runtime::{OutputEvent, RecordingOutput};
    use crate::schema::{FactFields, Field, FieldValue};

    fn eddies() -> Vec<ChannelId> {
        vec![ChannelId::from("A"), ChannelId::from("B")]
    }

    fn node() -> RouterNode {
        RouterNode::new("junction", Arc::new(EddyRouter::new(eddies()).unwrap()))
    }

    fn initialized(output: Arc<RecordingOutput>) -> RouterNode {
        let mut node = node();
        node.initialize(&serde_json::Value::Null, output).unwrap();
        node
    }

    fn values(is_assertion: bool, stamps: Vec<i64>) -> FieldValues {
        FactFields::new(
            Action::Build,
            is_assertion,
            GraphFragment::new(vec![Statement::new("ex:s", "ex:p", "ex:o")]),
            TimestampSeq::new(stamps),
        )
        .to_values()
    }

    #[test]
    fn declares_one_channel_per_eddy() {
        let names = node().declare_outputs().field_names();
        assert_eq!(names.len(), 2);
        for eddy in eddies() {
            assert_eq!(names[eddy.as_str()], Field::names());
        }
    }

    #[tokio::test]
    async fn unknown_source_fans_out_then_acks() {
        let output = Arc::new(RecordingOutput::new());
        let mut node = initialized(output.clone());
        let anchor = Anchor::new("ingest");

        let settlement = node.on_fact(&anchor, &values(true, vec![5, 3])).await.unwrap();

        assert_eq!(settlement, Settlement::Acked { emitted: 2 });
        assert_eq!(output.emit_count(), 2);
        assert_eq!(output.events().last(), Some(&OutputEvent::Ack(anchor.id)));
        let emitted = FactFields::from_values(&output.emissions_on(&ChannelId::from("B"))[0]).unwrap();
        assert_eq!(emitted.timestamp, TimestampSeq::single(5));
        assert_eq!(emitted.action, Action::Build);
    }

    #[tokio::test]
    async fn known_source_routes_back_with_suppressed_timestamp() {
        let output = Arc::new(RecordingOutput::new());
        let mut node = initialized(output.clone());

        node.on_fact(&Anchor::new("A"), &values(true, vec![3, 3])).await.unwrap();

        assert!(output.emissions_on(&ChannelId::from("B")).is_empty());
        let emitted = output.emissions_on(&ChannelId::from("A"));
        assert_eq!(emitted.len(), 1);
        assert_eq!(
            emitted[0].get(Field::Timestamp),
            Some(&FieldValue::Timestamps(TimestampSeq::single(SUPPRESS)))
        );
    }

    #[tokio::test]
    async fn malformed_delivery_fails_anchor() {
        let output = Arc::new(RecordingOutput::new());
        let mut node = initialized(output.clone());
        let anchor = Anchor::new("ingest");
        let values = FieldValues::new().with(Field::IsAssertion, FieldValue::Bool(true));

        let settlement = node.on_fact(&anchor, &values).await.unwrap();

        assert!(!settlement.is_acked());
        assert_eq!(output.events(), vec![OutputEvent::Fail(anchor.id)]);
    }

    #[tokio::test]
    async fn empty_timestamp_fails_anchor() {
        let output = Arc::new(RecordingOutput::new());
        let mut node = initialized(output.clone());
        let settlement = node.on_fact(&Anchor::new("ingest"), &values(true, Vec::new())).await.unwrap();
        assert!(!settlement.is_acked());
        assert_eq!(output.emit_count(), 0);
    }

    #[tokio::test]
    async fn ack_policy_comes_from_config_mapping() {
        let output = Arc::new(RecordingOutput::new());
        let mut node = RouterNode::new("junction", Arc::new(EddyRouter::new(Vec::new()).unwrap()));
        let mapping = serde_json::json!({ "ack_policy": AckPolicy::FailOnUnrouted });
        node.initialize(&mapping, output.clone()).unwrap();

        let settlement = node.on_fact(&Anchor::new("ingest"), &values(true, vec![1])).await.unwrap();
        assert!(!settlement.is_acked());
        assert_eq!(output.fail_count(), 1);
    }

    #[tokio::test]
    async fn uninitialized_node_refuses_facts() {
        let mut node = node();
        let err = node.on_fact(&Anchor::new("ingest"), &values(true, vec![1])).await.unwrap_err();
        assert!(matches!(err, NodeError::NotInitialized(_)));
    }

    #[tokio::test]
    async fn shutdown_is_idempotent_and_releases_output() {
        let output = Arc::new(RecordingOutput::new());
        let mut node = initialized(output.clone());
        assert_eq!(Arc::strong_count(&output), 2);

        node.shutdown();
        node.shutdown();

        assert!(!node.is_initialized());
        assert_eq!(Arc::strong_count(&output), 1);
    }
}
