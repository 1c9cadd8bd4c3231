//! ConflictSetNode: terminal node that hands matched facts to a sink

use super::lifecycle::{Node, NodeError};
use crate::config::{parse_node_config, ConfigError, ConflictSetConfig, RetryConfig};
use crate::fact::{Anchor, ChannelId, Fact};
use crate::gateway::{AckPolicy, EmissionGateway, OutputHandle, Settlement};
use crate::schema::{FieldValues, OutputSchema};
use crate::sink::{DerivedFact, Sink, SinkError};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct ConflictSetNode {
    id: ChannelId,
    sink: Arc<dyn Sink>,
    retry: RetryConfig,
    gateway: Option<EmissionGateway>,
}

impl ConflictSetNode {
    pub fn new(id: impl Into<ChannelId>, sink: Arc<dyn Sink>) -> Self {
        Self {
            id: id.into(),
            sink,
            retry: RetryConfig::default(),
            gateway: None,
        }
    }

    /// Publish with bounded retries, doubling the delay after each failure.
    async fn publish_with_retry(&self, fact: &DerivedFact) -> Result<u32, SinkError> {
        let mut delay = Duration::from_millis(self.retry.backoff_ms);
        let mut attempt = 1;
        loop {
            match self.sink.publish(fact).await {
                Ok(()) => return Ok(attempt),
                Err(e) if attempt < self.retry.max_attempts => {
                    warn!(
                        node = %self.id,
                        sink = self.sink.id(),
                        attempt,
                        error = %e,
                        "publish failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl Node for ConflictSetNode {
    fn id(&self) -> &ChannelId {
        &self.id
    }

    fn initialize(
        &mut self,
        config: &serde_json::Value,
        output: Arc<dyn OutputHandle>,
    ) -> Result<(), ConfigError> {
        let config: ConflictSetConfig = parse_node_config(config)?;
        if config.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be at least 1".into()));
        }
        self.retry = config.retry;
        info!(node = %self.id, sink = self.sink.id(), max_attempts = self.retry.max_attempts, "conflict set initialized");
        self.gateway = Some(EmissionGateway::new(output, self.declare_outputs(), AckPolicy::default()));
        Ok(())
    }

    async fn on_fact(&mut self, anchor: &Anchor, values: &FieldValues) -> Result<Settlement, NodeError> {
        let gateway = self
            .gateway
            .as_ref()
            .ok_or_else(|| NodeError::NotInitialized(self.id.clone()))?;

        let fact = match Fact::from_delivery(anchor, values) {
            Ok(fact) => fact,
            Err(e) => {
                error!(node = %self.id, anchor = %anchor.id, error = %e, "cannot read fact");
                return Ok(gateway.reject(anchor, e.to_string())?);
            }
        };

        let derived = DerivedFact::from_fact(&fact, Utc::now());
        match self.publish_with_retry(&derived).await {
            Ok(attempts) => {
                info!(node = %self.id, anchor = %anchor.id, attempts, "derived fact published");
                Ok(gateway.consume(anchor)?)
            }
            Err(e) => {
                error!(
                    node = %self.id,
                    anchor = %anchor.id,
                    attempts = self.retry.max_attempts,
                    error = %e,
                    "giving up on derived fact"
                );
                Ok(gateway.reject(anchor, e.to_string())?)
            }
        }
    }

    /// Terminal: nothing is emitted downstream.
    fn declare_outputs(&self) -> OutputSchema {
        OutputSchema::new()
    }

    fn shutdown(&mut self) {
        if self.gateway.take().is_some() {
            info!(node = %self.id, "conflict set shut down");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact::{Action, GraphFragment, Statement, TimestampSeq};
    use crate::runtime::{OutputEvent, RecordingOutput};
    use crate::schema::{FactFields, Field, FieldValue};
    use crate::sink::CollectorSink;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` publishes, then accepts.
    struct FlakySink {
        failures: u32,
        calls: AtomicU32,
        inner: CollectorSink,
    }

    impl FlakySink {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                inner: CollectorSink::new("flaky"),
            }
        }
    }

    #[async_trait]
    impl Sink for FlakySink {
        fn id(&self) -> &str {
            "flaky"
        }

        async fn publish(&self, fact: &DerivedFact) -> Result<(), SinkError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(SinkError::Rejected(format!("attempt {}", call + 1)));
            }
            self.inner.publish(fact).await
        }
    }

    fn fast_retry(max_attempts: u32) -> serde_json::Value {
        serde_json::json!({ "retry": { "max_attempts": max_attempts, "backoff_ms": 1 } })
    }

    fn values() -> FieldValues {
        FactFields::new(
            Action::Probe,
            true,
            GraphFragment::new(vec![Statement::new("ex:alice", "ex:knows", "ex:bob")]),
            TimestampSeq::single(9),
        )
        .to_values()
    }

    #[tokio::test]
    async fn publishes_and_acks() {
        let sink = Arc::new(CollectorSink::new("local"));
        let output = Arc::new(RecordingOutput::new());
        let mut node = ConflictSetNode::new("conflict-set", sink.clone());
        node.initialize(&serde_json::Value::Null, output.clone()).unwrap();
        let anchor = Anchor::new("A");

        let settlement = node.on_fact(&anchor, &values()).await.unwrap();

        assert!(settlement.is_acked());
        assert_eq!(output.events(), vec![OutputEvent::Ack(anchor.id)]);
        let published = sink.facts();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].anchor, anchor.id);
        assert_eq!(published[0].source, ChannelId::from("A"));
    }

    #[tokio::test]
    async fn retries_until_sink_accepts() {
        let sink = Arc::new(FlakySink::new(2));
        let output = Arc::new(RecordingOutput::new());
        let mut node = ConflictSetNode::new("conflict-set", sink.clone());
        node.initialize(&fast_retry(3), output.clone()).unwrap();

        let settlement = node.on_fact(&Anchor::new("A"), &values()).await.unwrap();

        assert!(settlement.is_acked());
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
        assert_eq!(sink.inner.len(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_fail_anchor() {
        let sink = Arc::new(FlakySink::new(10));
        let output = Arc::new(RecordingOutput::new());
        let mut node = ConflictSetNode::new("conflict-set", sink.clone());
        node.initialize(&fast_retry(2), output.clone()).unwrap();
        let anchor = Anchor::new("A");

        let settlement = node.on_fact(&anchor, &values()).await.unwrap();

        assert!(!settlement.is_acked());
        assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
        assert_eq!(output.events(), vec![OutputEvent::Fail(anchor.id)]);
    }

    #[tokio::test]
    async fn malformed_delivery_is_not_published() {
        let sink = Arc::new(CollectorSink::new("local"));
        let output = Arc::new(RecordingOutput::new());
        let mut node = ConflictSetNode::new("conflict-set", sink.clone());
        node.initialize(&serde_json::Value::Null, output.clone()).unwrap();

        let values = FieldValues::new().with(Field::Action, FieldValue::Bool(true));
        let settlement = node.on_fact(&Anchor::new("A"), &values).await.unwrap();

        assert!(!settlement.is_acked());
        assert!(sink.is_empty());
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let mut node = ConflictSetNode::new("conflict-set", Arc::new(CollectorSink::new("local")));
        let err = node
            .initialize(&fast_retry(0), Arc::new(RecordingOutput::new()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn declares_no_outputs() {
        let node = ConflictSetNode::new("conflict-set", Arc::new(CollectorSink::new("local")));
        assert!(node.declare_outputs().is_empty());
    }
}
