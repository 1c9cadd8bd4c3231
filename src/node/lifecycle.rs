//! Node trait: the lifecycle a hosting substrate drives
//!
//! A substrate builds the topology from each node's `declare_outputs()`,
//! calls `initialize()` once per instance, feeds it one fact at a time via
//! `on_fact()`, and calls `shutdown()` on teardown.

use crate::config::ConfigError;
use crate::fact::{Anchor, ChannelId};
use crate::gateway::{EmitError, OutputHandle, Settlement};
use crate::schema::{FieldValues, OutputSchema};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Errors a node could not turn into a settled anchor.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("node '{0}' is not initialized")]
    NotInitialized(ChannelId),

    #[error(transparent)]
    Emit(#[from] EmitError),
}

/// A long-lived worker hosted by a stream-processing substrate.
#[async_trait]
pub trait Node: Send + Sync {
    /// Component id; also the source channel of everything it emits
    fn id(&self) -> &ChannelId;

    /// Store the configuration mapping and output handle for the node's lifetime.
    fn initialize(
        &mut self,
        config: &serde_json::Value,
        output: Arc<dyn OutputHandle>,
    ) -> Result<(), ConfigError>;

    /// Process one delivered fact to completion, settling its anchor.
    ///
    /// Malformed input fails the anchor; it is not an `Err`.
    async fn on_fact(&mut self, anchor: &Anchor, values: &FieldValues) -> Result<Settlement, NodeError>;

    /// Every output channel and its ordered fields
    fn declare_outputs(&self) -> OutputSchema;

    /// Release configuration and output references. Idempotent.
    fn shutdown(&mut self);
}
