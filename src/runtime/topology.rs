//! Topology: who declares which channels, and who listens to them
//!
//! Built before anything runs. `validate()` catches the wiring mistakes a
//! substrate would otherwise only hit at emit time.

use crate::config::ConfigError;
use crate::fact::ChannelId;
use crate::schema::OutputSchema;
use std::collections::BTreeMap;

/// A consumer listening to one producer channel, shuffle-grouped across
/// the consumer's instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub consumer: ChannelId,
    pub producer: ChannelId,
    pub channel: ChannelId,
}

#[derive(Debug, Clone, Default)]
pub struct Topology {
    outputs: BTreeMap<ChannelId, OutputSchema>,
    subscriptions: Vec<Subscription>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component with the channels it emits on.
    pub fn declare(&mut self, component: ChannelId, outputs: OutputSchema) -> Result<(), ConfigError> {
        if self.outputs.contains_key(&component) {
            return Err(ConfigError::DuplicateComponent(component));
        }
        self.outputs.insert(component, outputs);
        Ok(())
    }

    pub fn subscribe(
        &mut self,
        consumer: impl Into<ChannelId>,
        producer: impl Into<ChannelId>,
        channel: impl Into<ChannelId>,
    ) {
        self.subscriptions.push(Subscription {
            consumer: consumer.into(),
            producer: producer.into(),
            channel: channel.into(),
        });
    }

    pub fn components(&self) -> impl Iterator<Item = &ChannelId> {
        self.outputs.keys()
    }

    pub fn outputs(&self, component: &ChannelId) -> Option<&OutputSchema> {
        self.outputs.get(component)
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for schema in self.outputs.values() {
            schema.validate()?;
        }
        for sub in &self.subscriptions {
            if !self.outputs.contains_key(&sub.consumer) {
                return Err(ConfigError::UnknownComponent(sub.consumer.clone()));
            }
            let declared = self
                .outputs
                .get(&sub.producer)
                .ok_or_else(|| ConfigError::UnknownComponent(sub.producer.clone()))?;
            if !declared.contains(&sub.channel) {
                return Err(ConfigError::UndeclaredDestination {
                    producer: Some(sub.producer.clone()),
                    channel: sub.channel.clone(),
                });
            }
        }
        Ok(())
    }

    /// Consumers of `producer`'s `channel`, in subscription order
    pub fn subscribers(&self, producer: &ChannelId, channel: &ChannelId) -> Vec<&ChannelId> {
        self.subscriptions
            .iter()
            .filter(|s| &s.producer == producer && &s.channel == channel)
            .map(|s| &s.consumer)
            .collect()
    }
}
