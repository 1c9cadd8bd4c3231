//! Output channel declarations
//!
//! A node declares, once, every channel it can emit on and the ordered
//! fields each emission carries. Routers declare one channel per eddy, all
//! with the same schema.

use super::field::Field;
use crate::config::ConfigError;
use crate::fact::ChannelId;
use crate::gateway::EmitError;
use std::collections::BTreeMap;

/// Mapping of output channel to its ordered field list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputSchema {
    channels: BTreeMap<ChannelId, Vec<Field>>,
}

impl OutputSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare every channel with the full field schema.
    pub fn uniform<'a>(channels: impl IntoIterator<Item = &'a ChannelId>) -> Self {
        let mut schema = Self::new();
        for channel in channels {
            schema.declare(channel.clone(), Field::ALL.to_vec());
        }
        schema
    }

    /// Declare a channel. Re-declaring replaces the earlier field list.
    pub fn declare(&mut self, channel: ChannelId, fields: Vec<Field>) {
        self.channels.insert(channel, fields);
    }

    pub fn fields(&self, channel: &ChannelId) -> Option<&[Field]> {
        self.channels.get(channel).map(Vec::as_slice)
    }

    pub fn contains(&self, channel: &ChannelId) -> bool {
        self.channels.contains_key(channel)
    }

    pub fn channels(&self) -> impl Iterator<Item = &ChannelId> {
        self.channels.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ChannelId, &[Field])> {
        self.channels.iter().map(|(c, f)| (c, f.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Declared field names per channel, as registered with a substrate.
    pub fn field_names(&self) -> BTreeMap<String, Vec<&'static str>> {
        self.channels
            .iter()
            .map(|(c, fields)| (c.to_string(), fields.iter().map(Field::as_str).collect()))
            .collect()
    }

    /// Every declared channel must carry exactly `Field::ALL`, in order.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (channel, fields) in &self.channels {
            if fields.as_slice() != Field::ALL {
                return Err(ConfigError::SchemaMismatch {
                    channel: channel.clone(),
                    declared: fields.iter().map(|f| f.as_str().to_string()).collect(),
                });
            }
        }
        Ok(())
    }

    /// Check that an emitted tuple matches what was declared for `channel`.
    pub fn check_emission(&self, channel: &ChannelId, emitted: &[Field]) -> Result<(), EmitError> {
        match self.channels.get(channel) {
            None => Err(EmitError::UndeclaredChannel(channel.clone())),
            Some(declared) if declared.as_slice() != emitted => Err(EmitError::FieldMismatch {
                channel: channel.clone(),
                emitted: emitted.iter().map(|f| f.as_str().to_string()).collect(),
            }),
            Some(_) => Ok(()),
        }
    }
}
