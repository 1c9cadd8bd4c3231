//! BroadcastRouter: a static plan that offers every fact to every channel.
//!
//! Useful as a baseline against the eddy, and for junctions whose
//! downstream matchers are not equivalent.

use super::policy::{RouteError, RoutingDecision, RoutingPolicy};
use crate::config::ConfigError;
use crate::fact::{ChannelId, Fact};
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct BroadcastRouter {
    channels: Vec<ChannelId>,
}

impl BroadcastRouter {
    pub fn new(channels: Vec<ChannelId>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        if let Some(dup) = channels.iter().find(|c| !seen.insert(*c)) {
            return Err(ConfigError::DuplicateEddy(dup.clone()));
        }
        Ok(Self { channels })
    }
}

impl RoutingPolicy for BroadcastRouter {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    fn channels(&self) -> &[ChannelId] {
        &self.channels
    }

    fn decide(&self, fact: &Fact) -> Result<RoutingDecision, RouteError> {
        let resolved = fact.timestamp().resolve().ok_or(RouteError::EmptyTimestamp)?;
        Ok(RoutingDecision::new(self.channels.clone(), resolved))
    }
}
