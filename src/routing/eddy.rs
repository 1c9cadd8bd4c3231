//! EddyRouter: source-aware fan-out across equivalent matchers
//!
//! A fact coming back from one of the known eddies is handed back to that
//! same eddy, continuing its multi-step match. A fact from anywhere else is
//! unclassified and is offered to every eddy. Timestamps are reconciled
//! pairwise with the newest-strictly-wins rule.

use super::policy::{RouteError, RoutingDecision, RoutingPolicy};
use crate::config::ConfigError;
use crate::fact::{ChannelId, Fact};
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct EddyRouter {
    eddies: Vec<ChannelId>,
    known: HashSet<ChannelId>,
}

impl EddyRouter {
    /// Create a router over `eddies`. Names must be unique so a fact's
    /// source identifies at most one eddy.
    pub fn new(eddies: Vec<ChannelId>) -> Result<Self, ConfigError> {
        let mut known = HashSet::with_capacity(eddies.len());
        for eddy in &eddies {
            if !known.insert(eddy.clone()) {
                return Err(ConfigError::DuplicateEddy(eddy.clone()));
            }
        }
        Ok(Self { eddies, known })
    }

    pub fn eddies(&self) -> &[ChannelId] {
        &self.eddies
    }

    pub fn is_eddy(&self, channel: &ChannelId) -> bool {
        self.known.contains(channel)
    }
}

impl RoutingPolicy for EddyRouter {
    fn name(&self) -> &'static str {
        "eddy"
    }

    fn channels(&self) -> &[ChannelId] {
        &self.eddies
    }

    fn decide(&self, fact: &Fact) -> Result<RoutingDecision, RouteError> {
        let resolved = fact.timestamp().resolve().ok_or(RouteError::EmptyTimestamp)?;

        let destinations = if self.is_eddy(&fact.source_channel) {
            vec![fact.source_channel.clone()]
        } else {
            self.eddies.clone()
        };

        debug!(
            source = %fact.source_channel,
            destinations = destinations.len(),
            resolved,
            "eddy routing decision"
        );
        Ok(RoutingDecision::new(destinations, resolved))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fact::{Action, AnchorId, GraphFragment, Statement, TimestampSeq, SUPPRESS};
    use crate::schema::{FactFields, Field};

    fn router() -> EddyRouter {
        EddyRouter::new(vec![ChannelId::from("A"), ChannelId::from("B")]).unwrap()
    }

    fn fragment() -> GraphFragment {
        GraphFragment::new(vec![Statement::new("ex:alice", "foaf:knows", "ex:bob")])
    }

    fn fact_from(source: &str, is_assertion: bool, stamps: Vec<i64>) -> Fact {
        Fact::new(
            FactFields::new(Action::Probe, is_assertion, fragment(), TimestampSeq::new(stamps)),
            AnchorId::new(),
            source,
        )
    }

    // === Scenario: fact handed back by a known eddy ===
    #[test]
    fn known_source_routes_back_to_itself() {
        let decision = router().decide(&fact_from("A", true, vec![5])).unwrap();
        assert_eq!(decision.destinations, vec![ChannelId::from("A")]);

        let decision = router().decide(&fact_from("B", true, vec![5])).unwrap();
        assert_eq!(decision.destinations, vec![ChannelId::from("B")]);
    }

    // === Scenario: unclassified fact from ingestion ===
    #[test]
    fn unknown_source_broadcasts_to_all_eddies() {
        let decision = router().decide(&fact_from("ingest", true, vec![5])).unwrap();
        assert_eq!(
            decision.destinations,
            vec![ChannelId::from("A"), ChannelId::from("B")]
        );
    }

    #[test]
    fn timestamps_reconcile_pairwise() {
        let decision = router().decide(&fact_from("ingest", true, vec![5, 3])).unwrap();
        assert_eq!(decision.resolved_timestamp, 5);

        let decision = router().decide(&fact_from("ingest", true, vec![3, 3])).unwrap();
        assert_eq!(decision.resolved_timestamp, SUPPRESS);
    }

    #[test]
    fn empty_timestamp_is_a_routing_error() {
        let err = router().decide(&fact_from("A", true, Vec::new())).unwrap_err();
        assert_eq!(err, RouteError::EmptyTimestamp);
    }

    #[test]
    fn routing_ignores_assertion_polarity() {
        let router = router();
        for source in ["A", "B", "ingest"] {
            let asserted = router.decide(&fact_from(source, true, vec![2])).unwrap();
            let retracted = router.decide(&fact_from(source, false, vec![2])).unwrap();
            assert_eq!(asserted.destinations, retracted.destinations);
        }
    }

    #[test]
    fn empty_eddy_set_routes_nowhere() {
        let router = EddyRouter::new(Vec::new()).unwrap();
        let decision = router.decide(&fact_from("ingest", true, vec![1])).unwrap();
        assert!(decision.is_unrouted());
        assert!(router.declare_outputs().is_empty());
    }

    #[test]
    fn duplicate_eddies_are_ambiguous() {
        let err = EddyRouter::new(vec![ChannelId::from("A"), ChannelId::from("A")]).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateEddy(_)));
    }

    #[test]
    fn declares_one_full_schema_channel_per_eddy() {
        let schema = router().declare_outputs();
        assert_eq!(schema.len(), 2);
        for eddy in router().eddies() {
            assert_eq!(schema.fields(eddy), Some(Field::ALL.as_slice()));
        }
    }

    #[test]
    fn decide_leaves_fact_untouched() {
        let fact = fact_from("ingest", true, vec![9, 1]);
        let before = fact.clone();
        router().decide(&fact).unwrap();
        assert_eq!(fact, before);
    }
}
