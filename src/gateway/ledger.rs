//! Per-anchor emission ledger
//!
//! Tracks one counter per anchor currently being dispatched. An anchor is
//! opened once, counts its emissions, and is settled once; settling removes
//! it, so a second settle is refused rather than double-acknowledging.

use super::output::EmitError;
use crate::fact::AnchorId;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct AckLedger {
    open: DashMap<AnchorId, usize>,
}

impl AckLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking an anchor.
    pub fn open(&self, anchor: AnchorId) -> Result<(), EmitError> {
        match self.open.entry(anchor) {
            Entry::Occupied(_) => Err(EmitError::AnchorInFlight(anchor)),
            Entry::Vacant(slot) => {
                slot.insert(0);
                Ok(())
            }
        }
    }

    /// Count one accepted emission. Returns the running count.
    pub fn record_emission(&self, anchor: AnchorId) -> Result<usize, EmitError> {
        let mut count = self
            .open
            .get_mut(&anchor)
            .ok_or(EmitError::AnchorNotOpen(anchor))?;
        *count += 1;
        Ok(*count)
    }

    /// Stop tracking an anchor, returning how many emissions it issued.
    pub fn settle(&self, anchor: AnchorId) -> Result<usize, EmitError> {
        self.open
            .remove(&anchor)
            .map(|(_, count)| count)
            .ok_or(EmitError::AnchorNotOpen(anchor))
    }

    /// Anchors opened but not yet settled
    pub fn in_flight(&self) -> usize {
        self.open.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_emissions_until_settled() {
        let ledger = AckLedger::new();
        let anchor = AnchorId::new();
        ledger.open(anchor).unwrap();
        assert_eq!(ledger.record_emission(anchor).unwrap(), 1);
        assert_eq!(ledger.record_emission(anchor).unwrap(), 2);
        assert_eq!(ledger.in_flight(), 1);
        assert_eq!(ledger.settle(anchor).unwrap(), 2);
        assert_eq!(ledger.in_flight(), 0);
    }

    #[test]
    fn second_settle_is_refused() {
        let ledger = AckLedger::new();
        let anchor = AnchorId::new();
        ledger.open(anchor).unwrap();
        ledger.settle(anchor).unwrap();
        assert_eq!(ledger.settle(anchor), Err(EmitError::AnchorNotOpen(anchor)));
    }

    #[test]
    fn double_open_is_refused() {
        let ledger = AckLedger::new();
        let anchor = AnchorId::new();
        ledger.open(anchor).unwrap();
        assert_eq!(ledger.open(anchor), Err(EmitError::AnchorInFlight(anchor)));
    }

    #[test]
    fn counters_are_independent_per_anchor() {
        let ledger = AckLedger::new();
        let (a, b) = (AnchorId::new(), AnchorId::new());
        ledger.open(a).unwrap();
        ledger.open(b).unwrap();
        ledger.record_emission(a).unwrap();
        ledger.record_emission(a).unwrap();
        ledger.record_emission(b).unwrap();
        assert_eq!(ledger.settle(b).unwrap(), 1);
        assert_eq!(ledger.settle(a).unwrap(), 2);
    }

    #[test]
    fn emission_on_unopened_anchor_is_refused() {
        let ledger = AckLedger::new();
        let anchor = AnchorId::new();
        assert_eq!(ledger.record_emission(anchor), Err(EmitError::AnchorNotOpen(anchor)));
    }
}
