//! CollectorSink: in-process sink, no durability

use super::traits::{DerivedFact, Sink, SinkError};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Collects derived facts in memory, in publish order.
#[derive(Debug)]
pub struct CollectorSink {
    id: String,
    facts: Mutex<Vec<DerivedFact>>,
}

impl CollectorSink {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            facts: Mutex::new(Vec::new()),
        }
    }

    fn guard(&self) -> MutexGuard<'_, Vec<DerivedFact>> {
        self.facts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of everything published so far
    pub fn facts(&self) -> Vec<DerivedFact> {
        self.guard().clone()
    }

    /// Drain and return everything published so far.
    pub fn take(&self) -> Vec<DerivedFact> {
        std::mem::take(&mut *self.guard())
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }
}

#[async_trait]
impl Sink for CollectorSink {
    fn id(&self) -> &str {
        &self.id
    }

    async fn publish(&self, fact: &DerivedFact) -> Result<(), SinkError> {
        self.guard().push(fact.clone());
        Ok(())
    }
}
