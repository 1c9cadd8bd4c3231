//! Common helpers for network integration tests
//!
//! Fact builders plus a counting match condition so tests can see how many
//! deliveries each eddy received.

#![allow(dead_code)]

use reteflow::{Action, ChannelId, Fact, FactFields, FieldValues, GraphFragment, MatchCondition, Statement, TimestampSeq};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub fn statement(subject: &str, predicate: &str, object: &str) -> Statement {
    Statement::new(subject, predicate, object)
}

pub fn fields(is_assertion: bool, statements: Vec<Statement>, stamps: Vec<i64>) -> FactFields {
    FactFields::new(
        Action::Build,
        is_assertion,
        GraphFragment::new(statements),
        TimestampSeq::new(stamps),
    )
}

pub fn knows(stamps: Vec<i64>) -> FieldValues {
    fields(true, vec![statement("ex:alice", "ex:knows", "ex:bob")], stamps).to_values()
}

pub fn channels(names: &[&str]) -> Vec<ChannelId> {
    names.iter().map(|n| ChannelId::from(*n)).collect()
}

/// A match condition that records every fact it sees and lets through
/// fragments shorter than `max_len`, growing them by one statement.
pub struct Growing {
    pub max_len: usize,
    pub seen: AtomicUsize,
    pub timestamps: std::sync::Mutex<Vec<TimestampSeq>>,
}

impl Growing {
    pub fn new(max_len: usize) -> Arc<Self> {
        Arc::new(Self {
            max_len,
            seen: AtomicUsize::new(0),
            timestamps: std::sync::Mutex::new(Vec::new()),
        })
    }

    pub fn seen(&self) -> usize {
        self.seen.load(Ordering::SeqCst)
    }

    pub fn timestamps(&self) -> Vec<TimestampSeq> {
        self.timestamps.lock().unwrap().clone()
    }
}

impl MatchCondition for Growing {
    fn evaluate(&self, fact: &Fact) -> Option<GraphFragment> {
        self.seen.fetch_add(1, Ordering::SeqCst);
        self.timestamps.lock().unwrap().push(fact.timestamp().clone());
        let statements = fact.graph_fragment().statements();
        if statements.len() >= self.max_len {
            return None;
        }
        let mut grown = statements.to_vec();
        grown.push(statement("ex:derived", "ex:step", &statements.len().to_string()));
        Some(GraphFragment::new(grown))
    }
}
