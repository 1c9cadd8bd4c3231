//! The fact: a graph fragment plus routing metadata

use super::ids::{Anchor, AnchorId, ChannelId};
use super::timestamp::TimestampSeq;
use crate::schema::{FactFields, FieldValues};
use crate::routing::RouteError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What a receiving matcher should do with a fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Test the fact against existing partial-match state
    #[default]
    Probe,
    /// Incorporate the fact into matching state for future probes
    Build,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Probe => write!(f, "probe"),
            Self::Build => write!(f, "build"),
        }
    }
}

/// One labeled-graph statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Statement {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl Statement {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }
}

/// An immutable bundle of statements.
///
/// Routers pass fragments through untouched; clones share the same
/// allocation. Equality is by content, so a retraction matches its assertion.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Statement>", into = "Vec<Statement>")]
pub struct GraphFragment(Arc<[Statement]>);

impl GraphFragment {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self(statements.into())
    }

    pub fn statements(&self) -> &[Statement] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Statement>> for GraphFragment {
    fn from(statements: Vec<Statement>) -> Self {
        Self::new(statements)
    }
}

impl From<GraphFragment> for Vec<Statement> {
    fn from(fragment: GraphFragment) -> Self {
        fragment.0.to_vec()
    }
}

/// A unit of routed work.
#[derive(Debug, Clone, PartialEq)]
pub struct Fact {
    pub fields: FactFields,
    /// The unit of work this fact was delivered under
    pub provenance: AnchorId,
    /// Channel or component that emitted this fact
    pub source_channel: ChannelId,
}

impl Fact {
    pub fn new(fields: FactFields, provenance: AnchorId, source_channel: impl Into<ChannelId>) -> Self {
        Self {
            fields,
            provenance,
            source_channel: source_channel.into(),
        }
    }

    /// Build a fact from a delivery, extracting fields by their declared names.
    pub fn from_delivery(anchor: &Anchor, values: &FieldValues) -> Result<Self, RouteError> {
        let fields = FactFields::from_values(values)?;
        Ok(Self {
            fields,
            provenance: anchor.id,
            source_channel: anchor.source.clone(),
        })
    }

    pub fn action(&self) -> Action {
        self.fields.action
    }

    pub fn is_assertion(&self) -> bool {
        self.fields.is_assertion
    }

    pub fn graph_fragment(&self) -> &GraphFragment {
        &self.fields.graph_fragment
    }

    pub fn timestamp(&self) -> &TimestampSeq {
        &self.fields.timestamp
    }
}
