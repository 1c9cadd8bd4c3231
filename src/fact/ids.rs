//! Identifiers for channels and units of work

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a channel or component in the network.
///
/// Eddy names, node ids and output stream names all share this type so a
/// fact's source can be compared directly against the set of known eddies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ChannelId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Unique identifier for one delivered unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorId(Uuid);

impl AnchorId {
    /// Create a new random AnchorId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AnchorId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AnchorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The reliability handle for a delivered fact.
///
/// Emissions are anchored to it so the substrate can track completion of a
/// whole fan-out; the node settles it exactly once (ack or fail).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Anchor {
    pub id: AnchorId,
    /// The component that emitted the delivered fact
    pub source: ChannelId,
}

impl Anchor {
    pub fn new(source: impl Into<ChannelId>) -> Self {
        Self {
            id: AnchorId::new(),
            source: source.into(),
        }
    }

    pub fn with_id(id: AnchorId, source: impl Into<ChannelId>) -> Self {
        Self {
            id,
            source: source.into(),
        }
    }
}
