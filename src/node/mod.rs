//! Nodes hosted by a stream-processing substrate
//!
//! - `RouterNode` hosts a routing policy (eddy or broadcast)
//! - `FilterNode` evaluates a match condition, then routes what matched
//! - `ConflictSetNode` is the terminal node publishing to a sink

mod conflict_set;
mod filter;
mod lifecycle;
mod router;

pub use conflict_set::ConflictSetNode;
pub use filter::{FilterNode, MatchCondition};
pub use lifecycle::{Node, NodeError};
pub use router::RouterNode;
