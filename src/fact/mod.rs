//! Facts flowing through the network

mod ids;
mod timestamp;
mod types;

pub use ids::{Anchor, AnchorId, ChannelId};
pub use timestamp::{reconcile, TimestampSeq, SUPPRESS};
pub use types::{Action, Fact, GraphFragment, Statement};
