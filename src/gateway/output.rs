//! OutputHandle: the substrate's emit/ack surface, as seen by a node

use crate::fact::{Anchor, AnchorId, ChannelId};
use crate::schema::FieldValues;
use thiserror::Error;

/// Errors from issuing an emission or settling an anchor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmitError {
    #[error("channel '{0}' was not declared by this node")]
    UndeclaredChannel(ChannelId),

    #[error("emission on '{channel}' carries {emitted:?}, which differs from its declaration")]
    FieldMismatch { channel: ChannelId, emitted: Vec<String> },

    #[error("emission on '{channel}' rejected: {reason}")]
    Rejected { channel: ChannelId, reason: String },

    #[error("anchor {0} is already being dispatched")]
    AnchorInFlight(AnchorId),

    #[error("anchor {0} is not open")]
    AnchorNotOpen(AnchorId),

    #[error("output handle is closed")]
    Closed,
}

/// Handle a node uses to emit facts and settle anchors.
///
/// `emit` returns once the substrate has accepted (or refused) the tuple;
/// it never waits for downstream processing.
pub trait OutputHandle: Send + Sync {
    /// Emit `values` on `channel`, anchored to the delivered unit of work.
    fn emit(&self, channel: &ChannelId, anchor: &Anchor, values: FieldValues) -> Result<(), EmitError>;

    /// Mark the unit of work as fully processed.
    fn ack(&self, anchor: &Anchor);

    /// Mark the unit of work as failed so the substrate may redeliver it.
    fn fail(&self, anchor: &Anchor);
}
