//! RecordingOutput: an `OutputHandle` that keeps every call in order
//!
//! Used to drive a single node without a running cluster.

use crate::fact::{Anchor, AnchorId, ChannelId};
use crate::gateway::{EmitError, OutputHandle};
use crate::schema::FieldValues;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    Emit {
        channel: ChannelId,
        anchor: AnchorId,
        values: FieldValues,
    },
    Ack(AnchorId),
    Fail(AnchorId),
}

#[derive(Debug, Default)]
pub struct RecordingOutput {
    events: Mutex<Vec<OutputEvent>>,
    rejecting: Mutex<HashSet<ChannelId>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every later emission on `channel`.
    pub fn reject_channel(&self, channel: ChannelId) {
        lock(&self.rejecting).insert(channel);
    }

    pub fn events(&self) -> Vec<OutputEvent> {
        lock(&self.events).clone()
    }

    /// Values emitted on `channel`, in emission order
    pub fn emissions_on(&self, channel: &ChannelId) -> Vec<FieldValues> {
        lock(&self.events)
            .iter()
            .filter_map(|e| match e {
                OutputEvent::Emit { channel: c, values, .. } if c == channel => Some(values.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn emit_count(&self) -> usize {
        self.count(|e| matches!(e, OutputEvent::Emit { .. }))
    }

    pub fn ack_count(&self) -> usize {
        self.count(|e| matches!(e, OutputEvent::Ack(_)))
    }

    pub fn fail_count(&self) -> usize {
        self.count(|e| matches!(e, OutputEvent::Fail(_)))
    }

    fn count(&self, pred: impl Fn(&OutputEvent) -> bool) -> usize {
        lock(&self.events).iter().filter(|e| pred(e)).count()
    }
}

impl OutputHandle for RecordingOutput {
    fn emit(&self, channel: &ChannelId, anchor: &Anchor, values: FieldValues) -> Result<(), EmitError> {
        if lock(&self.rejecting).contains(channel) {
            return Err(EmitError::Rejected {
                channel: channel.clone(),
                reason: "rejected by recording output".into(),
            });
        }
        lock(&self.events).push(OutputEvent::Emit {
            channel: channel.clone(),
            anchor: anchor.id,
            values,
        });
        Ok(())
    }

    fn ack(&self, anchor: &Anchor) {
        lock(&self.events).push(OutputEvent::Ack(anchor.id));
    }

    fn fail(&self, anchor: &Anchor) {
        lock(&self.events).push(OutputEvent::Fail(anchor.id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_channel_records_nothing() {
        let output = RecordingOutput::new();
        let a = ChannelId::from("A");
        output.reject_channel(a.clone());
        let anchor = Anchor::new("ingest");

        let err = output.emit(&a, &anchor, FieldValues::new()).unwrap_err();
        assert!(matches!(err, EmitError::Rejected { .. }));
        assert_eq!(output.emit_count(), 0);

        output.fail(&anchor);
        assert_eq!(output.events(), vec![OutputEvent::Fail(anchor.id)]);
    }
}
