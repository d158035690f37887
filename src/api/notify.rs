//! Purpose: Completion notifications for window-model operations.
//! Exports: `ModelEvent`.
//! Role: Lets UI or export layers observe outcomes on a channel of their choosing.
//! Invariants: Delivery is best-effort; a dropped receiver never fails an operation.
//! Invariants: `KeyRemoved` is emitted once per transition into the removed state.

use crate::core::error::{Error, ErrorKind};
use std::sync::mpsc::Sender;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ModelEvent {
    RowsLoaded { start: u64, count: u64 },
    RowAdded { index: u64 },
    ScoreUpdated,
    RowUpdated { index: u64 },
    RowRemoved { index: u64 },
    KeyRemoved,
    Failed { kind: ErrorKind, message: String },
}

impl ModelEvent {
    pub(crate) fn failed(err: &Error) -> Self {
        ModelEvent::Failed {
            kind: err.kind(),
            message: err.message().unwrap_or_default().to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Notifier {
    sender: Option<Sender<ModelEvent>>,
}

impl Notifier {
    pub(crate) fn new(sender: Sender<ModelEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    pub(crate) fn emit(&self, event: ModelEvent) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(event);
        }
    }
}
