// ABOUTME: Timestamped record of what the shift controller did, in order.
// ABOUTME: Shared between the controller and callers so ordering can be inspected afterwards.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

use crate::types::{ListenerId, Scale, TargetGroupId, TaskDefinitionRef, TaskSetId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ShiftEvent {
    TaskSetCreated {
        task_set: TaskSetId,
        target_group: TargetGroupId,
        task_definition: TaskDefinitionRef,
    },
    TargetsRegistered {
        target_group: TargetGroupId,
        count: usize,
    },
    ThresholdMet {
        task_set: TaskSetId,
        rounds: u32,
    },
    TestRouted {
        target_group: TargetGroupId,
    },
    Validated,
    Repointed {
        listener: ListenerId,
        from: TargetGroupId,
        to: TargetGroupId,
    },
    Scaled {
        task_set: TaskSetId,
        scale: Scale,
    },
    TargetsDeregistered {
        target_group: TargetGroupId,
        count: usize,
    },
    TaskSetDeleted {
        task_set: TaskSetId,
    },
    Aborted {
        task_set: TaskSetId,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct JournalEntry {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: ShiftEvent,
}

/// Append-only event log. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct ShiftJournal {
    entries: Arc<Mutex<Vec<JournalEntry>>>,
}

impl ShiftJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: ShiftEvent) {
        tracing::debug!(?event, "shift journal");
        self.entries.lock().push(JournalEntry {
            at: Utc::now(),
            event,
        });
    }

    pub fn entries(&self) -> Vec<JournalEntry> {
        self.entries.lock().clone()
    }

    pub fn events(&self) -> Vec<ShiftEvent> {
        self.entries.lock().iter().map(|e| e.event.clone()).collect()
    }

    /// Index of the first event matching `predicate`.
    pub fn position(&self, predicate: impl Fn(&ShiftEvent) -> bool) -> Option<usize> {
        self.entries.lock().iter().position(|e| predicate(&e.event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_entries_in_order() {
        let journal = ShiftJournal::new();
        let handle = journal.clone();

        journal.record(ShiftEvent::Validated);
        handle.record(ShiftEvent::Aborted {
            task_set: TaskSetId::new("web-ts-2"),
        });

        let events = journal.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], ShiftEvent::Validated);
        assert_eq!(
            journal.position(|e| matches!(e, ShiftEvent::Aborted { .. })),
            Some(1)
        );
    }

    #[test]
    fn entries_serialize_flat() {
        let journal = ShiftJournal::new();
        journal.record(ShiftEvent::TestRouted {
            target_group: TargetGroupId::new("web-green"),
        });
        let json = serde_json::to_value(&journal.entries()[0]).unwrap();
        assert_eq!(json["event"], "test_routed");
        assert_eq!(json["target_group"], "web-green");
        assert!(json["at"].is_string());
    }
}
