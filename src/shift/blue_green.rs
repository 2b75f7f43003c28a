// ABOUTME: Blue/green shift struct parameterized by state marker.
// ABOUTME: The context holds everything fixed for the life of one shift.

use crate::control_plane::TaskSet;
use crate::types::{ListenerId, ServiceName, TargetGroupId, TaskDefinitionRef};

use super::journal::ShiftJournal;
use super::settings::ShiftSettings;
use super::state::{Completed, CutOver, Initialized};

/// Listener and target group roles at the start of a shift.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub production: ListenerId,
    pub test: ListenerId,
    /// Group the production listener forwards to.
    pub primary_group: TargetGroupId,
    /// The other provisioned group, which receives the candidate.
    pub secondary_group: TargetGroupId,
}

#[derive(Debug, Clone)]
pub struct ShiftContext {
    pub(crate) service: ServiceName,
    pub(crate) topology: Topology,
    pub(crate) task_definition: TaskDefinitionRef,
    /// Task set serving production when the shift began, if any.
    pub(crate) primary: Option<TaskSet>,
    pub(crate) settings: ShiftSettings,
    pub(crate) journal: ShiftJournal,
}

/// A blue/green shift in progress, parameterized by its current state.
///
/// Methods are only available in the states where they are safe: once
/// production has been repointed (`CutOver`) there is no `abort()`.
#[derive(Debug)]
pub struct Shift<S> {
    pub(crate) context: ShiftContext,
    pub(crate) state: S,
}

impl<S> Shift<S> {
    pub fn service(&self) -> &ServiceName {
        &self.context.service
    }

    pub fn task_definition(&self) -> &TaskDefinitionRef {
        &self.context.task_definition
    }

    pub fn topology(&self) -> &Topology {
        &self.context.topology
    }

    /// The task set serving production when the shift started.
    pub fn primary(&self) -> Option<&TaskSet> {
        self.context.primary.as_ref()
    }

    pub fn journal(&self) -> &ShiftJournal {
        &self.context.journal
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub(crate) fn transition<T>(self, state: T) -> Shift<T> {
        Shift {
            context: self.context,
            state,
        }
    }
}

impl Shift<Initialized> {
    pub(crate) fn new(context: ShiftContext) -> Self {
        Shift {
            context,
            state: Initialized,
        }
    }
}

impl Shift<CutOver> {
    /// Resume a shift whose production repoint already happened.
    pub(crate) fn resume_committed(context: ShiftContext, candidate: TaskSet) -> Self {
        Shift {
            context,
            state: CutOver { candidate },
        }
    }
}

impl Shift<Completed> {
    /// The task set now serving production.
    pub fn deployed(&self) -> &TaskSet {
        &self.state.primary
    }
}
