// ABOUTME: Shift state types for the type state pattern.
// ABOUTME: Each state carries the data that must exist at that point of a blue/green shift.

use crate::control_plane::TaskSet;
use crate::health::HealthReport;
use crate::types::TaskSetId;

/// Preconditions checked, nothing created yet.
/// Available actions: `launch_candidate()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Initialized;

/// Candidate task set running at 0% on the secondary target group.
/// Available actions: `register_targets_and_wait()`, `abort()`
#[derive(Debug, Clone)]
pub struct CandidateLaunched {
    pub(crate) candidate: TaskSet,
}

/// Every candidate target crossed the healthy threshold.
/// Available actions: `route_validation()`, `abort()`
#[derive(Debug, Clone)]
pub struct TargetsHealthy {
    pub(crate) candidate: TaskSet,
    pub(crate) report: HealthReport,
}

/// Test listener forwards to the candidate; production is untouched.
/// Available actions: `validate()`, `cut_over()`, `abort()`
#[derive(Debug, Clone)]
pub struct ValidationRouted {
    pub(crate) candidate: TaskSet,
}

/// Production listener forwards to the candidate. Forward-only from here.
/// Available actions: `complete()`
#[derive(Debug, Clone)]
pub struct CutOver {
    pub(crate) candidate: TaskSet,
}

/// Candidate is the primary at 100%; the old task set is gone.
#[derive(Debug, Clone)]
pub struct Completed {
    pub(crate) primary: TaskSet,
    pub(crate) retired: Option<TaskSetId>,
}

impl CandidateLaunched {
    pub fn candidate(&self) -> &TaskSet {
        &self.candidate
    }
}

impl TargetsHealthy {
    pub fn candidate(&self) -> &TaskSet {
        &self.candidate
    }

    pub fn report(&self) -> &HealthReport {
        &self.report
    }
}

impl ValidationRouted {
    pub fn candidate(&self) -> &TaskSet {
        &self.candidate
    }
}

impl CutOver {
    pub fn candidate(&self) -> &TaskSet {
        &self.candidate
    }
}

impl Completed {
    pub fn primary(&self) -> &TaskSet {
        &self.primary
    }

    pub fn retired(&self) -> Option<&TaskSetId> {
        self.retired.as_ref()
    }
}
