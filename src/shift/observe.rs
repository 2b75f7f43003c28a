// ABOUTME: Derives where a service stands in a shift from one read of the control plane.
// ABOUTME: No local state is kept; approve, abort and rollback all start from an observation.

use serde::Serialize;

use crate::control_plane::{ListenerOps, ReleaseRecord, ServiceDescription, ServiceOps, TaskSet};
use crate::retry::{RetryPolicy, retry};
use crate::types::{ServiceName, TargetGroupId, TaskSetId};

use super::error::{ControlPlaneResultExt, ShiftError};

/// Where a service is in its shift lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ServicePhase {
    /// Provisioned, nothing deployed yet.
    Empty,
    /// One task set serves production at 100%.
    Steady { primary: TaskSet },
    /// A candidate exists on the secondary group; production has not moved.
    AwaitingApproval {
        primary: Option<TaskSet>,
        candidate: TaskSet,
    },
    /// Production forwards to the newest task set but the old one has not
    /// been retired yet. Only forward completion or rollback is allowed.
    Committed {
        previous: Option<TaskSet>,
        current: TaskSet,
    },
    Inconsistent { reason: String },
}

impl ServicePhase {
    pub fn name(&self) -> &'static str {
        match self {
            ServicePhase::Empty => "empty",
            ServicePhase::Steady { .. } => "steady",
            ServicePhase::AwaitingApproval { .. } => "awaiting approval",
            ServicePhase::Committed { .. } => "committed",
            ServicePhase::Inconsistent { .. } => "inconsistent",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidTaskSet {
    pub task_set: TaskSetId,
    pub reason: String,
}

/// Snapshot of one service and how its listeners are bound.
#[derive(Debug, Clone, Serialize)]
pub struct Observation {
    pub service: ServiceDescription,
    pub production_group: TargetGroupId,
    pub test_group: TargetGroupId,
    pub release: Option<ReleaseRecord>,
    pub phase: ServicePhase,
    pub invalid: Vec<InvalidTaskSet>,
}

impl Observation {
    /// Task set currently bound to production, if any.
    pub fn serving(&self) -> Option<&TaskSet> {
        self.service
            .task_sets_on(&self.production_group)
            .max_by_key(|ts| ts.generation)
    }

    pub fn invalid_reason(&self, id: &TaskSetId) -> Option<&str> {
        self.invalid
            .iter()
            .find(|i| &i.task_set == id)
            .map(|i| i.reason.as_str())
    }
}

/// Read the service, its listeners and its release record, and classify.
pub async fn observe_service<P>(
    plane: &P,
    service: &ServiceName,
    policy: &RetryPolicy,
) -> Result<Observation, ShiftError>
where
    P: ListenerOps + ServiceOps,
{
    let description = retry(policy, "describe_service", || plane.describe_service(service))
        .await
        .during("describe_service")?;
    let production = retry(policy, "describe_listener", || {
        plane.describe_listener(&description.production_listener)
    })
    .await
    .during("describe_listener")?;
    let test = retry(policy, "describe_listener", || {
        plane.describe_listener(&description.test_listener)
    })
    .await
    .during("describe_listener")?;
    let release = retry(policy, "latest_release", || plane.latest_release(service))
        .await
        .during("latest_release")?;

    let phase = classify(&description, &production.default_target_group);
    let invalid = find_invalid(&description, release.as_ref());

    Ok(Observation {
        service: description,
        production_group: production.default_target_group,
        test_group: test.default_target_group,
        release,
        phase,
        invalid,
    })
}

/// Classify a service given the group its production listener forwards to.
pub fn classify(service: &ServiceDescription, production: &TargetGroupId) -> ServicePhase {
    if !service.owns_target_group(production) {
        return ServicePhase::Inconsistent {
            reason: format!("production forwards to foreign target group {}", production),
        };
    }

    let mut task_sets: Vec<&TaskSet> = service.task_sets.iter().collect();
    task_sets.sort_by_key(|ts| std::cmp::Reverse(ts.generation));

    match task_sets.as_slice() {
        [] => ServicePhase::Empty,
        [only] if &only.target_group == production && only.scale.is_full() => {
            ServicePhase::Steady {
                primary: (*only).clone(),
            }
        }
        [only] if &only.target_group == production => ServicePhase::Committed {
            previous: None,
            current: (*only).clone(),
        },
        [only] => ServicePhase::AwaitingApproval {
            primary: None,
            candidate: (*only).clone(),
        },
        [newest, older] if newest.target_group == older.target_group => {
            ServicePhase::Inconsistent {
                reason: format!(
                    "task sets {} and {} share target group {}",
                    newest.id, older.id, newest.target_group
                ),
            }
        }
        [newest, older] if &older.target_group == production => ServicePhase::AwaitingApproval {
            primary: Some((*older).clone()),
            candidate: (*newest).clone(),
        },
        [newest, older] => ServicePhase::Committed {
            previous: Some((*older).clone()),
            current: (*newest).clone(),
        },
        more => ServicePhase::Inconsistent {
            reason: format!("{} task sets exist; at most two are expected", more.len()),
        },
    }
}

/// Task sets that violate the validity invariant: bound to a group the
/// service does not own, or running a revision newer than the last release.
pub fn find_invalid(
    service: &ServiceDescription,
    release: Option<&ReleaseRecord>,
) -> Vec<InvalidTaskSet> {
    service
        .task_sets
        .iter()
        .filter_map(|ts| {
            let reason = if !service.owns_target_group(&ts.target_group) {
                format!("bound to foreign target group {}", ts.target_group)
            } else {
                match release {
                    None => "no release recorded for the service".to_string(),
                    Some(r) if ts.task_definition.is_newer_than(&r.task_definition) => format!(
                        "{} is newer than the latest release {}",
                        ts.task_definition, r.task_definition
                    ),
                    Some(_) => return None,
                }
            };
            Some(InvalidTaskSet {
                task_set: ts.id.clone(),
                reason,
            })
        })
        .collect()
}
