// ABOUTME: Restores the previous task set of a committed but uncompleted shift.
// ABOUTME: Re-admits the old targets, repoints production back to them, then retires the newer task set.

use crate::control_plane::{ListenerOps, TargetGroupOps, TaskSet, TaskSetOps};
use crate::health::{TargetProbe, wait_until_healthy};
use crate::retry::retry;
use crate::types::{ListenerId, Scale, ServiceName};

use super::error::{ControlPlaneResultExt, ShiftError};
use super::journal::{ShiftEvent, ShiftJournal};
use super::settings::ShiftSettings;
use super::transitions::ignore_missing;

/// The two task sets involved in a committed shift.
#[derive(Debug, Clone)]
pub struct CommittedPair {
    pub production: ListenerId,
    pub test: ListenerId,
    pub previous: TaskSet,
    pub current: TaskSet,
}

/// Put `previous` back in front of production and remove `current`.
///
/// The previous task set's endpoints are registered again and must cross
/// the healthy threshold before the repoint, so this is safe whether
/// completion never started or stopped after deregistering. Returns the
/// restored task set.
///
/// # Errors
///
/// `HealthThresholdNotMet` leaves production on the current group. A failed repoint is classified the same way as a forward cut-over: still
/// on the current group is `CutoverFailed`, anything else is ambiguous.
pub async fn restore_previous<P, Pr>(
    plane: &P,
    probe: &Pr,
    service: &ServiceName,
    pair: CommittedPair,
    settings: &ShiftSettings,
    journal: &ShiftJournal,
) -> Result<TaskSet, ShiftError>
where
    P: ListenerOps + TargetGroupOps + TaskSetOps,
    Pr: TargetProbe + ?Sized,
{
    let policy = &settings.retry;
    let CommittedPair {
        production,
        test,
        previous,
        current,
    } = pair;

    tracing::warn!(
        %service,
        from = %current.id,
        to = %previous.id,
        "rolling back to previous task set"
    );

    retry(policy, "register_targets", || {
        plane.register_targets(&previous.target_group, &previous.endpoints)
    })
    .await
    .during("register_targets")?;
    journal.record(ShiftEvent::TargetsRegistered {
        target_group: previous.target_group.clone(),
        count: previous.endpoints.len(),
    });

    let health_check = retry(policy, "describe_target_group", || {
        plane.describe_target_group(&previous.target_group)
    })
    .await
    .during("describe_target_group")?
    .health_check;
    let report = wait_until_healthy(
        probe,
        &previous.endpoints,
        &health_check,
        settings.health_timeout,
    )
    .await
    .map_err(ShiftError::HealthThresholdNotMet)?;
    tracing::info!(task_set = %previous.id, %report, "previous task set healthy");
    journal.record(ShiftEvent::ThresholdMet {
        task_set: previous.id.clone(),
        rounds: report.rounds,
    });

    if let Err(source) = plane
        .modify_default_action(&production, &previous.target_group)
        .await
    {
        let observed = retry(policy, "describe_listener", || {
            plane.describe_listener(&production)
        })
        .await;
        match observed {
            Ok(l) if l.default_target_group == previous.target_group => {}
            Ok(l) if l.default_target_group == current.target_group => {
                return Err(ShiftError::CutoverFailed {
                    listener: production,
                    group: current.target_group,
                    source,
                });
            }
            Ok(l) => {
                return Err(ShiftError::AmbiguousListenerState {
                    listener: production,
                    detail: format!("forwards to unexpected group {}", l.default_target_group),
                });
            }
            Err(e) => {
                return Err(ShiftError::AmbiguousListenerState {
                    listener: production,
                    detail: format!(
                        "rollback repoint failed ({}) and the listener is unreadable: {}",
                        source, e
                    ),
                });
            }
        }
    }
    journal.record(ShiftEvent::Repointed {
        listener: production.clone(),
        from: current.target_group.clone(),
        to: previous.target_group.clone(),
    });

    retry(policy, "modify_default_action", || {
        plane.modify_default_action(&test, &previous.target_group)
    })
    .await
    .during("modify_default_action")?;
    journal.record(ShiftEvent::Repointed {
        listener: test,
        from: current.target_group.clone(),
        to: previous.target_group.clone(),
    });

    let restored = retry(policy, "update_task_set_scale", || {
        plane.update_task_set_scale(service, &previous.id, Scale::FULL)
    })
    .await
    .during("update_task_set_scale")?;
    journal.record(ShiftEvent::Scaled {
        task_set: restored.id.clone(),
        scale: Scale::FULL,
    });

    retry(policy, "update_task_set_scale", || {
        plane.update_task_set_scale(service, &current.id, Scale::ZERO)
    })
    .await
    .during("update_task_set_scale")?;
    journal.record(ShiftEvent::Scaled {
        task_set: current.id.clone(),
        scale: Scale::ZERO,
    });

    retry(policy, "deregister_targets", || {
        plane.deregister_targets(&current.target_group, &current.endpoints)
    })
    .await
    .during("deregister_targets")?;
    journal.record(ShiftEvent::TargetsDeregistered {
        target_group: current.target_group.clone(),
        count: current.endpoints.len(),
    });

    ignore_missing(
        retry(policy, "delete_task_set", || {
            plane.delete_task_set(service, &current.id)
        })
        .await,
    )
    .during("delete_task_set")?;
    journal.record(ShiftEvent::TaskSetDeleted {
        task_set: current.id,
    });

    tracing::info!(%service, task_set = %restored.id, "rollback complete");
    Ok(restored)
}
