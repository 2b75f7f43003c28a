// ABOUTME: State transition methods for blue/green shifts.
// ABOUTME: Each method consumes self and returns the next state on success.

use chrono::Utc;

use crate::control_plane::{
    ControlPlaneError, CreateTaskSet, ListenerOps, ServiceOps, TargetGroupOps, TaskDefinitionOps,
    TaskSet, TaskSetOps,
};
use crate::health::{HealthReport, TargetProbe, wait_until_healthy};
use crate::retry::retry;
use crate::types::{Scale, ServiceName, TaskDefinitionRef};

use super::blue_green::{Shift, ShiftContext, Topology};
use super::error::{ControlPlaneResultExt, ShiftError};
use super::journal::{ShiftEvent, ShiftJournal};
use super::settings::ShiftSettings;
use super::state::{
    CandidateLaunched, Completed, CutOver, Initialized, TargetsHealthy, ValidationRouted,
};

/// Result type for transitions that may need an abort on failure.
pub type TransitionResult<T, S> = Result<Shift<T>, (Shift<S>, ShiftError)>;

/// Outcome of checking a shift's preconditions.
#[derive(Debug)]
pub enum Prepared {
    /// The requested revision already serves production.
    AlreadyCurrent(TaskSet),
    Ready(Shift<Initialized>),
}

// =============================================================================
// Internal Helpers
// =============================================================================

/// Treat "already gone" as success for cleanup calls.
pub(crate) fn ignore_missing(result: Result<(), ControlPlaneError>) -> Result<(), ControlPlaneError> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

/// Tear down a candidate that never received production traffic.
async fn teardown_candidate<P>(
    context: ShiftContext,
    candidate: TaskSet,
    plane: &P,
) -> Result<Shift<Initialized>, ShiftError>
where
    P: ListenerOps + TargetGroupOps + TaskSetOps,
{
    let topology = &context.topology;
    let policy = &context.settings.retry;
    let journal = &context.journal;

    tracing::warn!(
        service = %context.service,
        task_set = %candidate.id,
        "aborting shift, tearing down candidate"
    );

    let test = retry(policy, "describe_listener", || {
        plane.describe_listener(&topology.test)
    })
    .await
    .during("describe_listener")?;

    if test.default_target_group != topology.primary_group {
        retry(policy, "modify_default_action", || {
            plane.modify_default_action(&topology.test, &topology.primary_group)
        })
        .await
        .during("modify_default_action")?;
        journal.record(ShiftEvent::Repointed {
            listener: topology.test.clone(),
            from: test.default_target_group,
            to: topology.primary_group.clone(),
        });
    }

    retry(policy, "deregister_targets", || {
        plane.deregister_targets(&topology.secondary_group, &candidate.endpoints)
    })
    .await
    .during("deregister_targets")?;
    journal.record(ShiftEvent::TargetsDeregistered {
        target_group: topology.secondary_group.clone(),
        count: candidate.endpoints.len(),
    });

    ignore_missing(
        retry(policy, "delete_task_set", || {
            plane.delete_task_set(&context.service, &candidate.id)
        })
        .await,
    )
    .during("delete_task_set")?;
    journal.record(ShiftEvent::TaskSetDeleted {
        task_set: candidate.id.clone(),
    });
    journal.record(ShiftEvent::Aborted {
        task_set: candidate.id,
    });

    Ok(Shift::new(context))
}

// =============================================================================
// Initialized -> CandidateLaunched
// =============================================================================

impl Shift<Initialized> {
    /// Read the service and check every precondition for shifting it to
    /// `task_definition`. Creates nothing.
    ///
    /// # Errors
    ///
    /// Fails if a candidate is already in flight, the revision is newer than
    /// the release ledger, or the production listener forwards somewhere
    /// unexpected.
    pub async fn prepare<P>(
        plane: &P,
        service: &ServiceName,
        task_definition: &TaskDefinitionRef,
        settings: ShiftSettings,
        journal: ShiftJournal,
    ) -> Result<Prepared, ShiftError>
    where
        P: TaskSetOps + ListenerOps + ServiceOps + TaskDefinitionOps,
    {
        let policy = &settings.retry;

        let description = retry(policy, "describe_service", || plane.describe_service(service))
            .await
            .during("describe_service")?;

        let production = retry(policy, "describe_listener", || {
            plane.describe_listener(&description.production_listener)
        })
        .await
        .during("describe_listener")?;

        let primary_group = production.default_target_group;
        let secondary_group = description
            .other_target_group(&primary_group)
            .cloned()
            .ok_or_else(|| ShiftError::ForeignTargetGroup {
                listener: description.production_listener.clone(),
                group: primary_group.clone(),
            })?;

        if let Some(in_flight) = description.task_sets_on(&secondary_group).next() {
            return Err(ShiftError::ShiftInProgress {
                service: service.clone(),
                task_set: in_flight.id.clone(),
            });
        }

        let primary = description
            .task_sets_on(&primary_group)
            .max_by_key(|ts| ts.generation)
            .cloned();

        if let Some(current) = &primary
            && current.task_definition == *task_definition
        {
            tracing::info!(%service, %task_definition, "already serving requested revision");
            return Ok(Prepared::AlreadyCurrent(current.clone()));
        }

        let release = retry(policy, "latest_release", || plane.latest_release(service))
            .await
            .during("latest_release")?
            .ok_or_else(|| ShiftError::NoRelease(service.clone()))?;

        if task_definition.family() != release.task_definition.family()
            || task_definition.is_newer_than(&release.task_definition)
        {
            return Err(ShiftError::UnreleasedRevision {
                requested: task_definition.clone(),
                released: release.task_definition,
            });
        }

        let definition = retry(policy, "describe_task_definition", || {
            plane.describe_task_definition(task_definition)
        })
        .await
        .during("describe_task_definition")?;

        if definition.spec.container(&description.container).is_none() {
            return Err(ShiftError::MissingContainer {
                task_definition: task_definition.clone(),
                container: description.container.clone(),
            });
        }

        let topology = Topology {
            production: description.production_listener.clone(),
            test: description.test_listener.clone(),
            primary_group,
            secondary_group,
        };

        Ok(Prepared::Ready(Shift::new(ShiftContext {
            service: service.clone(),
            topology,
            task_definition: task_definition.clone(),
            primary,
            settings,
            journal,
        })))
    }

    /// Create the candidate task set at 0% on the secondary target group.
    ///
    /// # Errors
    ///
    /// Returns `(self, error)` on failure; nothing needs unwinding.
    #[must_use = "shift state must be used"]
    pub async fn launch_candidate<P: TaskSetOps>(
        self,
        plane: &P,
    ) -> TransitionResult<CandidateLaunched, Initialized> {
        let context = &self.context;
        let request = CreateTaskSet {
            service: context.service.clone(),
            task_definition: context.task_definition.clone(),
            target_group: context.topology.secondary_group.clone(),
            scale: Scale::ZERO,
            client_token: format!(
                "{}-{}-{}",
                context.service,
                context.task_definition.revision(),
                Utc::now().timestamp_millis()
            ),
        };

        let result = retry(&context.settings.retry, "create_task_set", || {
            plane.create_task_set(&request)
        })
        .await
        .during("create_task_set");

        match result {
            Ok(candidate) => {
                tracing::info!(
                    task_set = %candidate.id,
                    target_group = %candidate.target_group,
                    tasks = candidate.endpoints.len(),
                    "candidate task set created"
                );
                self.context.journal.record(ShiftEvent::TaskSetCreated {
                    task_set: candidate.id.clone(),
                    target_group: candidate.target_group.clone(),
                    task_definition: candidate.task_definition.clone(),
                });
                Ok(self.transition(CandidateLaunched { candidate }))
            }
            Err(e) => Err((self, e)),
        }
    }
}

// =============================================================================
// CandidateLaunched -> TargetsHealthy
// =============================================================================

impl Shift<CandidateLaunched> {
    /// Resume a shift from a candidate observed in the control plane.
    pub(crate) fn resume_candidate(context: ShiftContext, candidate: TaskSet) -> Self {
        Shift {
            context,
            state: CandidateLaunched { candidate },
        }
    }

    /// Register the candidate's endpoints and wait until every one of them
    /// crosses the healthy threshold. No traffic reaches the candidate before
    /// this succeeds.
    ///
    /// # Errors
    ///
    /// Returns `(self, error)` on failure to allow abort.
    #[must_use = "shift state must be used"]
    pub async fn register_targets_and_wait<P, Pr>(
        self,
        plane: &P,
        probe: &Pr,
    ) -> TransitionResult<TargetsHealthy, CandidateLaunched>
    where
        P: TargetGroupOps,
        Pr: TargetProbe + ?Sized,
    {
        let outcome = self.await_candidate_health(plane, probe).await;
        match outcome {
            Ok(report) => {
                tracing::info!(task_set = %self.state.candidate.id, %report, "candidate healthy");
                self.context.journal.record(ShiftEvent::ThresholdMet {
                    task_set: self.state.candidate.id.clone(),
                    rounds: report.rounds,
                });
                Ok(Shift {
                    context: self.context,
                    state: TargetsHealthy {
                        candidate: self.state.candidate,
                        report,
                    },
                })
            }
            Err(e) => Err((self, e)),
        }
    }

    async fn await_candidate_health<P, Pr>(
        &self,
        plane: &P,
        probe: &Pr,
    ) -> Result<HealthReport, ShiftError>
    where
        P: TargetGroupOps,
        Pr: TargetProbe + ?Sized,
    {
        let group = &self.context.topology.secondary_group;
        let endpoints = &self.state.candidate.endpoints;
        let settings = &self.context.settings;

        retry(&settings.retry, "register_targets", || {
            plane.register_targets(group, endpoints)
        })
        .await
        .during("register_targets")?;
        self.context.journal.record(ShiftEvent::TargetsRegistered {
            target_group: group.clone(),
            count: endpoints.len(),
        });

        let policy = retry(&settings.retry, "describe_target_group", || {
            plane.describe_target_group(group)
        })
        .await
        .during("describe_target_group")?
        .health_check;

        wait_until_healthy(probe, endpoints, &policy, settings.health_timeout)
            .await
            .map_err(ShiftError::HealthThresholdNotMet)
    }

    /// Tear down the candidate. Production was never touched.
    #[must_use = "shift state must be used"]
    pub async fn abort<P>(self, plane: &P) -> Result<Shift<Initialized>, ShiftError>
    where
        P: ListenerOps + TargetGroupOps + TaskSetOps,
    {
        teardown_candidate(self.context, self.state.candidate, plane).await
    }
}

// =============================================================================
// TargetsHealthy -> ValidationRouted
// =============================================================================

impl Shift<TargetsHealthy> {
    /// Point the test listener at the candidate's target group. A listener
    /// that already forwards there is left alone.
    ///
    /// # Errors
    ///
    /// Returns `(self, error)` on failure to allow abort.
    #[must_use = "shift state must be used"]
    pub async fn route_validation<P: ListenerOps>(
        self,
        plane: &P,
    ) -> TransitionResult<ValidationRouted, TargetsHealthy> {
        let result = self.point_test_listener(plane).await;

        match result {
            Ok(()) => {
                self.context.journal.record(ShiftEvent::TestRouted {
                    target_group: self.context.topology.secondary_group.clone(),
                });
                Ok(Shift {
                    context: self.context,
                    state: ValidationRouted {
                        candidate: self.state.candidate,
                    },
                })
            }
            Err(e) => Err((self, e)),
        }
    }

    async fn point_test_listener<P: ListenerOps>(&self, plane: &P) -> Result<(), ShiftError> {
        let topology = &self.context.topology;
        let policy = &self.context.settings.retry;

        let test = retry(policy, "describe_listener", || {
            plane.describe_listener(&topology.test)
        })
        .await
        .during("describe_listener")?;
        if test.default_target_group == topology.secondary_group {
            return Ok(());
        }

        retry(policy, "modify_default_action", || {
            plane.modify_default_action(&topology.test, &topology.secondary_group)
        })
        .await
        .during("modify_default_action")
    }

    #[must_use = "shift state must be used"]
    pub async fn abort<P>(self, plane: &P) -> Result<Shift<Initialized>, ShiftError>
    where
        P: ListenerOps + TargetGroupOps + TaskSetOps,
    {
        teardown_candidate(self.context, self.state.candidate, plane).await
    }
}

// =============================================================================
// ValidationRouted -> CutOver
// =============================================================================

impl Shift<ValidationRouted> {
    /// Probe the candidate through the test listener, if configured.
    pub async fn validate<Pr: TargetProbe + ?Sized>(&self, probe: &Pr) -> Result<(), ShiftError> {
        let settings = &self.context.settings;
        let Some(check) = &settings.validation else {
            return Ok(());
        };

        wait_until_healthy(
            probe,
            std::slice::from_ref(&check.endpoint),
            &check.health_check,
            settings.health_timeout,
        )
        .await
        .map_err(ShiftError::ValidationFailed)?;

        self.context.journal.record(ShiftEvent::Validated);
        Ok(())
    }

    /// Repoint the production listener to the candidate in one call.
    ///
    /// The call is never blindly repeated. On failure the listener is re-read:
    /// still on the old primary means the shift can be retried as a whole;
    /// already on the candidate means the repoint took effect; anything else
    /// is reported as an ambiguous, fatal state.
    ///
    /// # Errors
    ///
    /// Returns `(self, error)` on failure.
    #[must_use = "shift state must be used"]
    pub async fn cut_over<P: ListenerOps>(
        self,
        plane: &P,
    ) -> TransitionResult<CutOver, ValidationRouted> {
        let topology = &self.context.topology;

        let outcome = match plane
            .modify_default_action(&topology.production, &topology.secondary_group)
            .await
        {
            Ok(()) => Ok(()),
            Err(source) => self.classify_failed_repoint(plane, source).await,
        };

        match outcome {
            Ok(()) => {
                tracing::info!(
                    listener = %topology.production,
                    from = %topology.primary_group,
                    to = %topology.secondary_group,
                    "production repointed"
                );
                self.context.journal.record(ShiftEvent::Repointed {
                    listener: topology.production.clone(),
                    from: topology.primary_group.clone(),
                    to: topology.secondary_group.clone(),
                });
                Ok(Shift {
                    context: self.context,
                    state: CutOver {
                        candidate: self.state.candidate,
                    },
                })
            }
            Err(e) => Err((self, e)),
        }
    }

    async fn classify_failed_repoint<P: ListenerOps>(
        &self,
        plane: &P,
        source: ControlPlaneError,
    ) -> Result<(), ShiftError> {
        let topology = &self.context.topology;
        tracing::warn!(error = %source, "production repoint failed, re-reading listener");

        let observed = retry(&self.context.settings.retry, "describe_listener", || {
            plane.describe_listener(&topology.production)
        })
        .await;

        match observed {
            Ok(listener) if listener.default_target_group == topology.primary_group => {
                Err(ShiftError::CutoverFailed {
                    listener: topology.production.clone(),
                    group: topology.primary_group.clone(),
                    source,
                })
            }
            Ok(listener) if listener.default_target_group == topology.secondary_group => {
                tracing::info!("repoint took effect despite the error");
                Ok(())
            }
            Ok(listener) => Err(ShiftError::AmbiguousListenerState {
                listener: topology.production.clone(),
                detail: format!(
                    "forwards to unexpected target group {}",
                    listener.default_target_group
                ),
            }),
            Err(e) => Err(ShiftError::AmbiguousListenerState {
                listener: topology.production.clone(),
                detail: format!("repoint failed ({}) and the listener is unreadable: {}", source, e),
            }),
        }
    }

    #[must_use = "shift state must be used"]
    pub async fn abort<P>(self, plane: &P) -> Result<Shift<Initialized>, ShiftError>
    where
        P: ListenerOps + TargetGroupOps + TaskSetOps,
    {
        teardown_candidate(self.context, self.state.candidate, plane).await
    }
}

// =============================================================================
// CutOver -> Completed
// =============================================================================

impl Shift<CutOver> {
    /// Retire the old primary.
    ///
    /// Waits out the grace period so in-flight requests drain, scales the
    /// candidate to 100% and the old task set to 0%, deregisters and deletes
    /// the old task set, and points the test listener at the new primary.
    /// Every step is idempotent, so a failed completion can be resumed.
    #[must_use = "shift state must be used"]
    pub async fn complete<P>(self, plane: &P) -> Result<Shift<Completed>, ShiftError>
    where
        P: ListenerOps + TargetGroupOps + TaskSetOps,
    {
        let context = &self.context;
        let policy = &context.settings.retry;
        let topology = &context.topology;
        let journal = &context.journal;
        let candidate = &self.state.candidate;

        let grace = context.settings.grace_period;
        if !grace.is_zero() {
            tracing::info!(?grace, "waiting for in-flight requests to drain");
            tokio::time::sleep(grace).await;
        }

        let primary = retry(policy, "update_task_set_scale", || {
            plane.update_task_set_scale(&context.service, &candidate.id, Scale::FULL)
        })
        .await
        .during("update_task_set_scale")?;
        journal.record(ShiftEvent::Scaled {
            task_set: primary.id.clone(),
            scale: Scale::FULL,
        });

        let mut retired = None;
        if let Some(old) = &context.primary {
            ignore_missing(
                retry(policy, "update_task_set_scale", || {
                    plane.update_task_set_scale(&context.service, &old.id, Scale::ZERO)
                })
                .await
                .map(|_| ()),
            )
            .during("update_task_set_scale")?;
            journal.record(ShiftEvent::Scaled {
                task_set: old.id.clone(),
                scale: Scale::ZERO,
            });

            retry(policy, "deregister_targets", || {
                plane.deregister_targets(&old.target_group, &old.endpoints)
            })
            .await
            .during("deregister_targets")?;
            journal.record(ShiftEvent::TargetsDeregistered {
                target_group: old.target_group.clone(),
                count: old.endpoints.len(),
            });

            ignore_missing(
                retry(policy, "delete_task_set", || {
                    plane.delete_task_set(&context.service, &old.id)
                })
                .await,
            )
            .during("delete_task_set")?;
            journal.record(ShiftEvent::TaskSetDeleted {
                task_set: old.id.clone(),
            });

            retired = Some(old.id.clone());
        }

        let test = retry(policy, "describe_listener", || {
            plane.describe_listener(&topology.test)
        })
        .await
        .during("describe_listener")?;

        if test.default_target_group != topology.secondary_group {
            retry(policy, "modify_default_action", || {
                plane.modify_default_action(&topology.test, &topology.secondary_group)
            })
            .await
            .during("modify_default_action")?;
            journal.record(ShiftEvent::Repointed {
                listener: topology.test.clone(),
                from: test.default_target_group,
                to: topology.secondary_group.clone(),
            });
        }

        tracing::info!(task_set = %primary.id, ?retired, "shift completed");

        Ok(Shift {
            context: self.context,
            state: Completed { primary, retired },
        })
    }
}

// =============================================================================
// Completed - Terminal State
// =============================================================================

impl Shift<Completed> {
    /// Consume the shift and return its journal.
    pub fn finish(self) -> ShiftJournal {
        self.context.journal
    }
}
