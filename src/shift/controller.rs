// ABOUTME: Drives blue/green shifts end to end under the service's shift lock.
// ABOUTME: initiate, approve, abort and rollback each start from a fresh observation of the plane.

use serde::Serialize;

use crate::control_plane::{ControlPlane, ServiceOps, TaskSet};
use crate::health::TargetProbe;
use crate::retry::retry;
use crate::types::{ServiceName, TaskDefinitionRef, TaskSetId};

use super::blue_green::{Shift, ShiftContext, Topology};
use super::error::{ControlPlaneResultExt, ShiftError};
use super::journal::ShiftJournal;
use super::lock::ShiftLock;
use super::observe::{Observation, ServicePhase, observe_service};
use super::rollback::{CommittedPair, restore_previous};
use super::settings::{Approval, ShiftSettings};
use super::state::{CandidateLaunched, CutOver, Initialized, ValidationRouted};
use super::transitions::Prepared;

/// What a controller call left behind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ShiftOutcome {
    /// The requested revision already serves production; nothing was created.
    AlreadyCurrent { task_definition: TaskDefinitionRef },
    /// Candidate is healthy and reachable through the test listener.
    AwaitingApproval { candidate: TaskSet },
    Completed {
        primary: TaskSet,
        retired: Option<TaskSetId>,
    },
    Aborted { candidate: TaskSetId },
    RolledBack { primary: TaskSet },
}

impl ShiftOutcome {
    pub fn summary(&self) -> String {
        match self {
            ShiftOutcome::AlreadyCurrent { task_definition } => {
                format!("{} is already serving production", task_definition)
            }
            ShiftOutcome::AwaitingApproval { candidate } => format!(
                "{} ({}) is healthy on {} and awaits approval",
                candidate.id, candidate.task_definition, candidate.target_group
            ),
            ShiftOutcome::Completed { primary, .. } => format!(
                "production now serves {} ({}) from {}",
                primary.id, primary.task_definition, primary.target_group
            ),
            ShiftOutcome::Aborted { candidate } => format!("candidate {} was torn down", candidate),
            ShiftOutcome::RolledBack { primary } => format!(
                "rolled back to {} ({}) on {}",
                primary.id, primary.task_definition, primary.target_group
            ),
        }
    }
}

/// Runs shifts against one control plane.
pub struct ShiftController<'a, P, Pr: ?Sized> {
    plane: &'a P,
    probe: &'a Pr,
    settings: ShiftSettings,
    journal: ShiftJournal,
    force: bool,
}

impl<'a, P, Pr> ShiftController<'a, P, Pr>
where
    P: ControlPlane,
    Pr: TargetProbe + ?Sized,
{
    pub fn new(plane: &'a P, probe: &'a Pr, settings: ShiftSettings) -> Self {
        Self {
            plane,
            probe,
            settings,
            journal: ShiftJournal::new(),
            force: false,
        }
    }

    /// Break a live shift lock instead of failing.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn journal(&self) -> &ShiftJournal {
        &self.journal
    }

    pub fn plane(&self) -> &'a P {
        self.plane
    }

    pub fn settings(&self) -> &ShiftSettings {
        &self.settings
    }

    /// Read-only view of where `service` stands.
    pub async fn observe(&self, service: &ServiceName) -> Result<Observation, ShiftError> {
        observe_service(self.plane, service, &self.settings.retry).await
    }

    /// Shift `service` to `task_definition`.
    ///
    /// With manual approval this stops once the candidate is healthy and the
    /// test listener forwards to it. With automatic approval it also cuts
    /// production over and retires the old task set.
    pub async fn initiate_shift(
        &self,
        service: &ServiceName,
        task_definition: &TaskDefinitionRef,
    ) -> Result<ShiftOutcome, ShiftError> {
        ShiftLock::with_lock(
            self.plane,
            service,
            self.force,
            self.run_shift(service, task_definition, self.settings.approval),
        )
        .await
    }

    /// Cut production over to the candidate awaiting approval, or finish a
    /// shift whose production repoint already happened.
    pub async fn approve(&self, service: &ServiceName) -> Result<ShiftOutcome, ShiftError> {
        ShiftLock::with_lock(self.plane, service, self.force, self.approve_locked(service)).await
    }

    /// Tear down a candidate that has not received production traffic.
    pub async fn abort(&self, service: &ServiceName) -> Result<ShiftOutcome, ShiftError> {
        ShiftLock::with_lock(self.plane, service, self.force, self.abort_locked(service)).await
    }

    /// Put the previous revision back in front of production.
    ///
    /// While the previous task set still exists its targets are re-admitted
    /// and the production listener is pointed back at them. Once it has been
    /// retired a full shift runs, with automatic approval, to the newest older
    /// revision that served production.
    pub async fn rollback(&self, service: &ServiceName) -> Result<ShiftOutcome, ShiftError> {
        ShiftLock::with_lock(self.plane, service, self.force, self.rollback_locked(service)).await
    }

    // =========================================================================
    // Lock-held bodies
    // =========================================================================

    async fn run_shift(
        &self,
        service: &ServiceName,
        task_definition: &TaskDefinitionRef,
        approval: Approval,
    ) -> Result<ShiftOutcome, ShiftError> {
        let settings = ShiftSettings {
            approval,
            ..self.settings.clone()
        };

        let prepared = Shift::<Initialized>::prepare(
            self.plane,
            service,
            task_definition,
            settings,
            self.journal.clone(),
        )
        .await?;

        let shift = match prepared {
            Prepared::AlreadyCurrent(primary) => {
                return Ok(ShiftOutcome::AlreadyCurrent {
                    task_definition: primary.task_definition,
                });
            }
            Prepared::Ready(shift) => shift,
        };

        tracing::info!(
            %service,
            %task_definition,
            from = %shift.topology().primary_group,
            to = %shift.topology().secondary_group,
            "starting shift"
        );

        let launched = shift
            .launch_candidate(self.plane)
            .await
            .map_err(|(_, e)| e)?;

        let routed = self.admit_candidate(launched).await?;

        match approval {
            Approval::Manual => {
                let candidate = routed.state().candidate().clone();
                tracing::info!(task_set = %candidate.id, "candidate awaiting approval");
                Ok(ShiftOutcome::AwaitingApproval { candidate })
            }
            Approval::Automatic => self.validate_and_cut_over(routed).await,
        }
    }

    async fn approve_locked(&self, service: &ServiceName) -> Result<ShiftOutcome, ShiftError> {
        let observation = self.observe(service).await?;

        match observation.phase.clone() {
            ServicePhase::AwaitingApproval { primary, candidate } => {
                if let Some(reason) = observation.invalid_reason(&candidate.id) {
                    return Err(ShiftError::InvalidTaskSet {
                        task_set: candidate.id,
                        reason: reason.to_string(),
                    });
                }
                let context = self.resumed_context(&observation, &candidate, primary);
                let launched = Shift::resume_candidate(context, candidate);
                let routed = self.admit_candidate(launched).await?;
                self.validate_and_cut_over(routed).await
            }
            ServicePhase::Committed { previous, current } => {
                tracing::info!(task_set = %current.id, "resuming committed shift");
                let context = self.resumed_context(&observation, &current, previous);
                self.complete(Shift::resume_committed(context, current)).await
            }
            ServicePhase::Inconsistent { reason } => Err(ShiftError::Inconsistent {
                service: service.clone(),
                reason,
            }),
            ServicePhase::Empty | ServicePhase::Steady { .. } => {
                Err(ShiftError::NothingToApprove(service.clone()))
            }
        }
    }

    async fn abort_locked(&self, service: &ServiceName) -> Result<ShiftOutcome, ShiftError> {
        let observation = self.observe(service).await?;

        match observation.phase.clone() {
            ServicePhase::AwaitingApproval { primary, candidate } => {
                let id = candidate.id.clone();
                let context = self.resumed_context(&observation, &candidate, primary);
                Shift::resume_candidate(context, candidate)
                    .abort(self.plane)
                    .await?;
                Ok(ShiftOutcome::Aborted { candidate: id })
            }
            ServicePhase::Committed { .. } => Err(ShiftError::AlreadyCommitted(service.clone())),
            ServicePhase::Inconsistent { reason } => Err(ShiftError::Inconsistent {
                service: service.clone(),
                reason,
            }),
            ServicePhase::Empty | ServicePhase::Steady { .. } => {
                Err(ShiftError::NothingToAbort(service.clone()))
            }
        }
    }

    async fn rollback_locked(&self, service: &ServiceName) -> Result<ShiftOutcome, ShiftError> {
        let observation = self.observe(service).await?;

        match observation.phase.clone() {
            ServicePhase::Committed {
                previous: Some(previous),
                current,
            } => {
                let pair = CommittedPair {
                    production: observation.service.production_listener.clone(),
                    test: observation.service.test_listener.clone(),
                    previous,
                    current,
                };
                let primary =
                    restore_previous(
                        self.plane,
                        self.probe,
                        service,
                        pair,
                        &self.settings,
                        &self.journal,
                    )
                    .await?;
                Ok(ShiftOutcome::RolledBack { primary })
            }
            ServicePhase::Steady { primary }
            | ServicePhase::Committed {
                previous: None,
                current: primary,
            } => {
                let target = self
                    .last_served_before(service, &primary.task_definition)
                    .await?
                    .ok_or_else(|| ShiftError::NoPreviousRevision(service.clone()))?;
                tracing::info!(
                    %service,
                    from = %primary.task_definition,
                    to = %target,
                    "rolling back by shifting to the last revision that served"
                );
                match self.run_shift(service, &target, Approval::Automatic).await? {
                    ShiftOutcome::Completed { primary, .. } => {
                        Ok(ShiftOutcome::RolledBack { primary })
                    }
                    other => Ok(other),
                }
            }
            ServicePhase::AwaitingApproval { .. } => self.abort_locked(service).await,
            ServicePhase::Inconsistent { reason } => Err(ShiftError::Inconsistent {
                service: service.clone(),
                reason,
            }),
            ServicePhase::Empty => Err(ShiftError::NoPreviousRevision(service.clone())),
        }
    }

    // =========================================================================
    // Shared steps
    // =========================================================================

    /// Register, wait for health and open the test listener, aborting the
    /// candidate if any of it fails.
    async fn admit_candidate(
        &self,
        launched: Shift<CandidateLaunched>,
    ) -> Result<Shift<ValidationRouted>, ShiftError> {
        let healthy = match launched
            .register_targets_and_wait(self.plane, self.probe)
            .await
        {
            Ok(healthy) => healthy,
            Err((launched, e)) => return Err(self.unwound(launched.abort(self.plane).await, e)),
        };

        match healthy.route_validation(self.plane).await {
            Ok(routed) => Ok(routed),
            Err((healthy, e)) => Err(self.unwound(healthy.abort(self.plane).await, e)),
        }
    }

    async fn validate_and_cut_over(
        &self,
        routed: Shift<ValidationRouted>,
    ) -> Result<ShiftOutcome, ShiftError> {
        if let Err(e) = routed.validate(self.probe).await {
            return Err(self.unwound(routed.abort(self.plane).await, e));
        }
        let cut = self.cut_over(routed).await?;
        self.complete(cut).await
    }

    /// Repoint production, retrying the whole step while the listener is
    /// known to still forward to the old primary.
    async fn cut_over(
        &self,
        mut routed: Shift<ValidationRouted>,
    ) -> Result<Shift<CutOver>, ShiftError> {
        let mut backoff = self.settings.retry.backoff();
        let mut attempt = 1;

        loop {
            let outcome = routed.cut_over(self.plane).await;
            match outcome {
                Ok(cut) => return Ok(cut),
                Err((_, e)) if e.is_fatal() => {
                    tracing::error!(
                        error = %e,
                        "production listener state is unknown, manual intervention required"
                    );
                    return Err(e);
                }
                Err((back, e)) if e.is_retryable() && attempt < self.settings.retry.attempts => {
                    tracing::warn!(
                        attempt,
                        error = %e,
                        "cut-over failed with production unchanged, retrying"
                    );
                    backoff.wait().await;
                    attempt += 1;
                    routed = back;
                }
                Err((back, e)) => return Err(self.unwound(back.abort(self.plane).await, e)),
            }
        }
    }

    async fn complete(&self, cut: Shift<CutOver>) -> Result<ShiftOutcome, ShiftError> {
        let done = cut.complete(self.plane).await.inspect_err(|e| {
            tracing::error!(error = %e, "completion failed after cut-over; approve again to resume");
        })?;
        let primary = done.deployed().clone();
        let retired = done.state().retired().cloned();
        if let Err(e) = retry(&self.settings.retry, "record_served", || {
            self.plane.record_served(&primary.service, &primary.task_definition)
        })
        .await
        {
            tracing::warn!(
                error = %e,
                task_definition = %primary.task_definition,
                "failed to record served revision"
            );
        }
        Ok(ShiftOutcome::Completed { primary, retired })
    }

    /// Newest revision of the same family, older than `current`, that
    /// completed a shift.
    async fn last_served_before(
        &self,
        service: &ServiceName,
        current: &TaskDefinitionRef,
    ) -> Result<Option<TaskDefinitionRef>, ShiftError> {
        let served = retry(&self.settings.retry, "served_revisions", || {
            self.plane.served_revisions(service)
        })
        .await
        .during("served_revisions")?;

        Ok(served
            .into_iter()
            .filter(|r| current.is_newer_than(r))
            .max_by_key(|r| r.revision()))
    }

    /// Log an abort that itself failed and hand back the original cause.
    fn unwound(&self, abort: Result<Shift<Initialized>, ShiftError>, cause: ShiftError) -> ShiftError {
        if let Err(abort_error) = abort {
            tracing::error!(
                cause = %cause,
                error = %abort_error,
                "failed to tear down candidate after shift failure"
            );
        }
        cause
    }

    fn resumed_context(
        &self,
        observation: &Observation,
        candidate: &TaskSet,
        primary: Option<TaskSet>,
    ) -> ShiftContext {
        let service = &observation.service;
        let primary_group = primary
            .as_ref()
            .map(|p| p.target_group.clone())
            .or_else(|| service.other_target_group(&candidate.target_group).cloned())
            .unwrap_or_else(|| observation.production_group.clone());

        ShiftContext {
            service: service.name.clone(),
            topology: Topology {
                production: service.production_listener.clone(),
                test: service.test_listener.clone(),
                primary_group,
                secondary_group: candidate.target_group.clone(),
            },
            task_definition: candidate.task_definition.clone(),
            primary,
            settings: self.settings.clone(),
            journal: self.journal.clone(),
        }
    }
}
