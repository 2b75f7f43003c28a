// ABOUTME: Integration tests for shifts against a misbehaving control plane.
// ABOUTME: Throttling, lost responses and rejected repoints must never strand production.

mod support;

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use cutover::control_plane::{FaultKind, ListenerOps, MemoryControlPlane, Operation, PlaneEvent};
use cutover::health::{HealthCheckPolicy, ProbeResult, TargetProbe};
use cutover::shift::{
    Approval, ShiftController, ShiftError, ShiftEvent, ShiftOutcome, ValidationCheck,
};
use cutover::types::{Endpoint, ListenerId, TargetGroupId};

use support::{config, production_group, provisioned, release, service, test_group};

#[tokio::test(start_paused = true)]
async fn repoint_that_times_out_after_applying_still_completes() {
    support::init_tracing();
    let config = config("automatic");
    let plane = provisioned(&config).await;
    let v1 = release(&plane, &config, "v1").await;

    // Both the test and the production repoint lose their responses.
    plane.inject(Operation::ModifyDefaultAction, FaultKind::TimeoutAfterApply, 2);

    let controller = ShiftController::new(&plane, &plane, config.shift_settings());
    let outcome = controller.initiate_shift(&config.service, &v1).await.unwrap();
    assert!(matches!(outcome, ShiftOutcome::Completed { .. }));
    assert_eq!(production_group(&plane).await, TargetGroupId::new("web-green"));
    assert_eq!(test_group(&plane).await, TargetGroupId::new("web-green"));
}

#[tokio::test(start_paused = true)]
async fn throttled_calls_are_retried() {
    let config = config("automatic");
    let plane = provisioned(&config).await;
    let v1 = release(&plane, &config, "v1").await;

    plane.inject(Operation::CreateTaskSet, FaultKind::Throttled, 3);
    plane.inject(Operation::DescribeService, FaultKind::Throttled, 2);

    let controller = ShiftController::new(&plane, &plane, config.shift_settings());
    let outcome = controller.initiate_shift(&config.service, &v1).await.unwrap();
    assert!(matches!(outcome, ShiftOutcome::Completed { .. }));
    assert_eq!(service(&plane, &config).await.task_sets.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_leave_production_untouched() {
    let config = config("automatic");
    let plane = provisioned(&config).await;
    let v1 = release(&plane, &config, "v1").await;

    plane.inject(Operation::CreateTaskSet, FaultKind::Throttled, 10);

    let controller = ShiftController::new(&plane, &plane, config.shift_settings());
    let err = controller
        .initiate_shift(&config.service, &v1)
        .await
        .unwrap_err();
    assert!(matches!(err, ShiftError::ControlPlane { .. }));
    assert!(!err.is_fatal());
    assert_eq!(production_group(&plane).await, TargetGroupId::new("web-blue"));
    assert!(service(&plane, &config).await.task_sets.is_empty());
}

#[tokio::test(start_paused = true)]
async fn lost_create_response_does_not_duplicate_the_candidate() {
    let config = config("automatic");
    let plane = provisioned(&config).await;
    let v1 = release(&plane, &config, "v1").await;

    plane.inject(Operation::CreateTaskSet, FaultKind::TimeoutAfterApply, 1);

    let controller = ShiftController::new(&plane, &plane, config.shift_settings());
    controller.initiate_shift(&config.service, &v1).await.unwrap();

    let created = controller
        .journal()
        .events()
        .iter()
        .filter(|e| matches!(e, ShiftEvent::TaskSetCreated { .. }))
        .count();
    assert_eq!(created, 1);
    assert_eq!(service(&plane, &config).await.task_sets.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn rejected_production_repoint_is_retried_while_unchanged() {
    let config = config("automatic");
    let plane = provisioned(&config).await;
    let v1 = release(&plane, &config, "v1").await;

    let mut settings = config.shift_settings();
    settings.approval = Approval::Manual;
    let controller = ShiftController::new(&plane, &plane, settings);
    controller.initiate_shift(&config.service, &v1).await.unwrap();

    // Test listener already points at the candidate, so the only repoint
    // left is production's.
    plane.inject(
        Operation::ModifyDefaultAction,
        FaultKind::Fail("listener busy".into()),
        1,
    );

    let outcome = controller.approve(&config.service).await.unwrap();
    assert!(matches!(outcome, ShiftOutcome::Completed { .. }));
    assert_eq!(production_group(&plane).await, TargetGroupId::new("web-green"));
}

#[tokio::test(start_paused = true)]
async fn repoint_that_keeps_failing_unwinds_the_candidate() {
    let config = config("automatic");
    let plane = provisioned(&config).await;
    let v1 = release(&plane, &config, "v1").await;

    let mut settings = config.shift_settings();
    settings.approval = Approval::Manual;
    let controller = ShiftController::new(&plane, &plane, settings);
    controller.initiate_shift(&config.service, &v1).await.unwrap();

    plane.inject(
        Operation::ModifyDefaultAction,
        FaultKind::Fail("listener busy".into()),
        config.retry.attempts,
    );

    let err = controller.approve(&config.service).await.unwrap_err();
    assert!(matches!(err, ShiftError::CutoverFailed { .. }));
    assert!(err.is_retryable());
    assert!(!err.is_fatal());

    plane.clear_faults();
    assert_eq!(production_group(&plane).await, TargetGroupId::new("web-blue"));
    assert!(service(&plane, &config).await.task_sets.is_empty());
}

/// Answers the validation probe after arranging faults for the calls that
/// follow it, so they land on the production repoint and its re-read.
struct FaultsBeforeCutover<'a> {
    plane: &'a MemoryControlPlane,
    validation: Endpoint,
    faults: Vec<(Operation, FaultKind, u32)>,
    armed: AtomicBool,
}

#[async_trait]
impl TargetProbe for FaultsBeforeCutover<'_> {
    async fn probe(&self, target: &Endpoint, policy: &HealthCheckPolicy) -> ProbeResult {
        if *target != self.validation {
            return self.plane.probe(target, policy).await;
        }
        if self.armed.swap(false, Ordering::SeqCst) {
            for (op, kind, times) in &self.faults {
                self.plane.inject(*op, kind.clone(), *times);
            }
        }
        ProbeResult::Healthy
    }
}

#[tokio::test(start_paused = true)]
async fn unreadable_listener_after_failed_repoint_is_fatal_and_left_alone() {
    support::init_tracing();
    let config = config("automatic");
    let plane = provisioned(&config).await;
    let v1 = release(&plane, &config, "v1").await;

    let validation = Endpoint::new("10.0.0.1", 8080);
    let mut settings = config.shift_settings();
    settings.validation = Some(ValidationCheck {
        endpoint: validation.clone(),
        health_check: HealthCheckPolicy::default(),
    });
    let probe = FaultsBeforeCutover {
        plane: &plane,
        validation,
        faults: vec![
            (
                Operation::ModifyDefaultAction,
                FaultKind::Fail("listener busy".into()),
                2,
            ),
            (
                Operation::DescribeListener,
                FaultKind::Fail("access denied".into()),
                config.retry.attempts + 1,
            ),
        ],
        armed: AtomicBool::new(true),
    };

    let controller = ShiftController::new(&plane, &probe, settings);
    let before = plane.history().len();
    let err = controller
        .initiate_shift(&config.service, &v1)
        .await
        .unwrap_err();
    assert!(matches!(err, ShiftError::AmbiguousListenerState { .. }));
    assert!(err.is_fatal());
    assert!(!err.is_retryable());

    // Exactly one repoint was attempted: the second injected failure is unused.
    let production = ListenerId::new("web-production");
    assert!(
        plane
            .modify_default_action(&production, &TargetGroupId::new("web-blue"))
            .await
            .is_err()
    );
    plane.clear_faults();

    let events = controller.journal().events();
    assert!(!events.iter().any(|e| matches!(e, ShiftEvent::Aborted { .. })));
    assert!(
        !plane.history()[before..]
            .iter()
            .any(|e| matches!(e, PlaneEvent::TaskSetDeleted { .. }))
    );

    let svc = service(&plane, &config).await;
    assert_eq!(svc.task_sets.len(), 1);
    assert_eq!(svc.task_sets[0].task_definition, v1);
    assert_eq!(svc.task_sets[0].target_group, TargetGroupId::new("web-green"));
    assert_eq!(production_group(&plane).await, TargetGroupId::new("web-blue"));
}
