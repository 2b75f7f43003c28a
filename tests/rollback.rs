// ABOUTME: Integration tests for rolling a service back.
// ABOUTME: Covers restoring an uncompleted shift exactly, health gating, and rolling back past a retired task set.

mod support;

use cutover::control_plane::{FaultKind, HealthScript, Operation, ServiceOps, TargetGroupOps};
use cutover::shift::{ServicePhase, ShiftController, ShiftError, ShiftEvent, ShiftOutcome};
use cutover::types::TargetGroupId;

use support::{config, production_group, provisioned, release, service, test_group};

#[tokio::test(start_paused = true)]
async fn rollback_before_completion_restores_the_previous_state_exactly() {
    support::init_tracing();
    let config = config("automatic");
    let plane = provisioned(&config).await;
    let controller = ShiftController::new(&plane, &plane, config.shift_settings());

    let v1 = release(&plane, &config, "v1").await;
    controller.initiate_shift(&config.service, &v1).await.unwrap();

    let serving = service(&plane, &config).await;
    let serving_group = production_group(&plane).await;
    let serving_targets = plane
        .describe_target_group(&serving_group)
        .await
        .unwrap()
        .targets;

    // Production gets repointed, then retiring the old task set fails.
    let v2 = release(&plane, &config, "v2").await;
    plane.inject(
        Operation::UpdateTaskSetScale,
        FaultKind::Fail("scale rejected".into()),
        1,
    );
    let err = controller
        .initiate_shift(&config.service, &v2)
        .await
        .unwrap_err();
    assert!(matches!(err, ShiftError::ControlPlane { .. }));
    assert_ne!(production_group(&plane).await, serving_group);

    let observation = controller.observe(&config.service).await.unwrap();
    assert!(matches!(
        observation.phase,
        ServicePhase::Committed { previous: Some(_), .. }
    ));

    let outcome = controller.rollback(&config.service).await.unwrap();
    let ShiftOutcome::RolledBack { primary } = outcome else {
        panic!("expected a rollback, got {outcome:?}");
    };
    assert_eq!(primary.task_definition, v1);

    assert_eq!(service(&plane, &config).await, serving);
    assert_eq!(production_group(&plane).await, serving_group);
    assert_eq!(test_group(&plane).await, serving_group);
    assert_eq!(
        plane
            .describe_target_group(&serving_group)
            .await
            .unwrap()
            .targets,
        serving_targets
    );
}

#[tokio::test(start_paused = true)]
async fn rollback_after_completion_shifts_to_the_previous_revision() {
    let config = config("automatic");
    let plane = provisioned(&config).await;
    let controller = ShiftController::new(&plane, &plane, config.shift_settings());

    let v1 = release(&plane, &config, "v1").await;
    controller.initiate_shift(&config.service, &v1).await.unwrap();
    let v2 = release(&plane, &config, "v2").await;
    controller.initiate_shift(&config.service, &v2).await.unwrap();
    assert_eq!(production_group(&plane).await, TargetGroupId::new("web-blue"));

    let outcome = controller.rollback(&config.service).await.unwrap();
    let ShiftOutcome::RolledBack { primary } = outcome else {
        panic!("expected a rollback, got {outcome:?}");
    };
    assert_eq!(primary.task_definition, v1);
    assert_eq!(production_group(&plane).await, TargetGroupId::new("web-green"));

    let svc = service(&plane, &config).await;
    assert_eq!(svc.task_sets.len(), 1);
    assert_eq!(svc.task_sets[0].task_definition, v1);
    assert!(svc.task_sets[0].scale.is_full());
}

#[tokio::test(start_paused = true)]
async fn rollback_of_the_first_revision_has_nowhere_to_go() {
    let config = config("automatic");
    let plane = provisioned(&config).await;
    let controller = ShiftController::new(&plane, &plane, config.shift_settings());

    let err = controller.rollback(&config.service).await.unwrap_err();
    assert!(matches!(err, ShiftError::NoPreviousRevision(_)));

    let v1 = release(&plane, &config, "v1").await;
    controller.initiate_shift(&config.service, &v1).await.unwrap();
    let err = controller.rollback(&config.service).await.unwrap_err();
    assert!(matches!(err, ShiftError::NoPreviousRevision(_)));
}

#[tokio::test(start_paused = true)]
async fn committed_shift_cannot_be_aborted_but_can_be_finished() {
    let config = config("automatic");
    let plane = provisioned(&config).await;
    let controller = ShiftController::new(&plane, &plane, config.shift_settings());

    let v1 = release(&plane, &config, "v1").await;
    controller.initiate_shift(&config.service, &v1).await.unwrap();
    let v2 = release(&plane, &config, "v2").await;
    plane.inject(
        Operation::DeregisterTargets,
        FaultKind::Fail("deregister rejected".into()),
        1,
    );
    controller
        .initiate_shift(&config.service, &v2)
        .await
        .unwrap_err();

    let err = controller.abort(&config.service).await.unwrap_err();
    assert!(matches!(err, ShiftError::AlreadyCommitted(_)));

    let outcome = controller.approve(&config.service).await.unwrap();
    let ShiftOutcome::Completed { primary, retired } = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(primary.task_definition, v2);
    assert!(retired.is_some());
    assert_eq!(service(&plane, &config).await.task_sets.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn rollback_waits_for_the_previous_targets_to_be_healthy() {
    support::init_tracing();
    let config = config("automatic");
    let plane = provisioned(&config).await;
    let controller = ShiftController::new(&plane, &plane, config.shift_settings());

    let v1 = release(&plane, &config, "v1").await;
    controller.initiate_shift(&config.service, &v1).await.unwrap();
    let old = service(&plane, &config).await.task_sets[0].clone();

    // Completion stops after the old targets were deregistered.
    let v2 = release(&plane, &config, "v2").await;
    plane.inject(
        Operation::DeleteTaskSet,
        FaultKind::Fail("delete rejected".into()),
        1,
    );
    controller
        .initiate_shift(&config.service, &v2)
        .await
        .unwrap_err();
    let serving_group = production_group(&plane).await;
    assert_ne!(serving_group, old.target_group);

    plane.set_health(&v1, HealthScript::Unhealthy);
    let rollback = ShiftController::new(&plane, &plane, config.shift_settings());
    let err = rollback.rollback(&config.service).await.unwrap_err();
    assert!(matches!(err, ShiftError::HealthThresholdNotMet(_)));

    assert_eq!(production_group(&plane).await, serving_group);
    let events = rollback.journal().events();
    assert!(!events.iter().any(|e| matches!(e, ShiftEvent::ThresholdMet { .. })));
    assert!(!events.iter().any(|e| matches!(e, ShiftEvent::Repointed { .. })));
    assert!(!events.iter().any(
        |e| matches!(e, ShiftEvent::Scaled { task_set, scale } if *task_set == old.id && scale.is_full())
    ));

    let observation = rollback.observe(&config.service).await.unwrap();
    assert!(matches!(
        observation.phase,
        ServicePhase::Committed { previous: Some(_), .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn rollback_skips_revisions_that_never_served() {
    let config = config("automatic");
    let plane = provisioned(&config).await;
    let controller = ShiftController::new(&plane, &plane, config.shift_settings());

    let v1 = release(&plane, &config, "v1").await;
    controller.initiate_shift(&config.service, &v1).await.unwrap();

    let v2 = release(&plane, &config, "v2").await;
    plane.set_health(&v2, HealthScript::Unhealthy);
    controller
        .initiate_shift(&config.service, &v2)
        .await
        .unwrap_err();

    let v3 = release(&plane, &config, "v3").await;
    controller.initiate_shift(&config.service, &v3).await.unwrap();
    assert_eq!(plane.served_revisions(&config.service).await.unwrap(), vec![v1.clone(), v3]);

    let outcome = controller.rollback(&config.service).await.unwrap();
    let ShiftOutcome::RolledBack { primary } = outcome else {
        panic!("expected a rollback, got {outcome:?}");
    };
    assert_eq!(primary.task_definition, v1);
    assert_eq!(production_group(&plane).await, primary.target_group);

    let svc = service(&plane, &config).await;
    assert_eq!(svc.task_sets.len(), 1);
    assert_eq!(svc.task_sets[0].task_definition, v1);
}
