// ABOUTME: Property tests over arbitrary sequences of shift outcomes.
// ABOUTME: Production always forwards to a provisioned group served by exactly one full task set.

mod support;

use cutover::control_plane::{HealthScript, MemoryControlPlane};
use cutover::config::Config;
use cutover::shift::{Approval, ShiftController, ShiftOutcome};
use cutover::types::{TargetGroupId, TaskDefinitionRef};
use proptest::prelude::*;

use support::{config, production_group, provisioned, release, service, test_group};

#[derive(Debug, Clone, Copy)]
enum Step {
    Healthy,
    Unhealthy,
    Approved,
    Aborted,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        Just(Step::Healthy),
        Just(Step::Unhealthy),
        Just(Step::Approved),
        Just(Step::Aborted),
    ]
}

async fn run_step(
    plane: &MemoryControlPlane,
    config: &Config,
    revision: &TaskDefinitionRef,
    step: Step,
) -> bool {
    let mut settings = config.shift_settings();
    settings.approval = match step {
        Step::Healthy | Step::Unhealthy => Approval::Automatic,
        Step::Approved | Step::Aborted => Approval::Manual,
    };
    if let Step::Unhealthy = step {
        plane.set_health(revision, HealthScript::Unhealthy);
    }
    let controller = ShiftController::new(plane, plane, settings);

    match (step, controller.initiate_shift(&config.service, revision).await) {
        (Step::Healthy, Ok(ShiftOutcome::Completed { .. })) => true,
        (Step::Unhealthy, Err(_)) => false,
        (Step::Approved, Ok(ShiftOutcome::AwaitingApproval { .. })) => {
            let outcome = controller.approve(&config.service).await;
            assert!(matches!(outcome, Ok(ShiftOutcome::Completed { .. })));
            true
        }
        (Step::Aborted, Ok(ShiftOutcome::AwaitingApproval { .. })) => {
            let outcome = controller.abort(&config.service).await;
            assert!(matches!(outcome, Ok(ShiftOutcome::Aborted { .. })));
            false
        }
        (step, other) => panic!("unexpected result for {step:?}: {other:?}"),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn production_stays_on_a_provisioned_group(steps in prop::collection::vec(step(), 1..6)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .start_paused(true)
            .build()
            .unwrap();

        runtime.block_on(async {
            let config = config("automatic");
            let plane = provisioned(&config).await;
            let groups = [TargetGroupId::new("web-blue"), TargetGroupId::new("web-green")];
            let mut serving: Option<TaskDefinitionRef> = None;

            for (i, step) in steps.iter().enumerate() {
                let revision = release(&plane, &config, &format!("r{i}")).await;
                if run_step(&plane, &config, &revision, *step).await {
                    serving = Some(revision);
                }

                let production = production_group(&plane).await;
                assert!(groups.contains(&production));
                assert_eq!(test_group(&plane).await, production);

                let svc = service(&plane, &config).await;
                match &serving {
                    None => assert!(svc.task_sets.is_empty()),
                    Some(revision) => {
                        assert_eq!(svc.task_sets.len(), 1);
                        let primary = &svc.task_sets[0];
                        assert_eq!(&primary.task_definition, revision);
                        assert_eq!(primary.target_group, production);
                        assert!(primary.scale.is_full());
                    }
                }
            }
        });
    }
}
