// ABOUTME: Release pipeline boundary: source push, opaque builds, then a shift to the new revision.
// ABOUTME: Fail-closed; a failed build never reaches the control plane.

mod build;
mod run;
mod source;

pub use build::{BuildArtifact, BuildError, BuildRequest, Builder, CommandBuilder};
pub use run::{ReleaseOutcome, register_release, run_release};
pub use source::SourceEvent;

use snafu::Snafu;

use crate::control_plane::ControlPlaneError;
use crate::shift::ShiftError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    #[snafu(display("no pipeline is configured for {service}"))]
    NotConfigured { service: String },

    #[snafu(display("build environment: {message}"))]
    Environment { message: String },

    #[snafu(display("build {build} failed: {source}"))]
    Build { build: String, source: BuildError },

    #[snafu(display("no container named {container} in the task definition"))]
    UnknownContainer { container: String },

    #[snafu(display("failed to register task definition: {source}"))]
    Register { source: ControlPlaneError },

    #[snafu(display("failed to record release: {source}"))]
    RecordRelease { source: ControlPlaneError },

    #[snafu(display("shift failed: {source}"))]
    Shift { source: ShiftError },
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    use crate::blueprint::Blueprint;
    use crate::config::Config;
    use crate::control_plane::{ListenerOps, MemoryControlPlane, ServiceOps, TaskDefinitionOps};
    use crate::reconcile::reconcile;
    use crate::shift::{ShiftController, ShiftOutcome};
    use crate::types::{ImageRef, ListenerId, TargetGroupId};

    const CONFIG: &str = r#"
service: web
approval: automatic
cleanup:
  grace_period: 0s
task:
  containers:
    - name: web
      image: web-repository:latest
      port: 80
    - name: app
      image: app-repository:latest
      port: 3031
pipeline:
  builds:
    - name: app
      command: unused
    - name: web
      command: unused
"#;

    /// Returns a canned image per build, or fails the named builds.
    #[derive(Default)]
    struct ScriptedBuilder {
        failing: Vec<String>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Builder for ScriptedBuilder {
        async fn build(&self, request: &BuildRequest) -> Result<ImageRef, BuildError> {
            self.seen.lock().push(request.name.clone());
            if self.failing.contains(&request.name) {
                return Err(BuildError::Exited {
                    code: Some(1),
                    stderr: "compile error".to_string(),
                });
            }
            Ok(ImageRef::parse(&format!(
                "{}-repository:{}",
                request.container, request.commit
            ))
            .unwrap())
        }
    }

    async fn provisioned(config: &Config) -> MemoryControlPlane {
        let plane = MemoryControlPlane::new();
        let blueprint = Blueprint::from_config(config).unwrap();
        reconcile(&plane, &blueprint, &config.retry).await.unwrap();
        plane
    }

    #[tokio::test(start_paused = true)]
    async fn push_to_tracked_branch_ships_both_images() {
        let config = Config::from_yaml(CONFIG).unwrap();
        let plane = provisioned(&config).await;
        let controller = ShiftController::new(&plane, &plane, config.shift_settings());
        let builder = ScriptedBuilder::default();

        let event = SourceEvent::new("ApplicationRepository", "develop", "c0ffee1");
        let outcome = run_release(&config, &controller, &builder, &event)
            .await
            .unwrap();

        let ReleaseOutcome::Released {
            task_definition,
            shift,
            ..
        } = outcome
        else {
            panic!("release was ignored");
        };
        assert!(matches!(shift, ShiftOutcome::Completed { .. }));

        let images: HashMap<_, _> = task_definition
            .spec
            .containers
            .iter()
            .map(|c| (c.name.as_str(), c.image.to_string()))
            .collect();
        assert_eq!(images["app"], "app-repository:c0ffee1");
        assert_eq!(images["web"], "web-repository:c0ffee1");

        let release = plane.latest_release(&config.service).await.unwrap().unwrap();
        assert_eq!(release.task_definition, task_definition.reference);
        assert_eq!(release.commit.as_deref(), Some("c0ffee1"));
    }

    #[tokio::test]
    async fn other_branches_are_ignored() {
        let config = Config::from_yaml(CONFIG).unwrap();
        let plane = provisioned(&config).await;
        let controller = ShiftController::new(&plane, &plane, config.shift_settings());
        let builder = ScriptedBuilder::default();

        let event = SourceEvent::new("ApplicationRepository", "feature/x", "c0ffee1");
        let outcome = run_release(&config, &controller, &builder, &event)
            .await
            .unwrap();

        assert!(matches!(outcome, ReleaseOutcome::Ignored { .. }));
        assert!(builder.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn failed_build_halts_before_registration() {
        let config = Config::from_yaml(CONFIG).unwrap();
        let plane = provisioned(&config).await;
        let controller = ShiftController::new(&plane, &plane, config.shift_settings());
        let builder = ScriptedBuilder {
            failing: vec!["web".to_string()],
            ..Default::default()
        };

        let event = SourceEvent::new("ApplicationRepository", "develop", "bad0001");
        let err = run_release(&config, &controller, &builder, &event)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::Build { ref build, .. } if build == "web"));
        assert_eq!(builder.seen.lock().len(), 2);
        assert!(plane.list_revisions(&config.family()).await.unwrap().is_empty());
        assert!(plane.latest_release(&config.service).await.unwrap().is_none());

        let production = plane
            .describe_listener(&ListenerId::new("web-production"))
            .await
            .unwrap();
        assert_eq!(production.default_target_group, TargetGroupId::new("web-blue"));
        let service = plane.describe_service(&config.service).await.unwrap();
        assert!(service.task_sets.is_empty());
    }

    #[tokio::test]
    async fn registering_the_same_images_twice_reuses_the_revision() {
        let config = Config::from_yaml(CONFIG).unwrap();
        let plane = provisioned(&config).await;
        let images = vec![(
            "app".to_string(),
            ImageRef::parse("app-repository:v2").unwrap(),
        )];

        let first = register_release(&plane, &config, &images, None).await.unwrap();
        let second = register_release(&plane, &config, &images, None).await.unwrap();
        assert_eq!(first.reference, second.reference);
    }

    #[tokio::test]
    async fn unknown_container_is_rejected() {
        let config = Config::from_yaml(CONFIG).unwrap();
        let plane = provisioned(&config).await;
        let images = vec![(
            "worker".to_string(),
            ImageRef::parse("worker:v1").unwrap(),
        )];

        let err = register_release(&plane, &config, &images, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownContainer { .. }));
    }
}
