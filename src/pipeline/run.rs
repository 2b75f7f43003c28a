// ABOUTME: Runs a release: concurrent builds, revision registration, release ledger, shift.
// ABOUTME: Any build failure halts the release before the control plane is touched.

use futures::future::join_all;
use serde::Serialize;
use snafu::{OptionExt, ResultExt};

use crate::config::{Config, resolve_env_map};
use crate::control_plane::{ControlPlane, TaskDefinition};
use crate::health::TargetProbe;
use crate::retry::retry;
use crate::shift::{ShiftController, ShiftOutcome};
use crate::types::ImageRef;

use super::build::{BuildArtifact, BuildRequest, Builder};
use super::source::SourceEvent;
use super::{
    BuildSnafu, EnvironmentSnafu, NotConfiguredSnafu, PipelineError, RecordReleaseSnafu,
    RegisterSnafu, ShiftSnafu, UnknownContainerSnafu,
};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "release", rename_all = "snake_case")]
pub enum ReleaseOutcome {
    /// The push was not to the tracked repository and branch.
    Ignored { source: SourceEvent },
    Released {
        source: SourceEvent,
        artifacts: Vec<BuildArtifact>,
        task_definition: TaskDefinition,
        shift: ShiftOutcome,
    },
}

/// Register a revision of the configured task definition with `images`
/// substituted into their containers, and record it as the latest release.
///
/// Registration is idempotent: the same images yield the same revision.
pub async fn register_release<P: ControlPlane>(
    plane: &P,
    config: &Config,
    images: &[(String, ImageRef)],
    commit: Option<&str>,
) -> Result<TaskDefinition, PipelineError> {
    let policy = &config.retry;
    let mut spec = config.task.to_spec(&config.family());
    for (container, image) in images {
        if !spec.set_image(container, image.clone()) {
            return UnknownContainerSnafu {
                container: container.clone(),
            }
            .fail();
        }
    }

    let task_definition = retry(policy, "register task definition", || {
        plane.register_task_definition(&spec)
    })
    .await
    .context(RegisterSnafu)?;

    retry(policy, "record release", || {
        plane.record_release(&config.service, &task_definition.reference, commit)
    })
    .await
    .context(RecordReleaseSnafu)?;

    tracing::info!(
        service = %config.service,
        task_definition = %task_definition.reference,
        commit,
        "release recorded"
    );
    Ok(task_definition)
}

/// Take `event` through the source, build and deploy stages.
pub async fn run_release<P, Pr, B>(
    config: &Config,
    controller: &ShiftController<'_, P, Pr>,
    builder: &B,
    event: &SourceEvent,
) -> Result<ReleaseOutcome, PipelineError>
where
    P: ControlPlane,
    Pr: TargetProbe + ?Sized,
    B: Builder + ?Sized,
{
    let pipeline = config.pipeline.as_ref().context(NotConfiguredSnafu {
        service: config.service.to_string(),
    })?;

    if !event.accepts(pipeline) {
        tracing::info!(
            repository = %event.repository,
            branch = %event.branch,
            tracked = %pipeline.branch,
            "push is not on the tracked branch, ignoring"
        );
        return Ok(ReleaseOutcome::Ignored {
            source: event.clone(),
        });
    }

    let env = resolve_env_map(&pipeline.env).map_err(|e| {
        EnvironmentSnafu {
            message: e.to_string(),
        }
        .build()
    })?;

    let requests: Vec<BuildRequest> = pipeline
        .builds
        .iter()
        .map(|b| BuildRequest {
            name: b.name.clone(),
            container: b.container().to_string(),
            buildspec: b.buildspec(),
            command: b.command.clone(),
            commit: event.commit.clone(),
            env: env.clone(),
        })
        .collect();

    tracing::info!(
        commit = event.short_commit(),
        builds = requests.len(),
        "running builds"
    );
    let results = join_all(requests.iter().map(|r| builder.build(r))).await;

    let mut artifacts = Vec::with_capacity(results.len());
    let mut first_failure = None;
    for (request, result) in requests.iter().zip(results) {
        match result {
            Ok(image) => artifacts.push(BuildArtifact {
                build: request.name.clone(),
                container: request.container.clone(),
                image,
            }),
            Err(e) => {
                tracing::error!(build = %request.name, error = %e, "build failed");
                if first_failure.is_none() {
                    first_failure = Some((request.name.clone(), e));
                }
            }
        }
    }
    if let Some((build, source)) = first_failure {
        return Err(source).context(BuildSnafu { build });
    }

    let images: Vec<(String, ImageRef)> = artifacts
        .iter()
        .map(|a| (a.container.clone(), a.image.clone()))
        .collect();
    let task_definition =
        register_release(controller.plane(), config, &images, Some(&event.commit)).await?;

    let shift = controller
        .initiate_shift(&config.service, &task_definition.reference)
        .await
        .context(ShiftSnafu)?;

    Ok(ReleaseOutcome::Released {
        source: event.clone(),
        artifacts,
        task_definition,
        shift,
    })
}
