// ABOUTME: release command: run the pipeline for a pushed commit.

use cutover::error::{Error, Result};
use cutover::hooks::{HookContext, HookPoint, HookRunner};
use cutover::output::Output;
use cutover::pipeline::{CommandBuilder, PipelineError, ReleaseOutcome, SourceEvent, run_release};
use cutover::shift::ShiftController;

use super::{Probe, Workspace};

pub async fn release(
    workspace: Workspace,
    commit: String,
    branch: Option<String>,
    repository: Option<String>,
    mut output: Output,
) -> Result<()> {
    output.start_timer();
    let config = &workspace.config;
    let pipeline = config
        .pipeline
        .as_ref()
        .ok_or_else(|| PipelineError::NotConfigured {
            service: config.service.to_string(),
        })?;
    let event = SourceEvent::new(
        repository.unwrap_or_else(|| pipeline.repository.clone()),
        branch.unwrap_or_else(|| pipeline.branch.clone()),
        commit,
    );

    let plane = workspace.open_plane()?;
    let probe = Probe::for_config(config, &plane);
    let controller =
        ShiftController::new(&plane, probe.as_dyn(), config.shift_settings()).force(workspace.force);
    let builder = CommandBuilder::new(&workspace.dir);
    let hooks = HookRunner::new(&workspace.dir);

    output.progress(&format!(
        "Releasing {} from {}@{}",
        config.service,
        event.branch,
        event.short_commit()
    ));

    let context = HookContext::new(config.service.clone(), "release");
    if let Some(result) = hooks.run(HookPoint::PreShift, &context).await
        && !result.success
    {
        return Err(Error::Hook(HookPoint::PreShift.filename()));
    }

    let outcome = match run_release(config, &controller, &builder, &event).await {
        Ok(outcome) => outcome,
        Err(e) => {
            let context = context.with_error(&e);
            if let Some(result) = hooks.run(HookPoint::OnError, &context).await
                && !result.success
            {
                output.warning("on-error hook failed");
            }
            return Err(e.into());
        }
    };

    match &outcome {
        ReleaseOutcome::Ignored { source } => {
            output.success_with(
                &format!(
                    "Ignored push to {}/{}: not the tracked branch",
                    source.repository, source.branch
                ),
                Some(&outcome),
            );
        }
        ReleaseOutcome::Released {
            task_definition,
            shift,
            ..
        } => {
            let context = context
                .with_task_definition(&task_definition.reference)
                .with_outcome(shift.summary());
            if let Some(result) = hooks.run(HookPoint::PostShift, &context).await
                && !result.success
            {
                output.warning("post-shift hook failed");
            }
            output.success_with(&shift.summary(), Some(&outcome));
        }
    }
    Ok(())
}
