// ABOUTME: shift, approve, abort and rollback commands.
// ABOUTME: Each runs the controller between the pre-shift and post-shift hooks; failures run on-error.

use std::future::Future;

use cutover::diagnostics::{Diagnostics, Warning};
use cutover::error::{Error, Result};
use cutover::hooks::{HookContext, HookPoint, HookRunner};
use cutover::output::Output;
use cutover::pipeline::register_release;
use cutover::shift::{ShiftController, ShiftError, ShiftOutcome};
use cutover::types::ImageRef;

use super::{Probe, Workspace};

pub async fn shift(
    workspace: Workspace,
    images: Vec<(String, ImageRef)>,
    mut output: Output,
) -> Result<()> {
    output.start_timer();
    let plane = workspace.open_plane()?;
    let probe = Probe::for_config(&workspace.config, &plane);
    let controller = ShiftController::new(&plane, probe.as_dyn(), workspace.config.shift_settings())
        .force(workspace.force);

    let task_definition = register_release(&plane, &workspace.config, &images, None).await?;
    output.progress(&format!(
        "Registered {}; shifting {}",
        task_definition.reference, workspace.config.service
    ));

    let context = HookContext::new(workspace.config.service.clone(), "shift")
        .with_task_definition(&task_definition.reference);
    let outcome = guarded(
        &workspace,
        context,
        &output,
        controller.initiate_shift(&workspace.config.service, &task_definition.reference),
    )
    .await?;

    output.success_with(&outcome.summary(), Some(&outcome));
    Ok(())
}

pub async fn approve(workspace: Workspace, mut output: Output) -> Result<()> {
    output.start_timer();
    let plane = workspace.open_plane()?;
    let probe = Probe::for_config(&workspace.config, &plane);
    let controller = ShiftController::new(&plane, probe.as_dyn(), workspace.config.shift_settings())
        .force(workspace.force);

    output.progress(&format!("Approving shift for {}", workspace.config.service));
    let context = HookContext::new(workspace.config.service.clone(), "approve");
    let outcome = guarded(
        &workspace,
        context,
        &output,
        controller.approve(&workspace.config.service),
    )
    .await?;

    output.success_with(&outcome.summary(), Some(&outcome));
    Ok(())
}

pub async fn abort(workspace: Workspace, mut output: Output) -> Result<()> {
    output.start_timer();
    let plane = workspace.open_plane()?;
    let probe = Probe::for_config(&workspace.config, &plane);
    let controller = ShiftController::new(&plane, probe.as_dyn(), workspace.config.shift_settings())
        .force(workspace.force);

    let context = HookContext::new(workspace.config.service.clone(), "abort");
    let outcome = guarded(
        &workspace,
        context,
        &output,
        controller.abort(&workspace.config.service),
    )
    .await?;

    output.success_with(&outcome.summary(), Some(&outcome));
    Ok(())
}

pub async fn rollback(workspace: Workspace, mut output: Output) -> Result<()> {
    output.start_timer();
    let plane = workspace.open_plane()?;
    let probe = Probe::for_config(&workspace.config, &plane);
    let controller = ShiftController::new(&plane, probe.as_dyn(), workspace.config.shift_settings())
        .force(workspace.force);

    output.progress(&format!("Rolling back {}", workspace.config.service));
    let context = HookContext::new(workspace.config.service.clone(), "rollback");
    let outcome = guarded(
        &workspace,
        context,
        &output,
        controller.rollback(&workspace.config.service),
    )
    .await?;

    output.success_with(&outcome.summary(), Some(&outcome));
    Ok(())
}

/// Run `operation` between hooks. The operation future is not polled when
/// the pre-shift hook fails.
pub(super) async fn guarded<F>(
    workspace: &Workspace,
    context: HookContext,
    output: &Output,
    operation: F,
) -> Result<ShiftOutcome>
where
    F: Future<Output = std::result::Result<ShiftOutcome, ShiftError>>,
{
    let hooks = HookRunner::new(&workspace.dir);
    let mut diag = Diagnostics::default();

    if let Some(result) = hooks.run(HookPoint::PreShift, &context).await
        && !result.success
    {
        if !result.stderr.is_empty() {
            output.error(result.stderr.trim());
        }
        return Err(Error::Hook(HookPoint::PreShift.filename()));
    }

    let outcome = match operation.await {
        Ok(outcome) => outcome,
        Err(e) => {
            if e.is_fatal() {
                tracing::error!(
                    service = %context.service,
                    error = %e,
                    "operator attention required"
                );
            }
            let context = context.with_error(&e);
            if let Some(result) = hooks.run(HookPoint::OnError, &context).await
                && !result.success
            {
                diag.warn(Warning::hook("on-error hook failed"));
            }
            for warning in diag.warnings() {
                output.warning(&warning.message);
            }
            return Err(e.into());
        }
    };

    let context = context.with_outcome(outcome.summary());
    if let Some(result) = hooks.run(HookPoint::PostShift, &context).await
        && !result.success
    {
        diag.warn(Warning::hook(format!(
            "post-shift hook failed with exit code {:?}",
            result.exit_code
        )));
    }

    for warning in diag.warnings() {
        output.warning(&warning.message);
    }
    Ok(outcome)
}
