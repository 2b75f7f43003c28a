// ABOUTME: status command: listener bindings, task sets and the release ledger of the service.

use std::fmt::Write;

use cutover::diagnostics::{Diagnostics, Warning};
use cutover::error::Result;
use cutover::output::Output;
use cutover::shift::{Observation, observe_service};

use super::Workspace;

pub async fn status(workspace: Workspace, output: Output) -> Result<()> {
    let plane = workspace.open_plane()?;
    let observation =
        observe_service(&plane, &workspace.config.service, &workspace.config.retry).await?;

    let mut diag = Diagnostics::default();
    for invalid in &observation.invalid {
        diag.warn(Warning::invalid_task_set(format!(
            "task set {} is not valid: {}",
            invalid.task_set, invalid.reason
        )));
    }
    if let (Some(serving), Some(release)) = (observation.serving(), &observation.release)
        && release.task_definition.is_newer_than(&serving.task_definition)
    {
        diag.warn(Warning::stale_release(format!(
            "production serves {} but {} was released",
            serving.task_definition, release.task_definition
        )));
    }

    output.detail(&render(&observation), &observation);
    for warning in diag.warnings() {
        output.warning(&warning.message);
    }
    Ok(())
}

fn render(observation: &Observation) -> String {
    let service = &observation.service;
    let mut text = String::new();

    let _ = writeln!(text, "Service:    {} ({})", service.name, observation.phase.name());
    let _ = writeln!(
        text,
        "Production: {} -> {}",
        service.production_listener, observation.production_group
    );
    let _ = writeln!(
        text,
        "Test:       {} -> {}",
        service.test_listener, observation.test_group
    );
    match &observation.release {
        Some(release) => {
            let _ = writeln!(
                text,
                "Released:   {} ({})",
                release.task_definition,
                release.commit.as_deref().unwrap_or("no commit")
            );
        }
        None => {
            let _ = writeln!(text, "Released:   nothing yet");
        }
    }

    if service.task_sets.is_empty() {
        let _ = write!(text, "Task sets:  none");
        return text;
    }

    let _ = writeln!(text, "Task sets:");
    for ts in &service.task_sets {
        let _ = writeln!(
            text,
            "  {:<12} {:<20} {:<16} {:>4}  {} task(s)",
            ts.id.to_string(),
            ts.task_definition.to_string(),
            ts.target_group.to_string(),
            ts.scale.to_string(),
            ts.endpoints.len()
        );
    }
    text.trim_end().to_string()
}
