// ABOUTME: plan and apply commands: reconcile provisioned infrastructure with cutover.yml.

use cutover::blueprint::Blueprint;
use cutover::error::Result;
use cutover::output::Output;
use cutover::reconcile::{plan_against, reconcile};

use super::Workspace;

pub async fn plan(workspace: Workspace, output: Output) -> Result<()> {
    let plane = workspace.open_plane()?;
    let blueprint = Blueprint::from_config(&workspace.config)?;

    let plan = plan_against(&plane, &blueprint, &workspace.config.retry).await?;
    if plan.is_empty() {
        output.success_with("No changes. Infrastructure matches cutover.yml.", Some(&plan));
    } else {
        output.detail(&plan.to_string(), &plan);
    }
    Ok(())
}

pub async fn apply(workspace: Workspace, mut output: Output) -> Result<()> {
    output.start_timer();
    let plane = workspace.open_plane()?;
    let blueprint = Blueprint::from_config(&workspace.config)?;

    output.progress(&format!(
        "Reconciling {} resources for {}",
        blueprint.resources().len(),
        workspace.config.service
    ));

    let report = reconcile(&plane, &blueprint, &workspace.config.retry).await?;
    for key in &report.created {
        output.progress(&format!("  + {}", key));
    }
    for key in &report.updated {
        output.progress(&format!("  ~ {}", key));
    }
    for key in &report.deleted {
        output.progress(&format!("  - {}", key));
    }

    output.success_with(
        &format!(
            "Apply complete: {} created, {} updated, {} deleted",
            report.created.len(),
            report.updated.len(),
            report.deleted.len()
        ),
        Some(&report),
    );
    Ok(())
}
