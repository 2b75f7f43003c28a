// ABOUTME: Drives provisioned infrastructure toward a blueprint.
// ABOUTME: Lists what exists, plans the difference, and applies it in dependency order.

mod apply;
mod plan;

pub use apply::{ApplyReport, apply};
pub use plan::{Change, Plan, plan};

use snafu::{ResultExt, Snafu};

use crate::blueprint::{Blueprint, BlueprintError, ResourceKey};
use crate::control_plane::{ControlPlaneError, ResourceOps};
use crate::retry::{RetryPolicy, retry};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ReconcileError {
    #[snafu(display("invalid blueprint: {source}"))]
    InvalidBlueprint { source: BlueprintError },

    #[snafu(display("failed to list provisioned resources: {source}"))]
    ListResources { source: ControlPlaneError },

    #[snafu(display("failed to {action} {key}: {source}"))]
    ApplyChange {
        action: &'static str,
        key: ResourceKey,
        source: ControlPlaneError,
    },
}

/// Plan against the current state of `plane`.
pub async fn plan_against<P: ResourceOps + ?Sized>(
    plane: &P,
    blueprint: &Blueprint,
    policy: &RetryPolicy,
) -> Result<Plan, ReconcileError> {
    let observed = retry(policy, "list resources", || plane.list_resources())
        .await
        .context(ListResourcesSnafu)?;
    plan(blueprint, &observed).context(InvalidBlueprintSnafu)
}

/// Plan and apply in one step. Running it twice in a row makes no changes
/// the second time.
pub async fn reconcile<P: ResourceOps + ?Sized>(
    plane: &P,
    blueprint: &Blueprint,
    policy: &RetryPolicy,
) -> Result<ApplyReport, ReconcileError> {
    let plan = plan_against(plane, blueprint, policy).await?;
    if plan.is_empty() {
        tracing::info!("infrastructure is up to date");
        return Ok(ApplyReport::default());
    }

    let (create, update, delete) = plan.counts();
    tracing::info!(create, update, delete, "applying plan");
    apply(plane, &plan, policy).await
}
