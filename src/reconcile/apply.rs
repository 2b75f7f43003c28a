// ABOUTME: Executes a reconciliation plan against the control plane.
// ABOUTME: Stops at the first failed change; earlier changes stay applied and a re-run converges.

use serde::Serialize;
use snafu::ResultExt;

use crate::blueprint::ResourceKey;
use crate::control_plane::ResourceOps;
use crate::retry::{RetryPolicy, retry};

use super::plan::{Change, Plan};
use super::{ApplyChangeSnafu, ReconcileError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyReport {
    pub created: Vec<ResourceKey>,
    pub updated: Vec<ResourceKey>,
    pub deleted: Vec<ResourceKey>,
}

impl ApplyReport {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

pub async fn apply<P: ResourceOps + ?Sized>(
    plane: &P,
    plan: &Plan,
    policy: &RetryPolicy,
) -> Result<ApplyReport, ReconcileError> {
    let mut report = ApplyReport::default();

    for change in plan.pending() {
        let key = change.key();
        match change {
            Change::Create { spec } => {
                retry(policy, "create resource", || plane.create_resource(spec))
                    .await
                    .context(ApplyChangeSnafu {
                        action: "create",
                        key: key.clone(),
                    })?;
                tracing::info!(resource = %key, "created");
                report.created.push(key);
            }
            Change::Update { to, .. } => {
                retry(policy, "update resource", || plane.update_resource(to))
                    .await
                    .context(ApplyChangeSnafu {
                        action: "update",
                        key: key.clone(),
                    })?;
                tracing::info!(resource = %key, "updated");
                report.updated.push(key);
            }
            Change::Delete { key: target } => {
                retry(policy, "delete resource", || plane.delete_resource(target))
                    .await
                    .context(ApplyChangeSnafu {
                        action: "delete",
                        key: key.clone(),
                    })?;
                tracing::info!(resource = %key, "deleted");
                report.deleted.push(key);
            }
            Change::Unchanged { .. } => {}
        }
    }

    Ok(report)
}
