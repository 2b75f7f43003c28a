// ABOUTME: Load balancer operations: target group membership and listener binding.
// ABOUTME: Repointing a listener's default action is the only indivisible call.

use super::error::ControlPlaneError;
use super::sealed::Sealed;
use super::shared_types::{Listener, TargetGroup};
use crate::types::{Endpoint, ListenerId, TargetGroupId};
use async_trait::async_trait;

#[async_trait]
pub trait TargetGroupOps: Sealed + Send + Sync {
    async fn describe_target_group(
        &self,
        id: &TargetGroupId,
    ) -> Result<TargetGroup, ControlPlaneError>;

    /// Add endpoints to the group. Already-registered endpoints are ignored.
    async fn register_targets(
        &self,
        id: &TargetGroupId,
        targets: &[Endpoint],
    ) -> Result<(), ControlPlaneError>;

    /// Remove endpoints from the group. Unknown endpoints are ignored.
    async fn deregister_targets(
        &self,
        id: &TargetGroupId,
        targets: &[Endpoint],
    ) -> Result<(), ControlPlaneError>;
}

#[async_trait]
pub trait ListenerOps: Sealed + Send + Sync {
    async fn describe_listener(&self, id: &ListenerId) -> Result<Listener, ControlPlaneError>;

    /// Forward all of the listener's traffic to `target_group`, in one step.
    async fn modify_default_action(
        &self,
        id: &ListenerId,
        target_group: &TargetGroupId,
    ) -> Result<(), ControlPlaneError>;
}
