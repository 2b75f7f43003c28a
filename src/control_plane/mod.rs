// ABOUTME: Composable capability traits for the external container/load balancer control plane.
// ABOUTME: Defines TaskDefinitionOps, TargetGroupOps, ListenerOps, TaskSetOps, ServiceOps, ResourceOps.

mod error;
mod memory;
mod resource;
pub(crate) mod sealed;
mod service;
mod shared_types;
mod task_definition;
mod traffic;

pub use error::ControlPlaneError;
pub use memory::{FaultKind, HealthScript, MemoryControlPlane, Operation, Placement, PlaneEvent};
pub use resource::ResourceOps;
pub use service::{ServiceOps, TaskSetOps};
pub use shared_types::*;
pub use task_definition::TaskDefinitionOps;
pub use traffic::{ListenerOps, TargetGroupOps};

/// Every capability a shift or a reconciliation needs.
pub trait ControlPlane:
    TaskDefinitionOps + TargetGroupOps + ListenerOps + TaskSetOps + ServiceOps + ResourceOps
{
}

impl<T> ControlPlane for T where
    T: TaskDefinitionOps + TargetGroupOps + ListenerOps + TaskSetOps + ServiceOps + ResourceOps
{
}
