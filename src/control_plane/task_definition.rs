// ABOUTME: Task definition registry operations.
// ABOUTME: Revisions are immutable and append-only per family.

use super::error::ControlPlaneError;
use super::sealed::Sealed;
use super::shared_types::{TaskDefinition, TaskDefinitionSpec};
use crate::types::TaskDefinitionRef;
use async_trait::async_trait;

#[async_trait]
pub trait TaskDefinitionOps: Sealed + Send + Sync {
    /// Register a new revision of `spec.family`.
    ///
    /// Idempotent: if the containers, cpu and memory equal the latest
    /// revision's, that revision is returned and nothing is registered.
    async fn register_task_definition(
        &self,
        spec: &TaskDefinitionSpec,
    ) -> Result<TaskDefinition, ControlPlaneError>;

    async fn describe_task_definition(
        &self,
        reference: &TaskDefinitionRef,
    ) -> Result<TaskDefinition, ControlPlaneError>;

    /// All revisions of a family, oldest first.
    async fn list_revisions(&self, family: &str) -> Result<Vec<TaskDefinitionRef>, ControlPlaneError>;
}
