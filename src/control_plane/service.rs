// ABOUTME: Service operations: task sets, the service record, release and served ledgers, the shift lock.
// ABOUTME: The lock is a compare-and-set record so two shifts can never run on one service.

use super::error::ControlPlaneError;
use super::sealed::Sealed;
use super::shared_types::{
    CreateTaskSet, LockAttempt, LockInfo, ReleaseRecord, ServiceDescription, TaskSet,
};
use crate::types::{Scale, ServiceName, TaskDefinitionRef, TaskSetId};
use async_trait::async_trait;

#[async_trait]
pub trait TaskSetOps: Sealed + Send + Sync {
    /// Create a task set and launch its tasks.
    async fn create_task_set(&self, request: &CreateTaskSet) -> Result<TaskSet, ControlPlaneError>;

    async fn update_task_set_scale(
        &self,
        service: &ServiceName,
        id: &TaskSetId,
        scale: Scale,
    ) -> Result<TaskSet, ControlPlaneError>;

    /// Stop the task set's tasks and forget it. Deleting an unknown task set
    /// succeeds.
    async fn delete_task_set(
        &self,
        service: &ServiceName,
        id: &TaskSetId,
    ) -> Result<(), ControlPlaneError>;
}

#[async_trait]
pub trait ServiceOps: Sealed + Send + Sync {
    async fn describe_service(
        &self,
        service: &ServiceName,
    ) -> Result<ServiceDescription, ControlPlaneError>;

    async fn record_release(
        &self,
        service: &ServiceName,
        task_definition: &TaskDefinitionRef,
        commit: Option<&str>,
    ) -> Result<ReleaseRecord, ControlPlaneError>;

    async fn latest_release(
        &self,
        service: &ServiceName,
    ) -> Result<Option<ReleaseRecord>, ControlPlaneError>;

    /// Note that `task_definition` finished a shift and served production.
    async fn record_served(
        &self,
        service: &ServiceName,
        task_definition: &TaskDefinitionRef,
    ) -> Result<(), ControlPlaneError>;

    /// Revisions that have served production, oldest first.
    async fn served_revisions(
        &self,
        service: &ServiceName,
    ) -> Result<Vec<TaskDefinitionRef>, ControlPlaneError>;

    /// Store `info` as the lock holder unless a lock is already held.
    async fn try_acquire_lock(
        &self,
        service: &ServiceName,
        info: &LockInfo,
    ) -> Result<LockAttempt, ControlPlaneError>;

    /// Release a lock held by `info`. A lock held by anyone else is left alone.
    async fn release_lock(
        &self,
        service: &ServiceName,
        info: &LockInfo,
    ) -> Result<(), ControlPlaneError>;

    /// Remove the lock regardless of holder.
    async fn break_lock(&self, service: &ServiceName) -> Result<(), ControlPlaneError>;
}
