// ABOUTME: Generic create/update/delete of provisioned resources for reconciliation.
// ABOUTME: Every call is idempotent with respect to the resource key.

use super::error::ControlPlaneError;
use super::sealed::Sealed;
use crate::blueprint::{ResourceKey, ResourceSpec};
use async_trait::async_trait;

#[async_trait]
pub trait ResourceOps: Sealed + Send + Sync {
    /// Every resource currently provisioned.
    async fn list_resources(&self) -> Result<Vec<ResourceSpec>, ControlPlaneError>;

    /// Create a resource. Creating one that exists with an identical spec
    /// succeeds.
    async fn create_resource(&self, spec: &ResourceSpec) -> Result<(), ControlPlaneError>;

    async fn update_resource(&self, spec: &ResourceSpec) -> Result<(), ControlPlaneError>;

    /// Delete a resource. Deleting one that does not exist succeeds.
    async fn delete_resource(&self, key: &ResourceKey) -> Result<(), ControlPlaneError>;
}
