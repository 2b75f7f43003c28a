// ABOUTME: Records exchanged with the control plane.
// ABOUTME: Task definitions, target groups, listeners, task sets, services, releases and locks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::health::HealthCheckPolicy;
use crate::types::{
    ApplicationProtocol, Endpoint, ImageRef, ListenerId, Scale, ServiceName, TargetGroupId,
    TaskDefinitionRef, TaskSetId, TransportProtocol,
};

/// One container in a task definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub name: String,
    pub image: ImageRef,
    pub port: u16,
    #[serde(default)]
    pub protocol: TransportProtocol,
}

/// Contents of a task definition revision, before registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinitionSpec {
    pub family: String,
    pub cpu: u32,
    pub memory_mib: u32,
    pub containers: Vec<ContainerSpec>,
}

impl TaskDefinitionSpec {
    pub fn container(&self, name: &str) -> Option<&ContainerSpec> {
        self.containers.iter().find(|c| c.name == name)
    }

    /// Replace the image of the named container. Returns false if no such
    /// container exists.
    pub fn set_image(&mut self, container: &str, image: ImageRef) -> bool {
        match self.containers.iter_mut().find(|c| c.name == container) {
            Some(c) => {
                c.image = image;
                true
            }
            None => false,
        }
    }
}

/// A registered, immutable task definition revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub reference: TaskDefinitionRef,
    pub spec: TaskDefinitionSpec,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetGroup {
    pub id: TargetGroupId,
    pub port: u16,
    pub protocol: ApplicationProtocol,
    pub health_check: HealthCheckPolicy,
    pub targets: BTreeSet<Endpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listener {
    pub id: ListenerId,
    pub port: u16,
    pub protocol: ApplicationProtocol,
    pub default_target_group: TargetGroupId,
}

/// A scalable subset of a service's tasks, bound to one target group and
/// one task definition revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSet {
    pub id: TaskSetId,
    pub service: ServiceName,
    pub task_definition: TaskDefinitionRef,
    pub target_group: TargetGroupId,
    pub scale: Scale,
    /// Monotonic per service; the newest task set has the highest value.
    pub generation: u64,
    /// Addresses of the running tasks' load-balanced container.
    pub endpoints: Vec<Endpoint>,
    /// Token of the request that created this task set.
    #[serde(default)]
    pub client_token: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateTaskSet {
    pub service: ServiceName,
    pub task_definition: TaskDefinitionRef,
    pub target_group: TargetGroupId,
    pub scale: Scale,
    /// Repeating a request with the same token returns the task set it
    /// created instead of creating another.
    pub client_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescription {
    pub name: ServiceName,
    pub cluster: String,
    pub desired_count: u32,
    pub task_sets: Vec<TaskSet>,
    pub production_listener: ListenerId,
    pub test_listener: ListenerId,
    /// The two provisioned target groups, blue first.
    pub target_groups: [TargetGroupId; 2],
    /// Container whose port is registered with the target groups.
    pub container: String,
    pub container_port: u16,
}

impl ServiceDescription {
    pub fn owns_target_group(&self, id: &TargetGroupId) -> bool {
        self.target_groups.contains(id)
    }

    /// The provisioned group that is not `id`.
    pub fn other_target_group(&self, id: &TargetGroupId) -> Option<&TargetGroupId> {
        match &self.target_groups {
            [blue, green] if blue == id => Some(green),
            [blue, green] if green == id => Some(blue),
            _ => None,
        }
    }

    pub fn task_set(&self, id: &TaskSetId) -> Option<&TaskSet> {
        self.task_sets.iter().find(|ts| &ts.id == id)
    }

    pub fn task_sets_on(&self, group: &TargetGroupId) -> impl Iterator<Item = &TaskSet> {
        self.task_sets.iter().filter(move |ts| &ts.target_group == group)
    }
}

/// Latest successfully built revision for a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub task_definition: TaskDefinitionRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Information about who holds a shift lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Hostname of the machine that holds the lock.
    pub holder: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub service: String,
}

impl LockInfo {
    /// Lock info for the current process.
    pub fn new(service: &ServiceName) -> Self {
        Self {
            holder: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            started_at: Utc::now(),
            service: service.to_string(),
        }
    }

    /// Locks older than an hour are considered abandoned.
    pub fn is_stale(&self) -> bool {
        let age = Utc::now() - self.started_at;
        age.num_hours() >= 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockAttempt {
    Acquired,
    Held(LockInfo),
}
