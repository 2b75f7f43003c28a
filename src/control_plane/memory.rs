// ABOUTME: In-process control plane backend, optionally persisted to a JSON state file.
// ABOUTME: Supports fault injection, a call history, and scripted target health for simulation.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::error::ControlPlaneError;
use super::resource::ResourceOps;
use super::sealed::Sealed;
use super::service::{ServiceOps, TaskSetOps};
use super::shared_types::{
    CreateTaskSet, Listener, LockAttempt, LockInfo, ReleaseRecord, ServiceDescription,
    TargetGroup, TaskDefinition, TaskDefinitionSpec, TaskSet,
};
use super::task_definition::TaskDefinitionOps;
use super::traffic::{ListenerOps, TargetGroupOps};
use crate::blueprint::{ResourceKey, ResourceSpec};
use crate::health::{HealthCheckPolicy, ProbeResult, TargetProbe};
use crate::types::{
    Endpoint, ListenerId, Scale, ServiceName, TargetGroupId, TaskDefinitionRef, TaskSetId,
};

/// First address handed out by sequential placement.
const FIRST_TASK_ADDRESS: Ipv4Addr = Ipv4Addr::new(10, 0, 2, 10);

/// Control plane calls that faults can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    RegisterTaskDefinition,
    DescribeTaskDefinition,
    ListRevisions,
    DescribeTargetGroup,
    RegisterTargets,
    DeregisterTargets,
    DescribeListener,
    ModifyDefaultAction,
    CreateTaskSet,
    UpdateTaskSetScale,
    DeleteTaskSet,
    DescribeService,
    RecordRelease,
    LatestRelease,
    RecordServed,
    ServedRevisions,
    AcquireLock,
    ReleaseLock,
    BreakLock,
    ListResources,
    CreateResource,
    UpdateResource,
    DeleteResource,
}

impl Operation {
    fn mutates(self) -> bool {
        !matches!(
            self,
            Operation::DescribeTaskDefinition
                | Operation::ListRevisions
                | Operation::DescribeTargetGroup
                | Operation::DescribeListener
                | Operation::DescribeService
                | Operation::LatestRelease
                | Operation::ServedRevisions
                | Operation::ListResources
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultKind {
    /// Rejected before applying, retryable.
    Throttled,
    /// Rejected before applying, not retryable.
    Fail(String),
    /// Applied, but the caller sees a timeout.
    TimeoutAfterApply,
}

#[derive(Debug, Clone)]
struct Fault {
    op: Operation,
    kind: FaultKind,
    remaining: u32,
}

/// How tasks get addresses when a task set is created.
#[derive(Debug, Clone, Default)]
pub enum Placement {
    /// One fresh private address per task.
    #[default]
    Sequential,
    /// Every task set reports these endpoints, for probing real processes.
    Fixed(Vec<Endpoint>),
}

/// Scripted health of every task running a given revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HealthScript {
    #[default]
    Healthy,
    Unhealthy,
    /// Fails this many probes per target, then succeeds.
    HealthyAfter(u32),
}

/// Observable side effects, in the order they were applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlaneEvent {
    TaskDefinitionRegistered {
        task_definition: TaskDefinitionRef,
    },
    TargetsRegistered {
        target_group: TargetGroupId,
        targets: Vec<Endpoint>,
    },
    TargetsDeregistered {
        target_group: TargetGroupId,
        targets: Vec<Endpoint>,
    },
    ListenerRepointed {
        listener: ListenerId,
        from: TargetGroupId,
        to: TargetGroupId,
    },
    TaskSetCreated {
        task_set: TaskSetId,
        target_group: TargetGroupId,
        task_definition: TaskDefinitionRef,
    },
    TaskSetScaled {
        task_set: TaskSetId,
        scale: Scale,
    },
    TaskSetDeleted {
        task_set: TaskSetId,
    },
    ResourceCreated {
        key: ResourceKey,
    },
    ResourceUpdated {
        key: ResourceKey,
    },
    ResourceDeleted {
        key: ResourceKey,
    },
}

/// Everything that survives a restart.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PlaneState {
    #[serde(default)]
    resources: Vec<ResourceSpec>,
    #[serde(default)]
    task_definitions: BTreeMap<String, Vec<TaskDefinition>>,
    #[serde(default)]
    target_groups: BTreeMap<String, TargetGroup>,
    #[serde(default)]
    listeners: BTreeMap<String, Listener>,
    #[serde(default)]
    services: BTreeMap<String, ServiceDescription>,
    #[serde(default)]
    releases: BTreeMap<String, ReleaseRecord>,
    #[serde(default)]
    served: BTreeMap<String, Vec<TaskDefinitionRef>>,
    #[serde(default)]
    locks: BTreeMap<String, LockInfo>,
    #[serde(default)]
    next_generation: u64,
    #[serde(default)]
    next_address: u32,
}

#[derive(Debug, Default)]
struct Inner {
    state: PlaneState,
    path: Option<PathBuf>,
    placement: Placement,
    faults: Vec<Fault>,
    history: Vec<PlaneEvent>,
    health: HashMap<TaskDefinitionRef, HealthScript>,
    probes: HashMap<Endpoint, u32>,
}

impl Inner {
    fn take_fault(&mut self, op: Operation) -> Option<FaultKind> {
        let fault = self
            .faults
            .iter_mut()
            .find(|f| f.op == op && f.remaining > 0)?;
        fault.remaining -= 1;
        let kind = fault.kind.clone();
        self.faults.retain(|f| f.remaining > 0);
        Some(kind)
    }

    fn save(&self) -> Result<(), ControlPlaneError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        write_state(path, &self.state)
    }

    fn service(&self, name: &ServiceName) -> Result<&ServiceDescription, ControlPlaneError> {
        self.state
            .services
            .get(name.as_str())
            .ok_or_else(|| ControlPlaneError::not_found("service", name.as_str()))
    }

    fn service_mut(
        &mut self,
        name: &ServiceName,
    ) -> Result<&mut ServiceDescription, ControlPlaneError> {
        self.state
            .services
            .get_mut(name.as_str())
            .ok_or_else(|| ControlPlaneError::not_found("service", name.as_str()))
    }

    fn task_definition(
        &self,
        reference: &TaskDefinitionRef,
    ) -> Result<&TaskDefinition, ControlPlaneError> {
        self.state
            .task_definitions
            .get(reference.family())
            .and_then(|revisions| {
                revisions
                    .iter()
                    .find(|td| td.reference.revision() == reference.revision())
            })
            .ok_or_else(|| ControlPlaneError::not_found("task definition", reference.to_string()))
    }

    fn place(&mut self, count: u32, port: u16) -> Vec<Endpoint> {
        match &self.placement {
            Placement::Fixed(endpoints) => endpoints.clone(),
            Placement::Sequential => (0..count)
                .map(|_| {
                    let address =
                        Ipv4Addr::from(u32::from(FIRST_TASK_ADDRESS) + self.state.next_address);
                    self.state.next_address += 1;
                    Endpoint::new(address.to_string(), port)
                })
                .collect(),
        }
    }

    fn apply_resource(&mut self, spec: &ResourceSpec) -> Result<(), ControlPlaneError> {
        match spec {
            ResourceSpec::TargetGroup {
                name,
                port,
                protocol,
                health_check,
                ..
            } => {
                let group = self
                    .state
                    .target_groups
                    .entry(name.clone())
                    .or_insert_with(|| TargetGroup {
                        id: TargetGroupId::new(name.clone()),
                        port: *port,
                        protocol: *protocol,
                        health_check: health_check.clone(),
                        targets: BTreeSet::new(),
                    });
                group.port = *port;
                group.protocol = *protocol;
                group.health_check = health_check.clone();
            }
            ResourceSpec::Listener {
                name,
                port,
                protocol,
                target_group,
                ..
            } => {
                if !self.state.target_groups.contains_key(target_group) {
                    return Err(ControlPlaneError::not_found("target group", target_group));
                }
                let listener = self
                    .state
                    .listeners
                    .entry(name.clone())
                    .or_insert_with(|| Listener {
                        id: ListenerId::new(name.clone()),
                        port: *port,
                        protocol: *protocol,
                        default_target_group: TargetGroupId::new(target_group.clone()),
                    });
                // The default action is never touched by an update.
                listener.port = *port;
                listener.protocol = *protocol;
            }
            ResourceSpec::Service {
                name,
                cluster,
                desired_count,
                production_listener,
                test_listener,
                target_groups,
                container,
                container_port,
                ..
            } => {
                let service_name = ServiceName::new(name)
                    .map_err(|e| ControlPlaneError::InvalidRequest(e.to_string()))?;
                for listener in [production_listener, test_listener] {
                    if !self.state.listeners.contains_key(listener) {
                        return Err(ControlPlaneError::not_found("listener", listener));
                    }
                }
                for group in target_groups {
                    if !self.state.target_groups.contains_key(group) {
                        return Err(ControlPlaneError::not_found("target group", group));
                    }
                }
                let service = self
                    .state
                    .services
                    .entry(name.clone())
                    .or_insert_with(|| ServiceDescription {
                        name: service_name,
                        cluster: cluster.clone(),
                        desired_count: *desired_count,
                        task_sets: Vec::new(),
                        production_listener: ListenerId::new(production_listener.clone()),
                        test_listener: ListenerId::new(test_listener.clone()),
                        target_groups: [
                            TargetGroupId::new(target_groups[0].clone()),
                            TargetGroupId::new(target_groups[1].clone()),
                        ],
                        container: container.clone(),
                        container_port: *container_port,
                    });
                service.cluster = cluster.clone();
                service.desired_count = *desired_count;
                service.container = container.clone();
                service.container_port = *container_port;
            }
            _ => {}
        }
        Ok(())
    }

    fn remove_resource(&mut self, key: &ResourceKey) {
        use crate::blueprint::ResourceKind;
        match key.kind {
            ResourceKind::TargetGroup => {
                self.state.target_groups.remove(&key.name);
            }
            ResourceKind::Listener => {
                self.state.listeners.remove(&key.name);
            }
            ResourceKind::Service => {
                self.state.services.remove(&key.name);
            }
            _ => {}
        }
    }
}

fn write_state(path: &Path, state: &PlaneState) -> Result<(), ControlPlaneError> {
    let json = serde_json::to_string_pretty(state)
        .map_err(|e| ControlPlaneError::Storage(format!("failed to serialize state: {}", e)))?;

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| {
            ControlPlaneError::Storage(format!("failed to create {}: {}", dir.display(), e))
        })?;
    }

    // Write then rename so a crash never leaves a half-written file.
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| {
        ControlPlaneError::Storage(format!("failed to write {}: {}", tmp.display(), e))
    })?;
    std::fs::rename(&tmp, path).map_err(|e| {
        ControlPlaneError::Storage(format!("failed to replace {}: {}", path.display(), e))
    })
}

/// In-process control plane.
///
/// Clones share state, so a test can hold one handle for assertions while
/// the controller drives another.
#[derive(Debug, Clone, Default)]
pub struct MemoryControlPlane {
    inner: Arc<Mutex<Inner>>,
}

impl Sealed for MemoryControlPlane {}

impl MemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load state from `path` (empty if the file does not exist yet) and save
    /// back to it after every mutating call.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ControlPlaneError> {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|e| {
                ControlPlaneError::Storage(format!("corrupt state file {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => PlaneState::default(),
            Err(e) => {
                return Err(ControlPlaneError::Storage(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        tracing::debug!(path = %path.display(), "opened control plane state");

        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                state,
                path: Some(path),
                ..Default::default()
            })),
        })
    }

    pub fn with_placement(self, placement: Placement) -> Self {
        self.inner.lock().placement = placement;
        self
    }

    /// Make the next `times` calls of `op` fail with `kind`.
    pub fn inject(&self, op: Operation, kind: FaultKind, times: u32) {
        self.inner.lock().faults.push(Fault {
            op,
            kind,
            remaining: times,
        });
    }

    pub fn clear_faults(&self) {
        self.inner.lock().faults.clear();
    }

    /// Script probe results for every task running `revision`.
    pub fn set_health(&self, revision: &TaskDefinitionRef, script: HealthScript) {
        self.inner.lock().health.insert(revision.clone(), script);
    }

    pub fn history(&self) -> Vec<PlaneEvent> {
        self.inner.lock().history.clone()
    }

    /// Run one call: consult injected faults, apply, record, save.
    fn call<T>(
        &self,
        op: Operation,
        apply: impl FnOnce(&mut Inner) -> Result<T, ControlPlaneError>,
    ) -> Result<T, ControlPlaneError> {
        let mut inner = self.inner.lock();
        let fault = inner.take_fault(op);

        match &fault {
            Some(FaultKind::Throttled) => {
                return Err(ControlPlaneError::Throttled(format!("{:?}", op)));
            }
            Some(FaultKind::Fail(message)) => {
                return Err(ControlPlaneError::InvalidRequest(message.clone()));
            }
            _ => {}
        }

        let value = apply(&mut *inner)?;

        if op.mutates() {
            inner.save()?;
        }

        if fault == Some(FaultKind::TimeoutAfterApply) {
            return Err(ControlPlaneError::Timeout(format!("{:?}", op)));
        }

        Ok(value)
    }
}

#[async_trait]
impl TaskDefinitionOps for MemoryControlPlane {
    async fn register_task_definition(
        &self,
        spec: &TaskDefinitionSpec,
    ) -> Result<TaskDefinition, ControlPlaneError> {
        if spec.containers.is_empty() {
            return Err(ControlPlaneError::InvalidRequest(
                "task definition needs at least one container".to_string(),
            ));
        }
        let mut names = BTreeSet::new();
        if let Some(dup) = spec.containers.iter().find(|c| !names.insert(&c.name)) {
            return Err(ControlPlaneError::InvalidRequest(format!(
                "duplicate container name: {}",
                dup.name
            )));
        }

        self.call(Operation::RegisterTaskDefinition, |inner| {
            let revisions = inner
                .state
                .task_definitions
                .entry(spec.family.clone())
                .or_default();

            if let Some(latest) = revisions.last().filter(|td| td.spec == *spec) {
                return Ok(latest.clone());
            }

            let revision = u32::try_from(revisions.len() + 1)
                .map_err(|_| ControlPlaneError::Conflict("revision overflow".to_string()))?;
            let definition = TaskDefinition {
                reference: TaskDefinitionRef::new(spec.family.clone(), revision),
                spec: spec.clone(),
                registered_at: Utc::now(),
            };
            revisions.push(definition.clone());
            inner.history.push(PlaneEvent::TaskDefinitionRegistered {
                task_definition: definition.reference.clone(),
            });
            Ok(definition)
        })
    }

    async fn describe_task_definition(
        &self,
        reference: &TaskDefinitionRef,
    ) -> Result<TaskDefinition, ControlPlaneError> {
        self.call(Operation::DescribeTaskDefinition, |inner| {
            inner.task_definition(reference).cloned()
        })
    }

    async fn list_revisions(
        &self,
        family: &str,
    ) -> Result<Vec<TaskDefinitionRef>, ControlPlaneError> {
        self.call(Operation::ListRevisions, |inner| {
            Ok(inner
                .state
                .task_definitions
                .get(family)
                .map(|revisions| revisions.iter().map(|td| td.reference.clone()).collect())
                .unwrap_or_default())
        })
    }
}

#[async_trait]
impl TargetGroupOps for MemoryControlPlane {
    async fn describe_target_group(
        &self,
        id: &TargetGroupId,
    ) -> Result<TargetGroup, ControlPlaneError> {
        self.call(Operation::DescribeTargetGroup, |inner| {
            inner
                .state
                .target_groups
                .get(id.as_str())
                .cloned()
                .ok_or_else(|| ControlPlaneError::not_found("target group", id.as_str()))
        })
    }

    async fn register_targets(
        &self,
        id: &TargetGroupId,
        targets: &[Endpoint],
    ) -> Result<(), ControlPlaneError> {
        self.call(Operation::RegisterTargets, |inner| {
            let group = inner
                .state
                .target_groups
                .get_mut(id.as_str())
                .ok_or_else(|| ControlPlaneError::not_found("target group", id.as_str()))?;
            let added: Vec<_> = targets
                .iter()
                .filter(|t| group.targets.insert((*t).clone()))
                .cloned()
                .collect();
            // A registration starts the load balancer's health count over.
            for target in targets {
                inner.probes.remove(target);
            }
            if !added.is_empty() {
                inner.history.push(PlaneEvent::TargetsRegistered {
                    target_group: id.clone(),
                    targets: added,
                });
            }
            Ok(())
        })
    }

    async fn deregister_targets(
        &self,
        id: &TargetGroupId,
        targets: &[Endpoint],
    ) -> Result<(), ControlPlaneError> {
        self.call(Operation::DeregisterTargets, |inner| {
            let group = inner
                .state
                .target_groups
                .get_mut(id.as_str())
                .ok_or_else(|| ControlPlaneError::not_found("target group", id.as_str()))?;
            let removed: Vec<_> = targets
                .iter()
                .filter(|t| group.targets.remove(*t))
                .cloned()
                .collect();
            if !removed.is_empty() {
                inner.history.push(PlaneEvent::TargetsDeregistered {
                    target_group: id.clone(),
                    targets: removed,
                });
            }
            Ok(())
        })
    }
}

#[async_trait]
impl ListenerOps for MemoryControlPlane {
    async fn describe_listener(&self, id: &ListenerId) -> Result<Listener, ControlPlaneError> {
        self.call(Operation::DescribeListener, |inner| {
            inner
                .state
                .listeners
                .get(id.as_str())
                .cloned()
                .ok_or_else(|| ControlPlaneError::not_found("listener", id.as_str()))
        })
    }

    async fn modify_default_action(
        &self,
        id: &ListenerId,
        target_group: &TargetGroupId,
    ) -> Result<(), ControlPlaneError> {
        self.call(Operation::ModifyDefaultAction, |inner| {
            if !inner.state.target_groups.contains_key(target_group.as_str()) {
                return Err(ControlPlaneError::not_found(
                    "target group",
                    target_group.as_str(),
                ));
            }
            let listener = inner
                .state
                .listeners
                .get_mut(id.as_str())
                .ok_or_else(|| ControlPlaneError::not_found("listener", id.as_str()))?;

            if listener.default_target_group != *target_group {
                let from = std::mem::replace(&mut listener.default_target_group, target_group.clone());
                inner.history.push(PlaneEvent::ListenerRepointed {
                    listener: id.clone(),
                    from,
                    to: target_group.clone(),
                });
            }
            Ok(())
        })
    }
}

#[async_trait]
impl TaskSetOps for MemoryControlPlane {
    async fn create_task_set(&self, request: &CreateTaskSet) -> Result<TaskSet, ControlPlaneError> {
        self.call(Operation::CreateTaskSet, |inner| {
            inner.task_definition(&request.task_definition)?;

            let service = inner.service(&request.service)?;
            if let Some(existing) = service
                .task_sets
                .iter()
                .find(|ts| ts.client_token == request.client_token)
            {
                return Ok(existing.clone());
            }
            if !service.owns_target_group(&request.target_group) {
                return Err(ControlPlaneError::InvalidRequest(format!(
                    "target group {} does not belong to service {}",
                    request.target_group, request.service
                )));
            }
            let (desired_count, port) = (service.desired_count, service.container_port);

            inner.state.next_generation += 1;
            let generation = inner.state.next_generation;
            let endpoints = inner.place(desired_count, port);

            let task_set = TaskSet {
                id: TaskSetId::new(format!("{}-ts-{}", request.service, generation)),
                service: request.service.clone(),
                task_definition: request.task_definition.clone(),
                target_group: request.target_group.clone(),
                scale: request.scale,
                generation,
                endpoints,
                client_token: request.client_token.clone(),
                created_at: Utc::now(),
            };

            inner.service_mut(&request.service)?.task_sets.push(task_set.clone());
            inner.history.push(PlaneEvent::TaskSetCreated {
                task_set: task_set.id.clone(),
                target_group: task_set.target_group.clone(),
                task_definition: task_set.task_definition.clone(),
            });
            Ok(task_set)
        })
    }

    async fn update_task_set_scale(
        &self,
        service: &ServiceName,
        id: &TaskSetId,
        scale: Scale,
    ) -> Result<TaskSet, ControlPlaneError> {
        self.call(Operation::UpdateTaskSetScale, |inner| {
            let task_set = inner
                .service_mut(service)?
                .task_sets
                .iter_mut()
                .find(|ts| &ts.id == id)
                .ok_or_else(|| ControlPlaneError::not_found("task set", id.as_str()))?;

            let changed = task_set.scale != scale;
            task_set.scale = scale;
            let updated = task_set.clone();
            if changed {
                inner.history.push(PlaneEvent::TaskSetScaled {
                    task_set: id.clone(),
                    scale,
                });
            }
            Ok(updated)
        })
    }

    async fn delete_task_set(
        &self,
        service: &ServiceName,
        id: &TaskSetId,
    ) -> Result<(), ControlPlaneError> {
        self.call(Operation::DeleteTaskSet, |inner| {
            let task_sets = &mut inner.service_mut(service)?.task_sets;
            let before = task_sets.len();
            task_sets.retain(|ts| &ts.id != id);
            if task_sets.len() != before {
                inner.history.push(PlaneEvent::TaskSetDeleted {
                    task_set: id.clone(),
                });
            }
            Ok(())
        })
    }
}

#[async_trait]
impl ServiceOps for MemoryControlPlane {
    async fn describe_service(
        &self,
        service: &ServiceName,
    ) -> Result<ServiceDescription, ControlPlaneError> {
        self.call(Operation::DescribeService, |inner| {
            inner.service(service).cloned()
        })
    }

    async fn record_release(
        &self,
        service: &ServiceName,
        task_definition: &TaskDefinitionRef,
        commit: Option<&str>,
    ) -> Result<ReleaseRecord, ControlPlaneError> {
        self.call(Operation::RecordRelease, |inner| {
            inner.task_definition(task_definition)?;
            let record = ReleaseRecord {
                task_definition: task_definition.clone(),
                commit: commit.map(str::to_string),
                recorded_at: Utc::now(),
            };
            inner
                .state
                .releases
                .insert(service.to_string(), record.clone());
            Ok(record)
        })
    }

    async fn latest_release(
        &self,
        service: &ServiceName,
    ) -> Result<Option<ReleaseRecord>, ControlPlaneError> {
        self.call(Operation::LatestRelease, |inner| {
            Ok(inner.state.releases.get(service.as_str()).cloned())
        })
    }

    async fn record_served(
        &self,
        service: &ServiceName,
        task_definition: &TaskDefinitionRef,
    ) -> Result<(), ControlPlaneError> {
        self.call(Operation::RecordServed, |inner| {
            let served = inner.state.served.entry(service.to_string()).or_default();
            if served.last() != Some(task_definition) {
                served.push(task_definition.clone());
            }
            Ok(())
        })
    }

    async fn served_revisions(
        &self,
        service: &ServiceName,
    ) -> Result<Vec<TaskDefinitionRef>, ControlPlaneError> {
        self.call(Operation::ServedRevisions, |inner| {
            Ok(inner
                .state
                .served
                .get(service.as_str())
                .cloned()
                .unwrap_or_default())
        })
    }

    async fn try_acquire_lock(
        &self,
        service: &ServiceName,
        info: &LockInfo,
    ) -> Result<LockAttempt, ControlPlaneError> {
        self.call(Operation::AcquireLock, |inner| {
            match inner.state.locks.get(service.as_str()) {
                Some(existing) => Ok(LockAttempt::Held(existing.clone())),
                None => {
                    inner
                        .state
                        .locks
                        .insert(service.to_string(), info.clone());
                    Ok(LockAttempt::Acquired)
                }
            }
        })
    }

    async fn release_lock(
        &self,
        service: &ServiceName,
        info: &LockInfo,
    ) -> Result<(), ControlPlaneError> {
        self.call(Operation::ReleaseLock, |inner| {
            if inner.state.locks.get(service.as_str()) == Some(info) {
                inner.state.locks.remove(service.as_str());
            }
            Ok(())
        })
    }

    async fn break_lock(&self, service: &ServiceName) -> Result<(), ControlPlaneError> {
        self.call(Operation::BreakLock, |inner| {
            inner.state.locks.remove(service.as_str());
            Ok(())
        })
    }
}

#[async_trait]
impl ResourceOps for MemoryControlPlane {
    async fn list_resources(&self) -> Result<Vec<ResourceSpec>, ControlPlaneError> {
        self.call(Operation::ListResources, |inner| {
            Ok(inner.state.resources.clone())
        })
    }

    async fn create_resource(&self, spec: &ResourceSpec) -> Result<(), ControlPlaneError> {
        self.call(Operation::CreateResource, |inner| {
            let key = spec.key();
            if let Some(existing) = inner.state.resources.iter().find(|r| r.key() == key) {
                return if existing == spec {
                    Ok(())
                } else {
                    Err(ControlPlaneError::already_exists("resource", key.to_string()))
                };
            }

            inner.apply_resource(spec)?;
            inner.state.resources.push(spec.clone());
            inner.history.push(PlaneEvent::ResourceCreated { key });
            Ok(())
        })
    }

    async fn update_resource(&self, spec: &ResourceSpec) -> Result<(), ControlPlaneError> {
        self.call(Operation::UpdateResource, |inner| {
            let key = spec.key();
            let index = inner
                .state
                .resources
                .iter()
                .position(|r| r.key() == key)
                .ok_or_else(|| ControlPlaneError::not_found("resource", key.to_string()))?;

            inner.apply_resource(spec)?;
            inner.state.resources[index] = spec.clone();
            inner.history.push(PlaneEvent::ResourceUpdated { key });
            Ok(())
        })
    }

    async fn delete_resource(&self, key: &ResourceKey) -> Result<(), ControlPlaneError> {
        self.call(Operation::DeleteResource, |inner| {
            let before = inner.state.resources.len();
            inner.state.resources.retain(|r| &r.key() != key);
            if inner.state.resources.len() != before {
                inner.remove_resource(key);
                inner
                    .history
                    .push(PlaneEvent::ResourceDeleted { key: key.clone() });
            }
            Ok(())
        })
    }
}

/// Simulated load balancer health checks, driven by [`HealthScript`]s.
#[async_trait]
impl TargetProbe for MemoryControlPlane {
    async fn probe(&self, target: &Endpoint, _policy: &HealthCheckPolicy) -> ProbeResult {
        let mut inner = self.inner.lock();

        let revision = inner
            .state
            .services
            .values()
            .flat_map(|s| s.task_sets.iter())
            .filter(|ts| ts.endpoints.contains(target))
            .max_by_key(|ts| ts.generation)
            .map(|ts| ts.task_definition.clone());

        let Some(revision) = revision else {
            return ProbeResult::Unhealthy(format!("no task is running at {}", target));
        };

        let script = inner.health.get(&revision).copied().unwrap_or_default();
        let count = inner.probes.entry(target.clone()).or_default();
        *count += 1;

        match script {
            HealthScript::Healthy => ProbeResult::Healthy,
            HealthScript::Unhealthy => {
                ProbeResult::Unhealthy(format!("{} returned 503", target))
            }
            HealthScript::HealthyAfter(failures) if *count > failures => ProbeResult::Healthy,
            HealthScript::HealthyAfter(_) => {
                ProbeResult::Unhealthy(format!("{} is still starting", target))
            }
        }
    }
}
