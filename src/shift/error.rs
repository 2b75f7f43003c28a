// ABOUTME: Error types for blue/green shift operations.
// ABOUTME: Classifies failures as retryable, surfaced-and-aborted, or fatal.

use chrono::{DateTime, Utc};

use crate::control_plane::ControlPlaneError;
use crate::health::HealthError;
use crate::retry::Transient;
use crate::types::{ListenerId, ServiceName, TargetGroupId, TaskDefinitionRef, TaskSetId};

/// Errors that can occur while shifting traffic.
#[derive(Debug, thiserror::Error)]
pub enum ShiftError {
    #[error("control plane call {operation} failed: {source}")]
    ControlPlane {
        operation: &'static str,
        #[source]
        source: ControlPlaneError,
    },

    #[error("health threshold not reached, shift aborted: {0}")]
    HealthThresholdNotMet(#[source] HealthError),

    #[error("validation through the test listener failed: {0}")]
    ValidationFailed(#[source] HealthError),

    /// Repoint rejected; the old primary is still bound.
    #[error("repointing {listener} failed, it still forwards to {group}: {source}")]
    CutoverFailed {
        listener: ListenerId,
        group: TargetGroupId,
        #[source]
        source: ControlPlaneError,
    },

    #[error("{listener} is in an unknown state after a failed repoint: {detail}")]
    AmbiguousListenerState { listener: ListenerId, detail: String },

    #[error("shift lock for {service} held by {holder} (pid {pid}) since {started_at}")]
    LockHeld {
        service: ServiceName,
        holder: String,
        pid: u32,
        started_at: DateTime<Utc>,
    },

    #[error("shift lock error: {0}")]
    Lock(String),

    #[error("a shift is already in progress for {service} (candidate {task_set})")]
    ShiftInProgress {
        service: ServiceName,
        task_set: TaskSetId,
    },

    #[error("no release recorded for {0}")]
    NoRelease(ServiceName),

    #[error("{requested} is newer than the latest release {released}")]
    UnreleasedRevision {
        requested: TaskDefinitionRef,
        released: TaskDefinitionRef,
    },

    #[error("task set {task_set} is not valid: {reason}")]
    InvalidTaskSet { task_set: TaskSetId, reason: String },

    #[error("task definition {task_definition} has no container named {container}")]
    MissingContainer {
        task_definition: TaskDefinitionRef,
        container: String,
    },

    #[error("{listener} forwards to {group}, which does not belong to the service")]
    ForeignTargetGroup {
        listener: ListenerId,
        group: TargetGroupId,
    },

    #[error("service {service} is in an inconsistent state: {reason}")]
    Inconsistent { service: ServiceName, reason: String },

    #[error("no shift awaiting approval for {0}")]
    NothingToApprove(ServiceName),

    #[error("no uncommitted shift to abort for {0}")]
    NothingToAbort(ServiceName),

    #[error("production for {0} was already repointed; use rollback instead")]
    AlreadyCommitted(ServiceName),

    #[error("no previous revision to roll back to for {0}")]
    NoPreviousRevision(ServiceName),
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftErrorKind {
    ControlPlane,
    HealthThreshold,
    Validation,
    CutoverFailed,
    AmbiguousListener,
    LockHeld,
    Lock,
    InProgress,
    Release,
    InvalidTaskSet,
    Inconsistent,
    NothingToDo,
    AlreadyCommitted,
}

/// Details about who holds a shift lock.
#[derive(Debug, Clone)]
pub struct LockHolderInfo {
    pub holder: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

impl ShiftError {
    pub fn kind(&self) -> ShiftErrorKind {
        match self {
            ShiftError::ControlPlane { .. } => ShiftErrorKind::ControlPlane,
            ShiftError::HealthThresholdNotMet(_) => ShiftErrorKind::HealthThreshold,
            ShiftError::ValidationFailed(_) => ShiftErrorKind::Validation,
            ShiftError::CutoverFailed { .. } => ShiftErrorKind::CutoverFailed,
            ShiftError::AmbiguousListenerState { .. } => ShiftErrorKind::AmbiguousListener,
            ShiftError::LockHeld { .. } => ShiftErrorKind::LockHeld,
            ShiftError::Lock(_) => ShiftErrorKind::Lock,
            ShiftError::ShiftInProgress { .. } => ShiftErrorKind::InProgress,
            ShiftError::NoRelease(_) | ShiftError::UnreleasedRevision { .. } => {
                ShiftErrorKind::Release
            }
            ShiftError::InvalidTaskSet { .. } | ShiftError::MissingContainer { .. } => {
                ShiftErrorKind::InvalidTaskSet
            }
            ShiftError::ForeignTargetGroup { .. } | ShiftError::Inconsistent { .. } => {
                ShiftErrorKind::Inconsistent
            }
            ShiftError::NothingToApprove(_)
            | ShiftError::NothingToAbort(_)
            | ShiftError::NoPreviousRevision(_) => ShiftErrorKind::NothingToDo,
            ShiftError::AlreadyCommitted(_) => ShiftErrorKind::AlreadyCommitted,
        }
    }

    /// Needs an operator: the controller will not retry or unwind on its own.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ShiftErrorKind::AmbiguousListener | ShiftErrorKind::Inconsistent
        )
    }

    /// Repeating the whole step is safe and may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ShiftError::CutoverFailed { .. } => true,
            ShiftError::ControlPlane { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    pub fn lock_holder(&self) -> Option<LockHolderInfo> {
        match self {
            ShiftError::LockHeld {
                holder,
                pid,
                started_at,
                ..
            } => Some(LockHolderInfo {
                holder: holder.clone(),
                pid: *pid,
                started_at: *started_at,
            }),
            _ => None,
        }
    }
}

/// Attach the failing operation to control plane errors.
pub trait ControlPlaneResultExt<T> {
    fn during(self, operation: &'static str) -> Result<T, ShiftError>;
}

impl<T> ControlPlaneResultExt<T> for Result<T, ControlPlaneError> {
    fn during(self, operation: &'static str) -> Result<T, ShiftError> {
        self.map_err(|source| ShiftError::ControlPlane { operation, source })
    }
}
