// ABOUTME: Error type shared by every control plane operation.
// ABOUTME: Distinguishes transient failures (retried) from permanent ones.

use crate::retry::Transient;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlPlaneError {
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} already exists: {name}")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request throttled: {0}")]
    Throttled(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The call may or may not have been applied.
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("state storage error: {0}")]
    Storage(String),
}

impl ControlPlaneError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        ControlPlaneError::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn already_exists(kind: &'static str, name: impl Into<String>) -> Self {
        ControlPlaneError::AlreadyExists {
            kind,
            name: name.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ControlPlaneError::NotFound { .. })
    }
}

impl Transient for ControlPlaneError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            ControlPlaneError::Throttled(_)
                | ControlPlaneError::Unavailable(_)
                | ControlPlaneError::Timeout(_)
        )
    }
}
