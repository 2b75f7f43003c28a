// ABOUTME: Application-wide error type for cutover.
// ABOUTME: Wraps module errors with #[from] so commands can use `?` throughout.

use std::path::PathBuf;
use thiserror::Error;

use crate::blueprint::BlueprintError;
use crate::control_plane::ControlPlaneError;
use crate::pipeline::PipelineError;
use crate::reconcile::ReconcileError;
use crate::shift::ShiftError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("unknown destination: {0}")]
    UnknownDestination(String),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0} hook failed")]
    Hook(&'static str),

    #[error(transparent)]
    ControlPlane(#[from] ControlPlaneError),

    #[error(transparent)]
    Shift(#[from] ShiftError),

    #[error(transparent)]
    Blueprint(#[from] BlueprintError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Errors that need an operator rather than a retry.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Shift(e) => e.is_fatal(),
            Error::Pipeline(PipelineError::Shift { source }) => source.is_fatal(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
