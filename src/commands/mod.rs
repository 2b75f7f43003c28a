// ABOUTME: Command handlers for the cutover CLI.
// ABOUTME: Shared setup: config discovery, the state-file control plane, and probe selection.

mod infra;
mod release;
mod shift;
mod status;

pub use infra::{apply, plan};
pub use release::release;
pub use shift::{abort, approve, rollback, shift};
pub use status::status;

use cutover::config::{Config, ProbeMode};
use cutover::control_plane::{MemoryControlPlane, Placement};
use cutover::error::Result;
use cutover::health::{HttpProbe, TargetProbe};
use std::env;
use std::path::PathBuf;

/// The project directory and its resolved configuration.
pub struct Workspace {
    pub dir: PathBuf,
    pub config: Config,
    pub force: bool,
}

impl Workspace {
    pub fn load(destination: Option<&str>, force: bool) -> Result<Self> {
        let dir = env::current_dir()?;
        let config = Config::discover(&dir)?;
        let config = match destination {
            Some(dest) => config.for_destination(dest)?,
            None => config,
        };
        Ok(Self { dir, config, force })
    }

    /// Open the control plane state named in the config, relative to the
    /// project directory.
    pub fn open_plane(&self) -> Result<MemoryControlPlane> {
        let settings = &self.config.control_plane;
        let plane = MemoryControlPlane::open(self.dir.join(&settings.state))?;
        if settings.endpoints.is_empty() {
            Ok(plane)
        } else {
            Ok(plane.with_placement(Placement::Fixed(settings.endpoints.clone())))
        }
    }
}

/// Probe used for candidate targets.
pub enum Probe {
    Simulated(MemoryControlPlane),
    Http(HttpProbe),
}

impl Probe {
    pub fn for_config(config: &Config, plane: &MemoryControlPlane) -> Self {
        match config.control_plane.probe {
            ProbeMode::Simulated => Probe::Simulated(plane.clone()),
            ProbeMode::Http => Probe::Http(HttpProbe::new()),
        }
    }

    pub fn as_dyn(&self) -> &dyn TargetProbe {
        match self {
            Probe::Simulated(plane) => plane,
            Probe::Http(probe) => probe,
        }
    }
}
