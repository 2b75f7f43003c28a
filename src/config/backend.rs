// ABOUTME: Control plane section of cutover.yml.
// ABOUTME: Where plane state is stored and how target health is probed.

use serde::Deserialize;
use std::path::PathBuf;

use crate::types::Endpoint;

/// How candidate targets are health checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMode {
    /// Scripted results from the control plane itself.
    #[default]
    Simulated,
    /// Real HTTP requests against each target.
    Http,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControlPlaneConfig {
    #[serde(default = "default_state")]
    pub state: PathBuf,

    #[serde(default)]
    pub probe: ProbeMode,

    /// Addresses every task set reports instead of simulated ones, so
    /// `probe: http` can reach containers running locally.
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            state: default_state(),
            probe: ProbeMode::default(),
            endpoints: Vec::new(),
        }
    }
}

fn default_state() -> PathBuf {
    PathBuf::from(".cutover/state.json")
}
