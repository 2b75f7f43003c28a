// ABOUTME: Task definition section of cutover.yml.
// ABOUTME: Containers, their ports and the task-level cpu and memory reservation.

use nonempty::NonEmpty;
use serde::Deserialize;

use crate::control_plane::{ContainerSpec, TaskDefinitionSpec};
use crate::types::{ImageRef, TransportProtocol};

use super::deserialize::deserialize_nonempty;

#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Task definition family. Defaults to `<service>-app`.
    #[serde(default)]
    pub family: Option<String>,

    #[serde(default = "default_cpu")]
    pub cpu: u32,

    #[serde(default = "default_memory_mib")]
    pub memory_mib: u32,

    #[serde(deserialize_with = "deserialize_nonempty")]
    pub containers: NonEmpty<ContainerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContainerConfig {
    pub name: String,
    pub image: ImageRef,
    pub port: u16,
    #[serde(default)]
    pub protocol: TransportProtocol,
}

fn default_cpu() -> u32 {
    512
}

fn default_memory_mib() -> u32 {
    1024
}

impl TaskConfig {
    pub fn container(&self, name: &str) -> Option<&ContainerConfig> {
        self.containers.iter().find(|c| c.name == name)
    }

    pub fn to_spec(&self, family: &str) -> TaskDefinitionSpec {
        TaskDefinitionSpec {
            family: family.to_string(),
            cpu: self.cpu,
            memory_mib: self.memory_mib,
            containers: self
                .containers
                .iter()
                .map(|c| ContainerSpec {
                    name: c.name.clone(),
                    image: c.image.clone(),
                    port: c.port,
                    protocol: c.protocol,
                })
                .collect(),
        }
    }
}
