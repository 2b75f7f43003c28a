// ABOUTME: Configuration types and parsing for cutover.yml.
// ABOUTME: Handles YAML parsing, defaults, validation and destination merging.

mod backend;
mod deserialize;
mod env_value;
mod init;
mod load_balancer;
mod network;
mod pipeline;
mod task;

pub use backend::{ControlPlaneConfig, ProbeMode};
pub use env_value::{EnvValue, resolve_env_map};
pub use init::init_config;
pub use load_balancer::LoadBalancerConfig;
pub use network::NetworkConfig;
pub use pipeline::{BuildConfig, PipelineConfig};
pub use task::{ContainerConfig, TaskConfig};

use crate::error::{Error, Result};
use crate::health::HealthCheckPolicy;
use crate::retry::RetryPolicy;
use crate::shift::{Approval, ShiftSettings, ValidationCheck};
use crate::types::ServiceName;
use deserialize::deserialize_service_name;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "cutover.yml";
pub const CONFIG_FILENAME_ALT: &str = "cutover.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".cutover/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(deserialize_with = "deserialize_service_name")]
    pub service: ServiceName,

    /// Defaults to `<service>-cluster`.
    #[serde(default)]
    pub cluster: Option<String>,

    #[serde(default = "default_desired_count")]
    pub desired_count: u32,

    pub task: TaskConfig,

    #[serde(default)]
    pub load_balancer: LoadBalancerConfig,

    #[serde(default)]
    pub health_check: HealthCheckPolicy,

    #[serde(default = "default_health_timeout", with = "humantime_serde")]
    pub health_timeout: Duration,

    #[serde(default)]
    pub approval: Approval,

    #[serde(default)]
    pub validation: Option<ValidationCheck>,

    #[serde(default)]
    pub cleanup: Option<CleanupConfig>,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub pipeline: Option<PipelineConfig>,

    #[serde(default)]
    pub control_plane: ControlPlaneConfig,

    #[serde(default)]
    pub destinations: HashMap<String, Destination>,
}

/// Per-environment overrides, selected with `--destination`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Destination {
    #[serde(default)]
    pub desired_count: Option<u32>,

    #[serde(default)]
    pub approval: Option<Approval>,

    #[serde(default)]
    pub health_check: Option<HealthCheckPolicy>,

    #[serde(default)]
    pub validation: Option<ValidationCheck>,

    #[serde(default)]
    pub control_plane: Option<ControlPlaneConfig>,

    /// Merged into the pipeline build environment.
    #[serde(default)]
    pub env: HashMap<String, EnvValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    #[serde(default = "default_grace_period", with = "humantime_serde")]
    pub grace_period: Duration,
}

fn default_desired_count() -> u32 {
    2
}

fn default_grace_period() -> Duration {
    Duration::from_secs(30)
}

fn default_health_timeout() -> Duration {
    Duration::from_secs(300)
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                tracing::debug!(path = %path.display(), "loading config");
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    pub fn for_destination(&self, name: &str) -> Result<Config> {
        let dest = self
            .destinations
            .get(name)
            .ok_or_else(|| Error::UnknownDestination(name.to_string()))?;

        let mut merged = self.clone();

        if let Some(count) = dest.desired_count {
            merged.desired_count = count;
        }
        if let Some(approval) = dest.approval {
            merged.approval = approval;
        }
        if let Some(policy) = &dest.health_check {
            merged.health_check = policy.clone();
        }
        if dest.validation.is_some() {
            merged.validation = dest.validation.clone();
        }
        if let Some(plane) = &dest.control_plane {
            merged.control_plane = plane.clone();
        }
        if let Some(pipeline) = &mut merged.pipeline {
            for (k, v) in &dest.env {
                pipeline.env.insert(k.clone(), v.clone());
            }
        }

        merged.validate()?;
        Ok(merged)
    }

    /// Reject configurations the blueprint or a shift could not honor.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for container in self.task.containers.iter() {
            if !seen.insert(container.name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "container {} is declared twice",
                    container.name
                )));
            }
        }

        if self.desired_count == 0 {
            return Err(Error::InvalidConfig(
                "desired_count must be at least 1".to_string(),
            ));
        }

        self.health_check
            .validate()
            .map_err(|e| Error::InvalidConfig(format!("health_check: {}", e)))?;

        if let Some(name) = &self.load_balancer.container
            && self.task.container(name).is_none()
        {
            return Err(Error::InvalidConfig(format!(
                "load_balancer.container {} is not a task container",
                name
            )));
        }

        if self.load_balancer.production_port == self.load_balancer.test_port {
            return Err(Error::InvalidConfig(
                "production and test listeners must use different ports".to_string(),
            ));
        }

        if let Some(pipeline) = &self.pipeline {
            for build in pipeline.builds.iter() {
                if self.task.container(build.container()).is_none() {
                    return Err(Error::InvalidConfig(format!(
                        "build {} targets unknown container {}",
                        build.name,
                        build.container()
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn cluster_name(&self) -> String {
        self.cluster
            .clone()
            .unwrap_or_else(|| format!("{}-cluster", self.service))
    }

    pub fn family(&self) -> String {
        self.task
            .family
            .clone()
            .unwrap_or_else(|| format!("{}-app", self.service))
    }

    pub fn load_balancer_name(&self) -> String {
        self.load_balancer
            .name
            .clone()
            .unwrap_or_else(|| format!("{}-alb", self.service))
    }

    /// Blue and green target group names, in that order.
    pub fn target_group_names(&self) -> [String; 2] {
        [
            format!("{}-blue", self.service),
            format!("{}-green", self.service),
        ]
    }

    /// The container behind the load balancer.
    pub fn traffic_container(&self) -> &ContainerConfig {
        self.load_balancer
            .container
            .as_deref()
            .and_then(|name| self.task.container(name))
            .unwrap_or(self.task.containers.first())
    }

    pub fn grace_period(&self) -> Duration {
        self.cleanup
            .as_ref()
            .map(|c| c.grace_period)
            .unwrap_or_else(default_grace_period)
    }

    pub fn shift_settings(&self) -> ShiftSettings {
        ShiftSettings {
            approval: self.approval,
            health_timeout: self.health_timeout,
            grace_period: self.grace_period(),
            retry: self.retry.clone(),
            validation: self.validation.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
service: web
task:
  containers:
    - name: web
      image: web-repository:latest
      port: 80
    - name: app
      image: app-repository:latest
      port: 3031
"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.family(), "web-app");
        assert_eq!(config.cluster_name(), "web-cluster");
        assert_eq!(config.desired_count, 2);
        assert_eq!(config.task.cpu, 512);
        assert_eq!(config.task.memory_mib, 1024);
        assert_eq!(config.load_balancer.production_port, 80);
        assert_eq!(config.load_balancer.test_port, 8080);
        assert_eq!(config.traffic_container().name, "web");
        assert_eq!(config.approval, Approval::Manual);
        assert_eq!(config.grace_period(), Duration::from_secs(30));
        assert_eq!(config.target_group_names(), ["web-blue", "web-green"]);
    }

    #[test]
    fn unknown_traffic_container_is_rejected() {
        let yaml = format!("{MINIMAL}load_balancer:\n  container: worker\n");
        let err = Config::from_yaml(&yaml).unwrap_err();
        assert!(err.to_string().contains("worker"));
    }

    #[test]
    fn empty_container_list_is_rejected() {
        let yaml = "service: web\ntask:\n  containers: []\n";
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn destination_overrides_approval_and_count() {
        let yaml = format!(
            "{MINIMAL}destinations:\n  staging:\n    desired_count: 1\n    approval: automatic\n"
        );
        let config = Config::from_yaml(&yaml).unwrap();
        let staging = config.for_destination("staging").unwrap();
        assert_eq!(staging.desired_count, 1);
        assert_eq!(staging.approval, Approval::Automatic);
        assert!(config.for_destination("prod").is_err());
    }
}
