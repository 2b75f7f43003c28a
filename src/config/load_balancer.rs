// ABOUTME: Load balancer section of cutover.yml.
// ABOUTME: Listener ports, target group port and the container that receives traffic.

use serde::Deserialize;

use crate::types::ApplicationProtocol;

#[derive(Debug, Clone, Deserialize)]
pub struct LoadBalancerConfig {
    /// Defaults to `<service>-alb`.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default = "default_true")]
    pub internet_facing: bool,

    #[serde(default)]
    pub protocol: ApplicationProtocol,

    /// Customer-facing listener port.
    #[serde(default = "default_production_port")]
    pub production_port: u16,

    /// Validation listener port.
    #[serde(default = "default_test_port")]
    pub test_port: u16,

    /// Port both target groups forward to.
    #[serde(default = "default_target_port")]
    pub target_port: u16,

    /// Container behind the target groups. Defaults to the first container.
    #[serde(default)]
    pub container: Option<String>,
}

impl Default for LoadBalancerConfig {
    fn default() -> Self {
        Self {
            name: None,
            internet_facing: true,
            protocol: ApplicationProtocol::default(),
            production_port: default_production_port(),
            test_port: default_test_port(),
            target_port: default_target_port(),
            container: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_production_port() -> u16 {
    80
}

fn default_test_port() -> u16 {
    8080
}

fn default_target_port() -> u16 {
    80
}
