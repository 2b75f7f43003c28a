// ABOUTME: Test support utilities.
// ABOUTME: Tracing setup plus a provisioned in-memory control plane for the reference two-container service.

use std::sync::Once;

use cutover::blueprint::Blueprint;
use cutover::config::Config;
use cutover::control_plane::{ListenerOps, MemoryControlPlane, ServiceDescription, ServiceOps};
use cutover::pipeline::register_release;
use cutover::reconcile::reconcile;
use cutover::types::{ImageRef, ListenerId, TargetGroupId, TaskDefinitionRef};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for tests. Safe to call multiple times.
#[allow(dead_code)]
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        let filter = EnvFilter::from_default_env()
            .add_directive("cutover=debug".parse().unwrap());
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// `web` on port 80 behind the load balancer, `app` on 3031 beside it.
#[allow(dead_code)]
pub const SERVICE_YAML: &str = r#"
service: web
desired_count: 2
approval: {approval}
cleanup:
  grace_period: 5s
retry:
  attempts: 4
  initial: 50ms
  max: 1s
task:
  containers:
    - name: web
      image: web-repository:v1
      port: 80
    - name: app
      image: app-repository:v1
      port: 3031
load_balancer:
  container: web
"#;

#[allow(dead_code)]
pub fn config(approval: &str) -> Config {
    Config::from_yaml(&SERVICE_YAML.replace("{approval}", approval)).unwrap()
}

/// Fresh control plane with the service's blueprint applied.
#[allow(dead_code)]
pub async fn provisioned(config: &Config) -> MemoryControlPlane {
    let plane = MemoryControlPlane::new();
    let blueprint = Blueprint::from_config(config).unwrap();
    reconcile(&plane, &blueprint, &config.retry).await.unwrap();
    plane
}

/// Register and record a revision running both containers at `tag`.
#[allow(dead_code)]
pub async fn release(plane: &MemoryControlPlane, config: &Config, tag: &str) -> TaskDefinitionRef {
    let images = vec![
        (
            "web".to_string(),
            ImageRef::parse(&format!("web-repository:{tag}")).unwrap(),
        ),
        (
            "app".to_string(),
            ImageRef::parse(&format!("app-repository:{tag}")).unwrap(),
        ),
    ];
    register_release(plane, config, &images, Some(tag))
        .await
        .unwrap()
        .reference
}

#[allow(dead_code)]
pub async fn production_group(plane: &MemoryControlPlane) -> TargetGroupId {
    plane
        .describe_listener(&ListenerId::new("web-production"))
        .await
        .unwrap()
        .default_target_group
}

#[allow(dead_code)]
pub async fn test_group(plane: &MemoryControlPlane) -> TargetGroupId {
    plane
        .describe_listener(&ListenerId::new("web-test"))
        .await
        .unwrap()
        .default_target_group
}

#[allow(dead_code)]
pub async fn service(plane: &MemoryControlPlane, config: &Config) -> ServiceDescription {
    plane.describe_service(&config.service).await.unwrap()
}
