// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Writes a cutover.yml template describing a two-container web service.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::ServiceName;

use super::CONFIG_FILENAME;

/// Write a template `cutover.yml` into `dir`.
pub fn init_config(dir: &Path, service: Option<&str>, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let service = ServiceName::new(service.unwrap_or("web"))
        .map_err(|e| Error::InvalidConfig(e.to_string()))?;

    std::fs::write(&config_path, template_yaml(&service))?;
    Ok(())
}

fn template_yaml(service: &ServiceName) -> String {
    format!(
        r#"service: {service}
desired_count: 2

task:
  cpu: 512
  memory_mib: 1024
  containers:
    - name: web
      image: web-repository:latest
      port: 80
    - name: app
      image: app-repository:latest
      port: 3031

load_balancer:
  production_port: 80
  test_port: 8080
  container: web

health_check:
  path: /
  interval: 30s
  timeout: 10s
  healthy_threshold: 2
  unhealthy_threshold: 2

# manual: stop once the candidate is healthy and wait for `cutover approve`
approval: manual

cleanup:
  grace_period: 30s

pipeline:
  branch: develop
  builds:
    - name: app
      command: ./build.sh app
    - name: web
      command: ./build.sh web
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn template_parses_back() {
        let service = ServiceName::new("shop").unwrap();
        let config = Config::from_yaml(&template_yaml(&service)).unwrap();
        assert_eq!(config.service.as_str(), "shop");
        assert_eq!(config.task.containers.len(), 2);
        assert_eq!(config.traffic_container().port, 80);
    }
}
