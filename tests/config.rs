// ABOUTME: Integration tests for configuration parsing and validation.
// ABOUTME: Tests YAML parsing, discovery, env var interpolation and destination merging.

use cutover::config::*;
use cutover::error::Error;
use cutover::shift::Approval;
use std::time::Duration;

const MINIMAL: &str = r#"
service: web
task:
  containers:
    - name: web
      image: web-repository:latest
      port: 80
"#;

mod parsing {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.service.as_str(), "web");
        assert_eq!(config.desired_count, 2);
        assert_eq!(config.approval, Approval::Manual);
        assert_eq!(config.cluster_name(), "web-cluster");
        assert_eq!(config.family(), "web-app");
        assert_eq!(config.target_group_names(), ["web-blue", "web-green"]);
        assert_eq!(config.grace_period(), Duration::from_secs(30));
        assert_eq!(config.control_plane.probe, ProbeMode::Simulated);
        assert!(config.pipeline.is_none());
    }

    #[test]
    fn parse_full_config() {
        let yaml = r#"
service: shop
cluster: shared-cluster
desired_count: 4

task:
  family: shop-web
  cpu: 1024
  memory_mib: 2048
  containers:
    - name: web
      image: registry.local/web-repository:v3
      port: 80
    - name: app
      image: registry.local/app-repository:v3
      port: 3031

load_balancer:
  name: shop-edge
  production_port: 443
  test_port: 8443
  container: web

health_check:
  path: /healthz
  interval: 10s
  timeout: 5s
  healthy_threshold: 3
  unhealthy_threshold: 2
  matcher: 200-299

health_timeout: 2m
approval: automatic

cleanup:
  grace_period: 1m

retry:
  attempts: 3
  initial: 100ms

network:
  availability_zones: [east-1a, east-1b]

control_plane:
  state: /var/lib/cutover/state.json
  probe: http
  endpoints: ["127.0.0.1:8000"]

pipeline:
  repository: shop-repository
  branch: main
  builds:
    - name: web
      command: ./build.sh web
    - name: api
      container: app
      command: ./build.sh app
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.cluster_name(), "shared-cluster");
        assert_eq!(config.family(), "shop-web");
        assert_eq!(config.load_balancer_name(), "shop-edge");
        assert_eq!(config.traffic_container().name, "web");
        assert_eq!(config.health_check.path, "/healthz");
        assert_eq!(config.health_check.healthy_threshold, 3);
        assert_eq!(config.health_timeout, Duration::from_secs(120));
        assert_eq!(config.grace_period(), Duration::from_secs(60));
        assert_eq!(config.retry.attempts, 3);
        assert_eq!(config.network.availability_zones[1], "east-1b");
        assert_eq!(config.control_plane.probe, ProbeMode::Http);
        assert_eq!(config.control_plane.endpoints.len(), 1);

        let pipeline = config.pipeline.unwrap();
        assert_eq!(pipeline.branch, "main");
        assert_eq!(pipeline.builds.len(), 2);
        assert_eq!(pipeline.builds.last().container(), "app");
        assert_eq!(pipeline.builds.first().buildspec(), "buildspec.web.yml");
    }

    #[test]
    fn shift_settings_follow_the_config() {
        let config = Config::from_yaml(&format!("{MINIMAL}approval: automatic\n")).unwrap();
        let settings = config.shift_settings();
        assert_eq!(settings.approval, Approval::Automatic);
        assert_eq!(settings.health_timeout, Duration::from_secs(300));
        assert!(settings.validation.is_none());
    }
}

mod validation {
    use super::*;

    fn rejected(yaml: &str) -> String {
        match Config::from_yaml(yaml) {
            Err(Error::InvalidConfig(message)) => message,
            other => panic!("expected InvalidConfig, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_containers_are_rejected() {
        let message = rejected(
            r#"
service: web
task:
  containers:
    - { name: web, image: "web-repository:v1", port: 80 }
    - { name: web, image: "web-repository:v2", port: 81 }
"#,
        );
        assert!(message.contains("declared twice"));
    }

    #[test]
    fn listeners_need_distinct_ports() {
        let message = rejected(&format!(
            "{MINIMAL}load_balancer:\n  production_port: 80\n  test_port: 80\n"
        ));
        assert!(message.contains("different ports"));
    }

    #[test]
    fn builds_must_target_task_containers() {
        let message = rejected(&format!(
            "{MINIMAL}pipeline:\n  builds:\n    - name: worker\n      command: make\n"
        ));
        assert!(message.contains("unknown container worker"));
    }

    #[test]
    fn health_check_bounds_are_enforced() {
        let message = rejected(&format!(
            "{MINIMAL}health_check:\n  interval: 5s\n  timeout: 5s\n"
        ));
        assert!(message.starts_with("health_check"));
    }

    #[test]
    fn invalid_service_name_is_a_parse_error() {
        let yaml = MINIMAL.replace("service: web", "service: Web_Service");
        assert!(matches!(Config::from_yaml(&yaml), Err(Error::Yaml(_))));
    }

    #[test]
    fn zero_desired_count_is_rejected() {
        let message = rejected(&format!("{MINIMAL}desired_count: 0\n"));
        assert!(message.contains("desired_count"));
    }
}

mod discovery {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn finds_config_in_dot_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".cutover")).unwrap();
        std::fs::write(dir.path().join(".cutover/config.yml"), MINIMAL).unwrap();

        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.service.as_str(), "web");
    }

    #[test]
    fn missing_config_is_reported() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::discover(dir.path()),
            Err(Error::ConfigNotFound(_))
        ));
    }

    #[test]
    fn init_writes_a_loadable_template() {
        let dir = TempDir::new().unwrap();
        init_config(dir.path(), Some("shop"), false).unwrap();

        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.service.as_str(), "shop");
        assert!(config.pipeline.is_some());

        assert!(matches!(
            init_config(dir.path(), None, false),
            Err(Error::AlreadyExists(_))
        ));
        init_config(dir.path(), None, true).unwrap();
        assert_eq!(Config::discover(dir.path()).unwrap().service.as_str(), "web");
    }
}

mod destinations {
    use super::*;

    const WITH_DESTINATIONS: &str = r#"
service: web
task:
  containers:
    - name: web
      image: web-repository:latest
      port: 80
pipeline:
  builds:
    - name: web
      command: ./build.sh
  env:
    STAGE: development
destinations:
  production:
    desired_count: 6
    approval: manual
    control_plane:
      state: prod-state.json
    env:
      STAGE: production
      REGISTRY:
        env: CUTOVER_TEST_PROD_REGISTRY
        default: registry.local
  staging:
    approval: automatic
"#;

    #[test]
    fn destination_overrides_are_merged() {
        let config = Config::from_yaml(WITH_DESTINATIONS).unwrap();
        let production = config.for_destination("production").unwrap();

        assert_eq!(production.desired_count, 6);
        assert_eq!(production.approval, Approval::Manual);
        assert_eq!(
            production.control_plane.state.to_str(),
            Some("prod-state.json")
        );
        let env = &production.pipeline.as_ref().unwrap().env;
        assert_eq!(env["STAGE"], EnvValue::Literal("production".to_string()));

        let staging = config.for_destination("staging").unwrap();
        assert_eq!(staging.desired_count, 2);
        assert_eq!(staging.approval, Approval::Automatic);
    }

    #[test]
    fn unknown_destination_is_an_error() {
        let config = Config::from_yaml(WITH_DESTINATIONS).unwrap();
        assert!(matches!(
            config.for_destination("qa"),
            Err(Error::UnknownDestination(name)) if name == "qa"
        ));
    }

    #[test]
    fn destination_env_resolves_from_the_environment() {
        let config = Config::from_yaml(WITH_DESTINATIONS)
            .unwrap()
            .for_destination("production")
            .unwrap();
        let env = &config.pipeline.unwrap().env;

        temp_env::with_var("CUTOVER_TEST_PROD_REGISTRY", Some("ecr.internal"), || {
            let resolved = resolve_env_map(env).unwrap();
            assert_eq!(resolved["REGISTRY"], "ecr.internal");
            assert_eq!(resolved["STAGE"], "production");
        });
        temp_env::with_var_unset("CUTOVER_TEST_PROD_REGISTRY", || {
            assert_eq!(resolve_env_map(env).unwrap()["REGISTRY"], "registry.local");
        });
    }
}
