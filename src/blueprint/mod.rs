// ABOUTME: Desired infrastructure as a validated table of resource specs.
// ABOUTME: Built from cutover.yml, checked for consistency and ordered by dependency.

mod iam;
mod network;
mod resource;

pub use iam::{BUILD_ROLE, PIPELINE_ROLE, SSM_ROLE, default_roles};
pub use network::{PRIVATE_SUBNETS, PUBLIC_SUBNETS, network_resources, validate_subnets};
pub use resource::{
    BuildStage, IngressRule, IngressSource, PolicyStatement, ResourceKey, ResourceKind,
    ResourceSpec, Route, RouteTarget,
};

use ipnet::Ipv4Net;
use snafu::{ResultExt, Snafu};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::config::Config;
use crate::health::PolicyError;
use crate::types::TransportProtocol;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum BlueprintError {
    #[snafu(display("{key} is declared more than once"))]
    DuplicateResource { key: ResourceKey },

    #[snafu(display("{resource} depends on {dependency}, which is not declared"))]
    MissingDependency {
        resource: ResourceKey,
        dependency: ResourceKey,
    },

    #[snafu(display("subnet {subnet} ({cidr}) is outside the VPC range {vpc_cidr}"))]
    SubnetOutsideVpc {
        subnet: String,
        cidr: Ipv4Net,
        vpc_cidr: Ipv4Net,
    },

    #[snafu(display("subnets {first} and {second} overlap"))]
    OverlappingSubnets { first: String, second: String },

    #[snafu(display("service {service} must use two distinct target groups"))]
    SameTargetGroup { service: String },

    #[snafu(display("target groups {first} and {second} differ: {detail}"))]
    MismatchedTargetGroups {
        first: String,
        second: String,
        detail: String,
    },

    #[snafu(display("invalid health check on target group {target_group}: {source}"))]
    InvalidHealthCheck {
        target_group: String,
        source: PolicyError,
    },

    #[snafu(display("dependency cycle among {}", display_keys(resources)))]
    DependencyCycle { resources: Vec<ResourceKey> },
}

fn display_keys(keys: &[ResourceKey]) -> String {
    keys.iter()
        .map(|k| k.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// A validated set of desired resources.
#[derive(Debug, Clone)]
pub struct Blueprint {
    resources: Vec<ResourceSpec>,
}

impl Blueprint {
    pub fn new(resources: Vec<ResourceSpec>) -> Result<Self, BlueprintError> {
        let blueprint = Self { resources };
        blueprint.validate()?;
        Ok(blueprint)
    }

    /// The full resource table for one service.
    pub fn from_config(config: &Config) -> Result<Self, BlueprintError> {
        let service = config.service.to_string();
        let vpc = network::vpc_name(config);
        let lb = &config.load_balancer;
        let container = config.traffic_container();
        let [blue, green] = config.target_group_names();
        let production = format!("{}-production", service);
        let test = format!("{}-test", service);
        let lb_group = format!("{}-alb-sg", service);
        let task_group = format!("{}-task-sg", service);
        let everywhere = Ipv4Net::default();

        let mut resources = network_resources(config);

        let listener_rule = |port| IngressRule {
            port,
            protocol: TransportProtocol::Tcp,
            source: IngressSource::Cidr(everywhere),
        };
        resources.push(ResourceSpec::SecurityGroup {
            name: lb_group.clone(),
            vpc: vpc.clone(),
            ingress: vec![
                listener_rule(lb.production_port),
                listener_rule(lb.test_port),
            ],
        });
        resources.push(ResourceSpec::SecurityGroup {
            name: task_group.clone(),
            vpc: vpc.clone(),
            ingress: vec![IngressRule {
                port: container.port,
                protocol: container.protocol,
                source: IngressSource::SecurityGroup(lb_group.clone()),
            }],
        });

        let repositories: BTreeSet<String> = config
            .task
            .containers
            .iter()
            .map(|c| c.image.repository().to_string())
            .collect();
        resources.extend(
            repositories
                .into_iter()
                .map(|name| ResourceSpec::Repository { name }),
        );

        resources.push(ResourceSpec::Cluster {
            name: config.cluster_name(),
            vpc: vpc.clone(),
        });
        resources.extend(default_roles());

        resources.push(ResourceSpec::LoadBalancer {
            name: config.load_balancer_name(),
            internet_facing: lb.internet_facing,
            subnets: PUBLIC_SUBNETS.iter().map(|s| s.to_string()).collect(),
            security_group: lb_group,
        });

        for group in [&blue, &green] {
            resources.push(ResourceSpec::TargetGroup {
                name: group.clone(),
                vpc: vpc.clone(),
                port: lb.target_port,
                protocol: lb.protocol,
                health_check: config.health_check.clone(),
            });
        }

        for (name, port) in [(&production, lb.production_port), (&test, lb.test_port)] {
            resources.push(ResourceSpec::Listener {
                name: name.clone(),
                load_balancer: config.load_balancer_name(),
                port,
                protocol: lb.protocol,
                target_group: blue.clone(),
            });
        }

        resources.push(ResourceSpec::Service {
            name: service.clone(),
            cluster: config.cluster_name(),
            desired_count: config.desired_count,
            production_listener: production,
            test_listener: test,
            target_groups: [blue, green],
            container: container.name.clone(),
            container_port: container.port,
            subnets: PRIVATE_SUBNETS.iter().map(|s| s.to_string()).collect(),
            security_group: task_group,
        });

        if let Some(pipeline) = &config.pipeline {
            resources.push(ResourceSpec::Pipeline {
                name: format!("{}-pipeline", service),
                repository: pipeline.repository.clone(),
                branch: pipeline.branch.clone(),
                service,
                role: PIPELINE_ROLE.to_string(),
                build_role: BUILD_ROLE.to_string(),
                builds: pipeline
                    .builds
                    .iter()
                    .map(|b| BuildStage {
                        name: b.name.clone(),
                        buildspec: b.buildspec(),
                        container: b.container().to_string(),
                    })
                    .collect(),
            });
        }

        Self::new(resources)
    }

    pub fn resources(&self) -> &[ResourceSpec] {
        &self.resources
    }

    pub fn get(&self, key: &ResourceKey) -> Option<&ResourceSpec> {
        self.resources.iter().find(|r| &r.key() == key)
    }

    pub fn validate(&self) -> Result<(), BlueprintError> {
        let mut keys = HashSet::new();
        for spec in &self.resources {
            let key = spec.key();
            if !keys.insert(key.clone()) {
                return Err(BlueprintError::DuplicateResource { key });
            }
        }

        for spec in &self.resources {
            if let Some(dependency) = spec.depends_on().into_iter().find(|d| !keys.contains(d)) {
                return Err(BlueprintError::MissingDependency {
                    resource: spec.key(),
                    dependency,
                });
            }
        }

        validate_subnets(&self.resources)?;

        for spec in &self.resources {
            match spec {
                ResourceSpec::TargetGroup {
                    name, health_check, ..
                } => {
                    health_check.validate().context(InvalidHealthCheckSnafu {
                        target_group: name.clone(),
                    })?;
                }
                ResourceSpec::Service {
                    name,
                    target_groups: [first, second],
                    ..
                } => self.check_pair(name, first, second)?,
                _ => {}
            }
        }

        self.ordered().map(|_| ())
    }

    /// Blue and green must be interchangeable behind the same listeners.
    fn check_pair(&self, service: &str, first: &str, second: &str) -> Result<(), BlueprintError> {
        if first == second {
            return Err(BlueprintError::SameTargetGroup {
                service: service.to_string(),
            });
        }

        let lookup = |name: &str| {
            self.resources.iter().find_map(|r| match r {
                ResourceSpec::TargetGroup {
                    name: n,
                    port,
                    protocol,
                    ..
                } if n == name => Some((*port, *protocol)),
                _ => None,
            })
        };

        if let (Some(a), Some(b)) = (lookup(first), lookup(second))
            && a != b
        {
            return Err(BlueprintError::MismatchedTargetGroups {
                first: first.to_string(),
                second: second.to_string(),
                detail: format!("{}:{} vs {}:{}", a.1, a.0, b.1, b.0),
            });
        }
        Ok(())
    }

    /// Resources in creation order: every resource after its dependencies.
    /// Ties are broken by kind, then name, so the order is stable.
    pub fn ordered(&self) -> Result<Vec<&ResourceSpec>, BlueprintError> {
        let by_key: BTreeMap<ResourceKey, &ResourceSpec> =
            self.resources.iter().map(|r| (r.key(), r)).collect();

        let mut pending: BTreeMap<ResourceKey, BTreeSet<ResourceKey>> = by_key
            .iter()
            .map(|(key, spec)| {
                let deps = spec
                    .depends_on()
                    .into_iter()
                    .filter(|d| by_key.contains_key(d))
                    .collect();
                (key.clone(), deps)
            })
            .collect();

        let mut ordered = Vec::with_capacity(by_key.len());
        while !pending.is_empty() {
            let ready: Vec<ResourceKey> = pending
                .iter()
                .filter(|(_, deps)| deps.is_empty())
                .map(|(key, _)| key.clone())
                .collect();

            if ready.is_empty() {
                return Err(BlueprintError::DependencyCycle {
                    resources: pending.into_keys().collect(),
                });
            }

            for key in &ready {
                pending.remove(key);
                for deps in pending.values_mut() {
                    deps.remove(key);
                }
                if let Some(spec) = by_key.get(key) {
                    ordered.push(*spec);
                }
            }
        }

        Ok(ordered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::from_yaml(
            r#"
service: web
task:
  containers:
    - name: web
      image: web-repository:latest
      port: 80
    - name: app
      image: app-repository:latest
      port: 3031
pipeline:
  builds:
    - name: app
      command: "true"
    - name: web
      command: "true"
"#,
        )
        .unwrap()
    }

    fn position(order: &[&ResourceSpec], kind: ResourceKind, name: &str) -> usize {
        order
            .iter()
            .position(|r| r.key() == ResourceKey::new(kind, name))
            .unwrap()
    }

    #[test]
    fn default_blueprint_matches_reference_layout() {
        let blueprint = Blueprint::from_config(&config()).unwrap();

        let subnet = |name: &str| match blueprint.get(&ResourceKey::new(ResourceKind::Subnet, name)) {
            Some(ResourceSpec::Subnet { cidr, .. }) => cidr.to_string(),
            other => panic!("missing subnet {name}: {other:?}"),
        };
        assert_eq!(subnet("public-1"), "10.0.0.0/24");
        assert_eq!(subnet("public-2"), "10.0.1.0/24");
        assert_eq!(subnet("private-1"), "10.0.2.0/24");
        assert_eq!(subnet("private-2"), "10.0.3.0/24");

        for repo in ["app-repository", "web-repository"] {
            assert!(blueprint.get(&ResourceKey::new(ResourceKind::Repository, repo)).is_some());
        }
        for role in [SSM_ROLE, BUILD_ROLE, PIPELINE_ROLE] {
            assert!(blueprint.get(&ResourceKey::new(ResourceKind::Role, role)).is_some());
        }

        match blueprint.get(&ResourceKey::new(ResourceKind::Listener, "web-test")) {
            Some(ResourceSpec::Listener { port, target_group, .. }) => {
                assert_eq!(*port, 8080);
                assert_eq!(target_group, "web-blue");
            }
            other => panic!("missing test listener: {other:?}"),
        }
    }

    #[test]
    fn ordering_puts_dependencies_first() {
        let blueprint = Blueprint::from_config(&config()).unwrap();
        let order = blueprint.ordered().unwrap();

        assert_eq!(order.len(), blueprint.resources().len());
        assert!(
            position(&order, ResourceKind::Vpc, "web-vpc")
                < position(&order, ResourceKind::Subnet, "public-1")
        );
        assert!(
            position(&order, ResourceKind::TargetGroup, "web-green")
                < position(&order, ResourceKind::Service, "web")
        );
        assert!(
            position(&order, ResourceKind::Service, "web")
                < position(&order, ResourceKind::Pipeline, "web-pipeline")
        );
    }

    #[test]
    fn listener_without_target_group_is_rejected() {
        let err = Blueprint::new(vec![ResourceSpec::Listener {
            name: "production".to_string(),
            load_balancer: "lb".to_string(),
            port: 80,
            protocol: Default::default(),
            target_group: "web-blue".to_string(),
        }])
        .unwrap_err();
        assert!(matches!(err, BlueprintError::MissingDependency { .. }));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let repo = ResourceSpec::Repository {
            name: "web-repository".to_string(),
        };
        let err = Blueprint::new(vec![repo.clone(), repo]).unwrap_err();
        assert!(matches!(err, BlueprintError::DuplicateResource { .. }));
    }

    #[test]
    fn self_referencing_security_groups_form_a_cycle() {
        let group = |name: &str, peer: &str| ResourceSpec::SecurityGroup {
            name: name.to_string(),
            vpc: "main".to_string(),
            ingress: vec![IngressRule {
                port: 80,
                protocol: TransportProtocol::Tcp,
                source: IngressSource::SecurityGroup(peer.to_string()),
            }],
        };
        let err = Blueprint::new(vec![
            ResourceSpec::Vpc {
                name: "main".to_string(),
                cidr: "10.0.0.0/16".parse().unwrap(),
            },
            group("a", "b"),
            group("b", "a"),
        ])
        .unwrap_err();
        assert!(matches!(err, BlueprintError::DependencyCycle { resources } if resources.len() == 2));
    }
}
