// ABOUTME: Tagged resource specs making up the desired infrastructure table.
// ABOUTME: Each variant is plain data keyed by (kind, name) with explicit dependencies.

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::health::HealthCheckPolicy;
use crate::types::{ApplicationProtocol, TransportProtocol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Vpc,
    Subnet,
    InternetGateway,
    NatGateway,
    RouteTable,
    SecurityGroup,
    Repository,
    Cluster,
    Role,
    LoadBalancer,
    TargetGroup,
    Listener,
    Service,
    Pipeline,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Vpc => "vpc",
            ResourceKind::Subnet => "subnet",
            ResourceKind::InternetGateway => "internet_gateway",
            ResourceKind::NatGateway => "nat_gateway",
            ResourceKind::RouteTable => "route_table",
            ResourceKind::SecurityGroup => "security_group",
            ResourceKind::Repository => "repository",
            ResourceKind::Cluster => "cluster",
            ResourceKind::Role => "role",
            ResourceKind::LoadBalancer => "load_balancer",
            ResourceKind::TargetGroup => "target_group",
            ResourceKind::Listener => "listener",
            ResourceKind::Service => "service",
            ResourceKind::Pipeline => "pipeline",
        };
        f.write_str(s)
    }
}

/// Identity of a resource: names are unique per kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceKey {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "snake_case")]
pub enum RouteTarget {
    InternetGateway(String),
    NatGateway(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub destination: Ipv4Net,
    pub target: RouteTarget,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngressSource {
    Cidr(Ipv4Net),
    SecurityGroup(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    pub port: u16,
    #[serde(default)]
    pub protocol: TransportProtocol,
    pub source: IngressSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStatement {
    pub actions: Vec<String>,
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStage {
    pub name: String,
    pub buildspec: String,
    pub container: String,
}

/// One desired resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceSpec {
    Vpc {
        name: String,
        cidr: Ipv4Net,
    },
    Subnet {
        name: String,
        vpc: String,
        cidr: Ipv4Net,
        availability_zone: String,
        public: bool,
    },
    InternetGateway {
        name: String,
        vpc: String,
    },
    NatGateway {
        name: String,
        subnet: String,
    },
    RouteTable {
        name: String,
        vpc: String,
        subnets: Vec<String>,
        routes: Vec<Route>,
    },
    SecurityGroup {
        name: String,
        vpc: String,
        ingress: Vec<IngressRule>,
    },
    Repository {
        name: String,
    },
    Cluster {
        name: String,
        vpc: String,
    },
    Role {
        name: String,
        principal: String,
        managed_policies: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        inline_statements: Vec<PolicyStatement>,
    },
    LoadBalancer {
        name: String,
        internet_facing: bool,
        subnets: Vec<String>,
        security_group: String,
    },
    TargetGroup {
        name: String,
        vpc: String,
        port: u16,
        protocol: ApplicationProtocol,
        health_check: HealthCheckPolicy,
    },
    /// `target_group` is only the initial default action; after creation the
    /// binding belongs to the shift controller.
    Listener {
        name: String,
        load_balancer: String,
        port: u16,
        protocol: ApplicationProtocol,
        target_group: String,
    },
    Service {
        name: String,
        cluster: String,
        desired_count: u32,
        production_listener: String,
        test_listener: String,
        target_groups: [String; 2],
        container: String,
        container_port: u16,
        subnets: Vec<String>,
        security_group: String,
    },
    Pipeline {
        name: String,
        repository: String,
        branch: String,
        service: String,
        role: String,
        build_role: String,
        builds: Vec<BuildStage>,
    },
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceSpec::Vpc { .. } => ResourceKind::Vpc,
            ResourceSpec::Subnet { .. } => ResourceKind::Subnet,
            ResourceSpec::InternetGateway { .. } => ResourceKind::InternetGateway,
            ResourceSpec::NatGateway { .. } => ResourceKind::NatGateway,
            ResourceSpec::RouteTable { .. } => ResourceKind::RouteTable,
            ResourceSpec::SecurityGroup { .. } => ResourceKind::SecurityGroup,
            ResourceSpec::Repository { .. } => ResourceKind::Repository,
            ResourceSpec::Cluster { .. } => ResourceKind::Cluster,
            ResourceSpec::Role { .. } => ResourceKind::Role,
            ResourceSpec::LoadBalancer { .. } => ResourceKind::LoadBalancer,
            ResourceSpec::TargetGroup { .. } => ResourceKind::TargetGroup,
            ResourceSpec::Listener { .. } => ResourceKind::Listener,
            ResourceSpec::Service { .. } => ResourceKind::Service,
            ResourceSpec::Pipeline { .. } => ResourceKind::Pipeline,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ResourceSpec::Vpc { name, .. }
            | ResourceSpec::Subnet { name, .. }
            | ResourceSpec::InternetGateway { name, .. }
            | ResourceSpec::NatGateway { name, .. }
            | ResourceSpec::RouteTable { name, .. }
            | ResourceSpec::SecurityGroup { name, .. }
            | ResourceSpec::Repository { name }
            | ResourceSpec::Cluster { name, .. }
            | ResourceSpec::Role { name, .. }
            | ResourceSpec::LoadBalancer { name, .. }
            | ResourceSpec::TargetGroup { name, .. }
            | ResourceSpec::Listener { name, .. }
            | ResourceSpec::Service { name, .. }
            | ResourceSpec::Pipeline { name, .. } => name,
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(self.kind(), self.name())
    }

    /// Resources that must exist before this one can be created.
    pub fn depends_on(&self) -> Vec<ResourceKey> {
        use ResourceKind as K;
        let key = |kind, name: &String| ResourceKey::new(kind, name.clone());

        match self {
            ResourceSpec::Vpc { .. } | ResourceSpec::Repository { .. } | ResourceSpec::Role { .. } => {
                Vec::new()
            }
            ResourceSpec::Subnet { vpc, .. }
            | ResourceSpec::InternetGateway { vpc, .. }
            | ResourceSpec::Cluster { vpc, .. }
            | ResourceSpec::TargetGroup { vpc, .. } => vec![key(K::Vpc, vpc)],
            ResourceSpec::NatGateway { subnet, .. } => vec![key(K::Subnet, subnet)],
            ResourceSpec::RouteTable {
                vpc,
                subnets,
                routes,
                ..
            } => {
                let mut deps = vec![key(K::Vpc, vpc)];
                deps.extend(subnets.iter().map(|s| key(K::Subnet, s)));
                deps.extend(routes.iter().map(|r| match &r.target {
                    RouteTarget::InternetGateway(igw) => key(K::InternetGateway, igw),
                    RouteTarget::NatGateway(nat) => key(K::NatGateway, nat),
                }));
                deps
            }
            ResourceSpec::SecurityGroup { vpc, ingress, .. } => {
                let mut deps = vec![key(K::Vpc, vpc)];
                deps.extend(ingress.iter().filter_map(|rule| match &rule.source {
                    IngressSource::SecurityGroup(group) => Some(key(K::SecurityGroup, group)),
                    IngressSource::Cidr(_) => None,
                }));
                deps
            }
            ResourceSpec::LoadBalancer {
                subnets,
                security_group,
                ..
            } => {
                let mut deps: Vec<_> = subnets.iter().map(|s| key(K::Subnet, s)).collect();
                deps.push(key(K::SecurityGroup, security_group));
                deps
            }
            ResourceSpec::Listener {
                load_balancer,
                target_group,
                ..
            } => vec![
                key(K::LoadBalancer, load_balancer),
                key(K::TargetGroup, target_group),
            ],
            ResourceSpec::Service {
                cluster,
                production_listener,
                test_listener,
                target_groups,
                subnets,
                security_group,
                ..
            } => {
                let mut deps = vec![
                    key(K::Cluster, cluster),
                    key(K::Listener, production_listener),
                    key(K::Listener, test_listener),
                    key(K::SecurityGroup, security_group),
                ];
                deps.extend(target_groups.iter().map(|tg| key(K::TargetGroup, tg)));
                deps.extend(subnets.iter().map(|s| key(K::Subnet, s)));
                deps
            }
            ResourceSpec::Pipeline {
                repository: _,
                service,
                role,
                build_role,
                ..
            } => vec![
                key(K::Service, service),
                key(K::Role, role),
                key(K::Role, build_role),
            ],
        }
    }

    /// Copy with the fields owned by the shift controller normalized away,
    /// so plans never try to repoint a listener.
    pub fn reconcilable(&self) -> ResourceSpec {
        match self {
            ResourceSpec::Listener {
                name,
                load_balancer,
                port,
                protocol,
                ..
            } => ResourceSpec::Listener {
                name: name.clone(),
                load_balancer: load_balancer.clone(),
                port: *port,
                protocol: *protocol,
                target_group: String::new(),
            },
            other => other.clone(),
        }
    }
}
