// ABOUTME: Network part of the blueprint: VPC, subnets, gateways and route tables.
// ABOUTME: Also checks that subnets sit inside their VPC and do not overlap.

use ipnet::Ipv4Net;

use crate::config::Config;

use super::BlueprintError;
use super::resource::{ResourceSpec, Route, RouteTarget};

pub const PUBLIC_SUBNETS: [&str; 2] = ["public-1", "public-2"];
pub const PRIVATE_SUBNETS: [&str; 2] = ["private-1", "private-2"];

pub fn vpc_name(config: &Config) -> String {
    format!("{}-vpc", config.service)
}

/// Two public and two private subnets across two zones, an internet gateway,
/// a NAT gateway in the first public subnet, and one route table per tier.
pub fn network_resources(config: &Config) -> Vec<ResourceSpec> {
    let network = &config.network;
    let vpc = vpc_name(config);
    let igw = format!("{}-igw", config.service);
    let nat = format!("{}-nat", config.service);
    let everywhere = Ipv4Net::default();

    let mut resources = vec![ResourceSpec::Vpc {
        name: vpc.clone(),
        cidr: network.vpc_cidr,
    }];

    let tiers = [
        (PUBLIC_SUBNETS, network.public_subnets, true),
        (PRIVATE_SUBNETS, network.private_subnets, false),
    ];
    for (names, cidrs, public) in tiers {
        for ((name, cidr), zone) in names.iter().zip(cidrs).zip(&network.availability_zones) {
            resources.push(ResourceSpec::Subnet {
                name: name.to_string(),
                vpc: vpc.clone(),
                cidr,
                availability_zone: zone.clone(),
                public,
            });
        }
    }

    resources.extend([
        ResourceSpec::InternetGateway {
            name: igw.clone(),
            vpc: vpc.clone(),
        },
        ResourceSpec::NatGateway {
            name: nat.clone(),
            subnet: PUBLIC_SUBNETS[0].to_string(),
        },
        ResourceSpec::RouteTable {
            name: "public".to_string(),
            vpc: vpc.clone(),
            subnets: PUBLIC_SUBNETS.iter().map(|s| s.to_string()).collect(),
            routes: vec![Route {
                destination: everywhere,
                target: RouteTarget::InternetGateway(igw),
            }],
        },
        ResourceSpec::RouteTable {
            name: "private".to_string(),
            vpc,
            subnets: PRIVATE_SUBNETS.iter().map(|s| s.to_string()).collect(),
            routes: vec![Route {
                destination: everywhere,
                target: RouteTarget::NatGateway(nat),
            }],
        },
    ]);

    resources
}

fn overlaps(a: &Ipv4Net, b: &Ipv4Net) -> bool {
    a.contains(&b.network()) || b.contains(&a.network())
}

/// Every subnet must lie inside its VPC, and no two subnets of a VPC may
/// overlap.
pub fn validate_subnets(resources: &[ResourceSpec]) -> Result<(), BlueprintError> {
    let mut checked: Vec<(&str, &str, Ipv4Net)> = Vec::new();

    for spec in resources {
        let ResourceSpec::Subnet {
            name, vpc, cidr, ..
        } = spec
        else {
            continue;
        };

        let vpc_cidr = resources.iter().find_map(|r| match r {
            ResourceSpec::Vpc { name: n, cidr } if n == vpc => Some(*cidr),
            _ => None,
        });
        if let Some(vpc_cidr) = vpc_cidr
            && !vpc_cidr.contains(cidr)
        {
            return Err(BlueprintError::SubnetOutsideVpc {
                subnet: name.clone(),
                cidr: *cidr,
                vpc_cidr,
            });
        }

        if let Some((other, _, _)) = checked
            .iter()
            .find(|(_, v, c)| *v == vpc.as_str() && overlaps(c, cidr))
        {
            return Err(BlueprintError::OverlappingSubnets {
                first: other.to_string(),
                second: name.clone(),
            });
        }
        checked.push((name.as_str(), vpc.as_str(), *cidr));
    }

    Ok(())
}
