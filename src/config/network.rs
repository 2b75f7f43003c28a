// ABOUTME: Network section of cutover.yml: VPC range, zones and subnet layout.

use ipnet::Ipv4Net;
use serde::Deserialize;

use super::deserialize::deserialize_subnet_pair;

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_vpc_cidr")]
    pub vpc_cidr: Ipv4Net,

    #[serde(default = "default_zones")]
    pub availability_zones: [String; 2],

    /// Load balancer subnets; the NAT gateway lives in the first one.
    #[serde(
        default = "default_public_subnets",
        deserialize_with = "deserialize_subnet_pair"
    )]
    pub public_subnets: [Ipv4Net; 2],

    /// Task subnets, routed out through the NAT gateway.
    #[serde(
        default = "default_private_subnets",
        deserialize_with = "deserialize_subnet_pair"
    )]
    pub private_subnets: [Ipv4Net; 2],
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            vpc_cidr: default_vpc_cidr(),
            availability_zones: default_zones(),
            public_subnets: default_public_subnets(),
            private_subnets: default_private_subnets(),
        }
    }
}

fn net(a: u8, b: u8, c: u8, prefix: u8) -> Ipv4Net {
    Ipv4Net::new(std::net::Ipv4Addr::new(10, a, b, c), prefix)
        .unwrap_or_else(|_| Ipv4Net::default())
}

fn default_vpc_cidr() -> Ipv4Net {
    net(0, 0, 0, 16)
}

fn default_zones() -> [String; 2] {
    ["zone-a".to_string(), "zone-b".to_string()]
}

fn default_public_subnets() -> [Ipv4Net; 2] {
    [net(0, 0, 0, 24), net(0, 1, 0, 24)]
}

fn default_private_subnets() -> [Ipv4Net; 2] {
    [net(0, 2, 0, 24), net(0, 3, 0, 24)]
}
