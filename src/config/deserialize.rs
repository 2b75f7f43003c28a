// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Validates service names, CIDR lists and required non-empty lists while parsing.

use ipnet::Ipv4Net;
use nonempty::NonEmpty;
use serde::Deserialize;

use crate::types::ServiceName;

pub fn deserialize_service_name<'de, D>(deserializer: D) -> Result<ServiceName, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    ServiceName::new(&s).map_err(serde::de::Error::custom)
}

/// A list that must hold at least one entry.
pub fn deserialize_nonempty<'de, D, T>(deserializer: D) -> Result<NonEmpty<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    let values: Vec<T> = Vec::deserialize(deserializer)?;
    NonEmpty::from_vec(values).ok_or_else(|| serde::de::Error::custom("at least one entry is required"))
}

/// Exactly two subnets, one per availability zone.
pub fn deserialize_subnet_pair<'de, D>(deserializer: D) -> Result<[Ipv4Net; 2], D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Vec<Ipv4Net> = Vec::deserialize(deserializer)?;
    <[Ipv4Net; 2]>::try_from(values).map_err(|v| {
        serde::de::Error::custom(format!(
            "exactly two subnets are required (one per availability zone), got {}",
            v.len()
        ))
    })
}
