// ABOUTME: Diff between the desired blueprint and the resources the control plane reports.
// ABOUTME: Listener bindings are excluded from the diff; the shift controller owns them.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::blueprint::{Blueprint, BlueprintError, ResourceKey, ResourceSpec};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Change {
    Create { spec: ResourceSpec },
    Update { from: ResourceSpec, to: ResourceSpec },
    Delete { key: ResourceKey },
    Unchanged { key: ResourceKey },
}

impl Change {
    pub fn key(&self) -> ResourceKey {
        match self {
            Change::Create { spec } => spec.key(),
            Change::Update { to, .. } => to.key(),
            Change::Delete { key } | Change::Unchanged { key } => key.clone(),
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, Change::Unchanged { .. })
    }

    fn symbol(&self) -> char {
        match self {
            Change::Create { .. } => '+',
            Change::Update { .. } => '~',
            Change::Delete { .. } => '-',
            Change::Unchanged { .. } => '=',
        }
    }
}

/// Ordered changes: creates and updates in dependency order, then deletes
/// with dependents before their dependencies.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Plan {
    changes: Vec<Change>,
}

impl Plan {
    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    /// Changes that need a control plane call.
    pub fn pending(&self) -> impl Iterator<Item = &Change> {
        self.changes.iter().filter(|c| !c.is_unchanged())
    }

    pub fn is_empty(&self) -> bool {
        self.pending().next().is_none()
    }

    /// Counts of (create, update, delete).
    pub fn counts(&self) -> (usize, usize, usize) {
        self.changes
            .iter()
            .fold((0, 0, 0), |(c, u, d), change| match change {
                Change::Create { .. } => (c + 1, u, d),
                Change::Update { .. } => (c, u + 1, d),
                Change::Delete { .. } => (c, u, d + 1),
                Change::Unchanged { .. } => (c, u, d),
            })
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for change in self.pending() {
            writeln!(f, "  {} {}", change.symbol(), change.key())?;
        }
        let (create, update, delete) = self.counts();
        write!(
            f,
            "{} to create, {} to update, {} to delete",
            create, update, delete
        )
    }
}

/// Compare `desired` against what is `observed` in the control plane.
///
/// Stale resources are deleted in reverse kind order, which puts dependents
/// (pipelines, services, listeners) ahead of the network they sit on.
pub fn plan(desired: &Blueprint, observed: &[ResourceSpec]) -> Result<Plan, BlueprintError> {
    let observed: BTreeMap<ResourceKey, &ResourceSpec> =
        observed.iter().map(|r| (r.key(), r)).collect();

    let mut changes: Vec<Change> = desired
        .ordered()?
        .into_iter()
        .map(|spec| match observed.get(&spec.key()) {
            None => Change::Create { spec: spec.clone() },
            Some(current) if current.reconcilable() == spec.reconcilable() => {
                Change::Unchanged { key: spec.key() }
            }
            Some(current) => Change::Update {
                from: (*current).clone(),
                to: spec.clone(),
            },
        })
        .collect();

    let mut stale: Vec<ResourceKey> = observed
        .keys()
        .filter(|key| desired.get(key).is_none())
        .cloned()
        .collect();
    stale.sort_by(|a, b| b.cmp(a));
    changes.extend(stale.into_iter().map(|key| Change::Delete { key }));

    Ok(Plan { changes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::ResourceKind;
    use crate::health::HealthCheckPolicy;
    use crate::types::ApplicationProtocol;

    fn vpc() -> ResourceSpec {
        ResourceSpec::Vpc {
            name: "main".to_string(),
            cidr: "10.0.0.0/16".parse().unwrap(),
        }
    }

    fn group(name: &str, port: u16) -> ResourceSpec {
        ResourceSpec::TargetGroup {
            name: name.to_string(),
            vpc: "main".to_string(),
            port,
            protocol: ApplicationProtocol::Http,
            health_check: HealthCheckPolicy::default(),
        }
    }

    fn listener(target_group: &str) -> ResourceSpec {
        ResourceSpec::Listener {
            name: "production".to_string(),
            load_balancer: "lb".to_string(),
            port: 80,
            protocol: ApplicationProtocol::Http,
            target_group: target_group.to_string(),
        }
    }

    fn stray_repository() -> ResourceSpec {
        ResourceSpec::Repository {
            name: "placeholder".to_string(),
        }
    }

    #[test]
    fn empty_plane_creates_everything_in_order() {
        let desired = Blueprint::new(vec![group("web-blue", 80), vpc()]).unwrap();
        let plan = plan(&desired, &[]).unwrap();

        let keys: Vec<_> = plan.changes().iter().map(|c| c.key()).collect();
        assert_eq!(keys[0], ResourceKey::new(ResourceKind::Vpc, "main"));
        assert_eq!(plan.counts(), (2, 0, 0));
    }

    #[test]
    fn matching_resources_are_unchanged() {
        let desired = Blueprint::new(vec![vpc(), group("web-blue", 80)]).unwrap();
        let plan = plan(&desired, &[vpc(), group("web-blue", 80)]).unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn changed_port_is_an_update_and_extra_resources_are_deleted() {
        let desired = Blueprint::new(vec![vpc(), group("web-blue", 8000)]).unwrap();
        let plan = plan(&desired, &[vpc(), group("web-blue", 80), stray_repository()]).unwrap();
        assert_eq!(plan.counts(), (0, 1, 1));
        assert!(plan.to_string().contains("~ target_group/web-blue"));
        assert!(plan.to_string().contains("- repository/placeholder"));
    }

    #[test]
    fn listener_binding_never_produces_an_update() {
        let desired = Blueprint::new(vec![
            vpc(),
            group("web-blue", 80),
            group("web-green", 80),
            ResourceSpec::LoadBalancer {
                name: "lb".to_string(),
                internet_facing: true,
                subnets: vec![],
                security_group: "sg".to_string(),
            },
            ResourceSpec::SecurityGroup {
                name: "sg".to_string(),
                vpc: "main".to_string(),
                ingress: vec![],
            },
            listener("web-blue"),
        ])
        .unwrap();
        let observed: Vec<_> = desired
            .resources()
            .iter()
            .map(|r| match r {
                ResourceSpec::Listener { .. } => listener("web-green"),
                other => other.clone(),
            })
            .collect();

        assert!(plan(&desired, &observed).unwrap().is_empty());
    }
}
