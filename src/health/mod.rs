// ABOUTME: Target health checking: policy, probes, and consecutive-threshold tracking.
// ABOUTME: Traffic is only admitted to a target group once every target crosses the healthy threshold.

mod policy;
mod probe;
mod tracker;

pub use policy::{HealthCheckPolicy, PolicyError, StatusMatcher};
pub use probe::{HttpProbe, ProbeResult, TargetProbe};
pub use tracker::{
    HealthError, HealthReport, HealthTracker, TargetHealth, TargetState, wait_until_healthy,
};
