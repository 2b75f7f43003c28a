// ABOUTME: Consecutive-threshold health state per target, and the bounded wait built on it.
// ABOUTME: Mirrors load balancer semantics: N successes in a row to become healthy, M failures to become unhealthy.

use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

use super::policy::HealthCheckPolicy;
use super::probe::{ProbeResult, TargetProbe};
use crate::types::Endpoint;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetState {
    /// Registered, threshold not yet reached either way.
    Initial,
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetHealth {
    pub state: TargetState,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_failure: Option<String>,
}

impl TargetHealth {
    fn new() -> Self {
        Self {
            state: TargetState::Initial,
            consecutive_successes: 0,
            consecutive_failures: 0,
            last_failure: None,
        }
    }
}

/// Tracks health state for a fixed set of targets.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    healthy_threshold: u32,
    unhealthy_threshold: u32,
    targets: BTreeMap<Endpoint, TargetHealth>,
}

impl HealthTracker {
    pub fn new(policy: &HealthCheckPolicy, targets: &[Endpoint]) -> Self {
        Self {
            healthy_threshold: policy.healthy_threshold,
            unhealthy_threshold: policy.unhealthy_threshold,
            targets: targets
                .iter()
                .map(|t| (t.clone(), TargetHealth::new()))
                .collect(),
        }
    }

    /// Record one probe result and return the target's resulting state.
    /// Results for unknown targets are ignored.
    pub fn observe(&mut self, target: &Endpoint, result: &ProbeResult) -> Option<TargetState> {
        let health = self.targets.get_mut(target)?;

        match result {
            ProbeResult::Healthy => {
                health.consecutive_successes += 1;
                health.consecutive_failures = 0;
                if health.consecutive_successes >= self.healthy_threshold {
                    health.state = TargetState::Healthy;
                }
            }
            ProbeResult::Unhealthy(reason) => {
                health.consecutive_failures += 1;
                health.consecutive_successes = 0;
                health.last_failure = Some(reason.clone());
                if health.consecutive_failures >= self.unhealthy_threshold {
                    health.state = TargetState::Unhealthy;
                }
            }
        }

        Some(health.state)
    }

    pub fn state(&self, target: &Endpoint) -> Option<TargetState> {
        self.targets.get(target).map(|h| h.state)
    }

    /// True once every tracked target is healthy. An empty set never is.
    pub fn all_healthy(&self) -> bool {
        !self.targets.is_empty()
            && self
                .targets
                .values()
                .all(|h| h.state == TargetState::Healthy)
    }

    pub fn report(&self, rounds: u32, elapsed: Duration) -> HealthReport {
        HealthReport {
            targets: self.targets.clone(),
            rounds,
            elapsed,
        }
    }
}

/// Snapshot of target health at the end of a wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub targets: BTreeMap<Endpoint, TargetHealth>,
    pub rounds: u32,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}

impl HealthReport {
    pub fn healthy_count(&self) -> usize {
        self.targets
            .values()
            .filter(|h| h.state == TargetState::Healthy)
            .count()
    }

    /// First recorded failure reason, for error messages.
    pub fn first_failure(&self) -> Option<(&Endpoint, &str)> {
        self.targets
            .iter()
            .find_map(|(t, h)| h.last_failure.as_deref().map(|r| (t, r)))
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} targets healthy after {} round(s)",
            self.healthy_count(),
            self.targets.len(),
            self.rounds
        )?;
        if let Some((target, reason)) = self.first_failure() {
            write!(f, "; last failure on {}: {}", target, reason)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("no targets registered to health check")]
    NoTargets,

    #[error("health threshold not reached within {waited:?}: {report}")]
    Timeout {
        waited: Duration,
        report: HealthReport,
    },
}

/// Probe `targets` every `policy.interval` until all are healthy or `deadline`
/// has passed. Each probe is bounded by `policy.timeout`.
pub async fn wait_until_healthy<P: TargetProbe + ?Sized>(
    probe: &P,
    targets: &[Endpoint],
    policy: &HealthCheckPolicy,
    deadline: Duration,
) -> Result<HealthReport, HealthError> {
    if targets.is_empty() {
        return Err(HealthError::NoTargets);
    }

    let start = Instant::now();
    let mut tracker = HealthTracker::new(policy, targets);
    let mut rounds = 0;

    loop {
        let results = join_all(targets.iter().map(|target| async move {
            let result = match tokio::time::timeout(policy.timeout, probe.probe(target, policy))
                .await
            {
                Ok(result) => result,
                Err(_elapsed) => {
                    ProbeResult::Unhealthy(format!("timed out after {:?}", policy.timeout))
                }
            };
            (target, result)
        }))
        .await;
        rounds += 1;

        for (target, result) in &results {
            let state = tracker.observe(target, result);
            tracing::debug!(%target, ?result, ?state, "health probe");
        }

        if tracker.all_healthy() {
            return Ok(tracker.report(rounds, start.elapsed()));
        }

        if start.elapsed() + policy.interval > deadline {
            return Err(HealthError::Timeout {
                waited: start.elapsed(),
                report: tracker.report(rounds, start.elapsed()),
            });
        }

        tokio::time::sleep(policy.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints() -> Vec<Endpoint> {
        vec![Endpoint::new("10.0.2.10", 80), Endpoint::new("10.0.2.11", 80)]
    }

    #[test]
    fn becomes_healthy_only_after_consecutive_successes() {
        let policy = HealthCheckPolicy::default();
        let targets = endpoints();
        let mut tracker = HealthTracker::new(&policy, &targets);

        assert_eq!(
            tracker.observe(&targets[0], &ProbeResult::Healthy),
            Some(TargetState::Initial)
        );
        assert_eq!(
            tracker.observe(&targets[0], &ProbeResult::Unhealthy("503".into())),
            Some(TargetState::Initial)
        );
        assert_eq!(
            tracker.observe(&targets[0], &ProbeResult::Healthy),
            Some(TargetState::Initial)
        );
        assert_eq!(
            tracker.observe(&targets[0], &ProbeResult::Healthy),
            Some(TargetState::Healthy)
        );
        assert!(!tracker.all_healthy(), "second target never probed");
    }

    #[test]
    fn healthy_target_flips_after_unhealthy_threshold() {
        let policy = HealthCheckPolicy::default();
        let targets = endpoints();
        let mut tracker = HealthTracker::new(&policy, &targets[..1]);

        tracker.observe(&targets[0], &ProbeResult::Healthy);
        tracker.observe(&targets[0], &ProbeResult::Healthy);
        tracker.observe(&targets[0], &ProbeResult::Unhealthy("timeout".into()));
        assert_eq!(tracker.state(&targets[0]), Some(TargetState::Healthy));
        tracker.observe(&targets[0], &ProbeResult::Unhealthy("timeout".into()));
        assert_eq!(tracker.state(&targets[0]), Some(TargetState::Unhealthy));
    }

    #[test]
    fn unknown_targets_are_ignored() {
        let policy = HealthCheckPolicy::default();
        let mut tracker = HealthTracker::new(&policy, &endpoints());
        let stranger = Endpoint::new("192.0.2.1", 80);
        assert_eq!(tracker.observe(&stranger, &ProbeResult::Healthy), None);
    }

    #[test]
    fn empty_tracker_is_never_healthy() {
        let tracker = HealthTracker::new(&HealthCheckPolicy::default(), &[]);
        assert!(!tracker.all_healthy());
    }

    struct AlwaysHealthy;

    #[async_trait::async_trait]
    impl TargetProbe for AlwaysHealthy {
        async fn probe(&self, _: &Endpoint, _: &HealthCheckPolicy) -> ProbeResult {
            ProbeResult::Healthy
        }
    }

    struct NeverAnswers;

    #[async_trait::async_trait]
    impl TargetProbe for NeverAnswers {
        async fn probe(&self, _: &Endpoint, _: &HealthCheckPolicy) -> ProbeResult {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn wait_returns_after_threshold_rounds() {
        let policy = HealthCheckPolicy::default();
        let report = wait_until_healthy(
            &AlwaysHealthy,
            &endpoints(),
            &policy,
            Duration::from_secs(300),
        )
        .await
        .unwrap();

        assert_eq!(report.rounds, 2);
        assert_eq!(report.healthy_count(), 2);
        assert_eq!(report.elapsed, Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_probes_count_as_failures_and_wait_times_out() {
        let policy = HealthCheckPolicy::default();
        let err = wait_until_healthy(
            &NeverAnswers,
            &endpoints(),
            &policy,
            Duration::from_secs(120),
        )
        .await
        .unwrap_err();

        match err {
            HealthError::Timeout { report, .. } => {
                assert_eq!(report.healthy_count(), 0);
                let (_, reason) = report.first_failure().unwrap();
                assert!(reason.contains("timed out"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_targets_is_an_error() {
        let err = wait_until_healthy(
            &AlwaysHealthy,
            &[],
            &HealthCheckPolicy::default(),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, HealthError::NoTargets));
    }
}
