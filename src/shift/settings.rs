// ABOUTME: Tunables for a shift: approval mode, bounded waits, retry and optional validation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::health::HealthCheckPolicy;
use crate::retry::RetryPolicy;
use crate::types::Endpoint;

/// Whether production is repointed without an operator's go-ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Approval {
    #[default]
    Manual,
    Automatic,
}

/// Probe sent through the test listener before an automatic cut-over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationCheck {
    /// Address of the test listener.
    pub endpoint: Endpoint,
    #[serde(default)]
    pub health_check: HealthCheckPolicy,
}

#[derive(Debug, Clone)]
pub struct ShiftSettings {
    pub approval: Approval,
    /// Upper bound on waiting for candidate targets to become healthy.
    pub health_timeout: Duration,
    /// Drain time between repointing production and retiring the old task set.
    pub grace_period: Duration,
    pub retry: RetryPolicy,
    pub validation: Option<ValidationCheck>,
}

impl Default for ShiftSettings {
    fn default() -> Self {
        Self {
            approval: Approval::default(),
            health_timeout: Duration::from_secs(300),
            grace_period: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            validation: None,
        }
    }
}
