// ABOUTME: Target group health check policy.
// ABOUTME: Protocol, path, interval, timeout, thresholds and success matcher, with load balancer defaults.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::types::ApplicationProtocol;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("health check path must start with '/': {0}")]
    InvalidPath(String),

    #[error("health check timeout ({timeout:?}) must be shorter than the interval ({interval:?})")]
    TimeoutNotBelowInterval { timeout: Duration, interval: Duration },

    #[error("health check timeout must be between 2s and 120s, got {0:?}")]
    TimeoutOutOfRange(Duration),

    #[error("health check interval must be between 5s and 300s, got {0:?}")]
    IntervalOutOfRange(Duration),

    #[error("{which} threshold must be between 2 and 10, got {value}")]
    ThresholdOutOfRange { which: &'static str, value: u32 },

    #[error("invalid status matcher: {0}")]
    InvalidMatcher(String),
}

/// Health check policy owned by a target group.
///
/// A target is healthy after `healthy_threshold` consecutive successful
/// probes and unhealthy after `unhealthy_threshold` consecutive failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckPolicy {
    #[serde(default)]
    pub protocol: ApplicationProtocol,

    #[serde(default = "default_path")]
    pub path: String,

    /// Probe port. `None` probes the port the target was registered with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "default_healthy_threshold")]
    pub healthy_threshold: u32,

    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,

    #[serde(default)]
    pub matcher: StatusMatcher,
}

fn default_path() -> String {
    "/".to_string()
}

fn default_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_healthy_threshold() -> u32 {
    2
}

fn default_unhealthy_threshold() -> u32 {
    2
}

impl Default for HealthCheckPolicy {
    fn default() -> Self {
        Self {
            protocol: ApplicationProtocol::default(),
            path: default_path(),
            port: None,
            interval: default_interval(),
            timeout: default_timeout(),
            healthy_threshold: default_healthy_threshold(),
            unhealthy_threshold: default_unhealthy_threshold(),
            matcher: StatusMatcher::default(),
        }
    }
}

impl HealthCheckPolicy {
    pub fn validate(&self) -> Result<(), PolicyError> {
        if !self.path.starts_with('/') {
            return Err(PolicyError::InvalidPath(self.path.clone()));
        }

        if !(Duration::from_secs(2)..=Duration::from_secs(120)).contains(&self.timeout) {
            return Err(PolicyError::TimeoutOutOfRange(self.timeout));
        }

        if !(Duration::from_secs(5)..=Duration::from_secs(300)).contains(&self.interval) {
            return Err(PolicyError::IntervalOutOfRange(self.interval));
        }

        if self.timeout >= self.interval {
            return Err(PolicyError::TimeoutNotBelowInterval {
                timeout: self.timeout,
                interval: self.interval,
            });
        }

        for (which, value) in [
            ("healthy", self.healthy_threshold),
            ("unhealthy", self.unhealthy_threshold),
        ] {
            if !(2..=10).contains(&value) {
                return Err(PolicyError::ThresholdOutOfRange { which, value });
            }
        }

        Ok(())
    }

    /// Shortest time in which a fresh target can become healthy.
    pub fn minimum_time_to_healthy(&self) -> Duration {
        self.interval * self.healthy_threshold.saturating_sub(1)
    }
}

/// Inclusive range of HTTP status codes counted as success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusMatcher {
    min: u16,
    max: u16,
}

impl StatusMatcher {
    pub fn range(min: u16, max: u16) -> Result<Self, PolicyError> {
        if !(200..=499).contains(&min) || !(200..=499).contains(&max) || min > max {
            return Err(PolicyError::InvalidMatcher(format!("{min}-{max}")));
        }
        Ok(Self { min, max })
    }

    pub fn parse(input: &str) -> Result<Self, PolicyError> {
        let parse_code = |s: &str| {
            s.trim()
                .parse::<u16>()
                .map_err(|_| PolicyError::InvalidMatcher(input.to_string()))
        };

        match input.split_once('-') {
            Some((min, max)) => Self::range(parse_code(min)?, parse_code(max)?),
            None => {
                let code = parse_code(input)?;
                Self::range(code, code)
            }
        }
    }

    pub fn matches(&self, status: u16) -> bool {
        (self.min..=self.max).contains(&status)
    }
}

impl Default for StatusMatcher {
    fn default() -> Self {
        Self { min: 200, max: 299 }
    }
}

impl fmt::Display for StatusMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min == self.max {
            write!(f, "{}", self.min)
        } else {
            write!(f, "{}-{}", self.min, self.max)
        }
    }
}

impl Serialize for StatusMatcher {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StatusMatcher {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        StatusMatcher::parse(&s).map_err(serde::de::Error::custom)
    }
}
