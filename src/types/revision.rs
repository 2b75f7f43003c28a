// ABOUTME: Task definition revision reference ("family:revision").
// ABOUTME: Revisions are append-only, so ordering within a family is meaningful.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseRevisionError {
    #[error("task definition reference must be family:revision, got {0}")]
    InvalidFormat(String),

    #[error("revision must be a positive integer, got {0}")]
    InvalidRevision(String),
}

/// Reference to one immutable revision of a task definition family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskDefinitionRef {
    family: String,
    revision: u32,
}

impl TaskDefinitionRef {
    pub fn new(family: impl Into<String>, revision: u32) -> Self {
        Self {
            family: family.into(),
            revision,
        }
    }

    pub fn parse(input: &str) -> Result<Self, ParseRevisionError> {
        let (family, revision) = input
            .trim()
            .rsplit_once(':')
            .filter(|(family, _)| !family.is_empty())
            .ok_or_else(|| ParseRevisionError::InvalidFormat(input.to_string()))?;

        let revision = revision
            .parse::<u32>()
            .ok()
            .filter(|r| *r > 0)
            .ok_or_else(|| ParseRevisionError::InvalidRevision(revision.to_string()))?;

        Ok(Self::new(family, revision))
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    /// True if both references are in the same family and `self` was
    /// registered after `other`.
    pub fn is_newer_than(&self, other: &TaskDefinitionRef) -> bool {
        self.family == other.family && self.revision > other.revision
    }
}

impl fmt::Display for TaskDefinitionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.family, self.revision)
    }
}

impl Serialize for TaskDefinitionRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TaskDefinitionRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TaskDefinitionRef::parse(&s).map_err(serde::de::Error::custom)
    }
}
