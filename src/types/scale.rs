// ABOUTME: Task set scale as a validated percentage of the service's desired count.
// ABOUTME: Only 0..=100 is representable.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("scale must be between 0 and 100 percent, got {0}")]
pub struct ScaleError(u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Scale(u8);

impl Scale {
    pub const ZERO: Scale = Scale(0);
    pub const FULL: Scale = Scale(100);

    pub fn percent(value: u32) -> Result<Self, ScaleError> {
        u8::try_from(value)
            .ok()
            .filter(|v| *v <= 100)
            .map(Scale)
            .ok_or(ScaleError(value))
    }

    pub fn as_percent(&self) -> u8 {
        self.0
    }

    pub fn is_full(&self) -> bool {
        self.0 == 100
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl Serialize for Scale {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.0)
    }
}

impl<'de> Deserialize<'de> for Scale {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = u32::deserialize(deserializer)?;
        Scale::percent(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_values_above_hundred() {
        assert!(Scale::percent(101).is_err());
        assert!(Scale::percent(100).unwrap().is_full());
    }
}
