// ABOUTME: Config values that are either literal or read from the environment.
// ABOUTME: Used for pipeline build variables; resolved once when a build starts.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// `KEY: value` or `KEY: { env: VAR, default: fallback }`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Literal(String),
    FromEnv {
        #[serde(rename = "env")]
        var: String,
        #[serde(default)]
        default: Option<String>,
    },
}

impl EnvValue {
    pub fn resolve(&self) -> Result<String> {
        match self {
            EnvValue::Literal(s) => Ok(s.clone()),
            EnvValue::FromEnv { var, default } => std::env::var(var)
                .ok()
                .or_else(|| default.clone())
                .ok_or_else(|| Error::MissingEnvVar(var.clone())),
        }
    }
}

/// Resolve every entry, sorted by key so builds see a stable environment.
pub fn resolve_env_map(map: &HashMap<String, EnvValue>) -> Result<BTreeMap<String, String>> {
    map.iter()
        .map(|(k, v)| v.resolve().map(|resolved| (k.clone(), resolved)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_reference_prefers_the_variable() {
        let value = EnvValue::FromEnv {
            var: "CUTOVER_TEST_REGISTRY".to_string(),
            default: Some("fallback".to_string()),
        };
        temp_env::with_var("CUTOVER_TEST_REGISTRY", Some("registry.local"), || {
            assert_eq!(value.resolve().unwrap(), "registry.local");
        });
        temp_env::with_var_unset("CUTOVER_TEST_REGISTRY", || {
            assert_eq!(value.resolve().unwrap(), "fallback");
        });
    }

    #[test]
    fn missing_variable_without_default_is_an_error() {
        let value = EnvValue::FromEnv {
            var: "CUTOVER_TEST_UNSET".to_string(),
            default: None,
        };
        temp_env::with_var_unset("CUTOVER_TEST_UNSET", || {
            assert!(matches!(value.resolve(), Err(Error::MissingEnvVar(v)) if v == "CUTOVER_TEST_UNSET"));
        });
    }
}
