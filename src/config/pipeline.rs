// ABOUTME: Release pipeline section of cutover.yml.
// ABOUTME: Tracked repository and branch, one build per container image, build environment.

use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::HashMap;

use super::EnvValue;
use super::deserialize::deserialize_nonempty;

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_repository")]
    pub repository: String,

    /// Pushes to any other branch are ignored.
    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(deserialize_with = "deserialize_nonempty")]
    pub builds: NonEmpty<BuildConfig>,

    #[serde(default)]
    pub env: HashMap<String, EnvValue>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    pub name: String,

    /// Defaults to `buildspec.<name>.yml`.
    #[serde(default)]
    pub buildspec: Option<String>,

    /// Container whose image this build produces. Defaults to `name`.
    #[serde(default)]
    pub container: Option<String>,

    /// Shell command that builds and pushes the image, printing the image
    /// reference as its last line of output.
    pub command: String,
}

impl BuildConfig {
    pub fn buildspec(&self) -> String {
        self.buildspec
            .clone()
            .unwrap_or_else(|| format!("buildspec.{}.yml", self.name))
    }

    pub fn container(&self) -> &str {
        self.container.as_deref().unwrap_or(&self.name)
    }
}

fn default_repository() -> String {
    "ApplicationRepository".to_string()
}

fn default_branch() -> String {
    "develop".to_string()
}
