// ABOUTME: Build stage of the release pipeline: turns a commit into a pushed image per container.
// ABOUTME: The Builder trait is opaque; CommandBuilder runs a shell command and reads its last output line.

use async_trait::async_trait;
use serde::Serialize;
use snafu::{ResultExt, Snafu};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

use crate::types::{ImageRef, ParseImageRefError};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum BuildError {
    #[snafu(display("failed to start build command: {source}"))]
    Spawn { source: std::io::Error },

    #[snafu(display("build command exited with {}: {}", display_code(*code), stderr.trim()))]
    Exited { code: Option<i32>, stderr: String },

    #[snafu(display("build command printed no image reference"))]
    NoImage,

    #[snafu(display("build printed {line:?}, which is not an image reference: {source}"))]
    InvalidImage {
        line: String,
        source: ParseImageRefError,
    },
}

fn display_code(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "a signal".to_string(),
    }
}

/// One build project run for one commit.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub name: String,
    pub container: String,
    pub buildspec: String,
    pub command: String,
    pub commit: String,
    pub env: BTreeMap<String, String>,
}

impl BuildRequest {
    /// Variables every build sees, on top of the configured environment.
    pub fn to_env(&self) -> BTreeMap<String, String> {
        let mut env = self.env.clone();
        env.insert("CUTOVER_BUILD".to_string(), self.name.clone());
        env.insert("CUTOVER_CONTAINER".to_string(), self.container.clone());
        env.insert("CUTOVER_BUILDSPEC".to_string(), self.buildspec.clone());
        env.insert("CUTOVER_COMMIT".to_string(), self.commit.clone());
        env
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildArtifact {
    pub build: String,
    pub container: String,
    pub image: ImageRef,
}

#[async_trait]
pub trait Builder: Send + Sync {
    /// Build and push the image, returning its reference.
    async fn build(&self, request: &BuildRequest) -> Result<ImageRef, BuildError>;
}

/// Runs `sh -c <command>` in a working directory.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    working_dir: PathBuf,
}

impl CommandBuilder {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }
}

#[async_trait]
impl Builder for CommandBuilder {
    async fn build(&self, request: &BuildRequest) -> Result<ImageRef, BuildError> {
        tracing::info!(build = %request.name, command = %request.command, "starting build");

        let output = Command::new("sh")
            .arg("-c")
            .arg(&request.command)
            .current_dir(&self.working_dir)
            .envs(request.to_env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .context(SpawnSnafu)?;

        if !output.status.success() {
            return ExitedSnafu {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
            .fail();
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .map(str::trim)
            .rfind(|l| !l.is_empty())
            .ok_or(BuildError::NoImage)?;

        let image = ImageRef::parse(line).context(InvalidImageSnafu { line })?;
        tracing::info!(build = %request.name, %image, "build finished");
        Ok(image)
    }
}
