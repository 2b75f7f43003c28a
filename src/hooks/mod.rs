// ABOUTME: Hooks around shift lifecycle events.
// ABOUTME: Runs executable scripts from .cutover/hooks at pre-shift, post-shift and on-error.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::types::ServiceName;

/// Hook execution points in the shift lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    /// Before the controller touches the service. Failure cancels the command.
    PreShift,
    /// After a shift, approval, abort or rollback succeeded.
    PostShift,
    /// After a failure. Fatal listener errors are reported here for paging.
    OnError,
}

impl HookPoint {
    pub fn filename(&self) -> &'static str {
        match self {
            HookPoint::PreShift => "pre-shift",
            HookPoint::PostShift => "post-shift",
            HookPoint::OnError => "on-error",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, HookPoint::PreShift)
    }
}

/// Passed to hooks as `CUTOVER_*` environment variables.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub service: ServiceName,
    /// `shift`, `approve`, `abort`, `rollback` or `release`.
    pub command: &'static str,
    pub task_definition: Option<String>,
    pub outcome: Option<String>,
    pub error: Option<String>,
}

impl HookContext {
    pub fn new(service: ServiceName, command: &'static str) -> Self {
        Self {
            service,
            command,
            task_definition: None,
            outcome: None,
            error: None,
        }
    }

    pub fn with_task_definition(mut self, task_definition: impl ToString) -> Self {
        self.task_definition = Some(task_definition.to_string());
        self
    }

    pub fn with_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = Some(outcome.into());
        self
    }

    pub fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn to_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert("CUTOVER_SERVICE".to_string(), self.service.to_string());
        env.insert("CUTOVER_COMMAND".to_string(), self.command.to_string());
        let optional = [
            ("CUTOVER_TASK_DEFINITION", &self.task_definition),
            ("CUTOVER_OUTCOME", &self.outcome),
            ("CUTOVER_ERROR", &self.error),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                env.insert(key.to_string(), value.clone());
            }
        }
        env
    }
}

#[derive(Debug)]
pub struct HookResult {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Discovers and runs hooks from a project directory.
pub struct HookRunner {
    hooks_dir: PathBuf,
}

impl HookRunner {
    pub fn new(project_dir: &Path) -> Self {
        Self {
            hooks_dir: project_dir.join(".cutover").join("hooks"),
        }
    }

    pub fn hook_exists(&self, point: HookPoint) -> bool {
        self.hook_path(point).is_file()
    }

    fn hook_path(&self, point: HookPoint) -> PathBuf {
        self.hooks_dir.join(point.filename())
    }

    /// Run a hook if it exists. Returns None when there is no script.
    pub async fn run(&self, point: HookPoint, context: &HookContext) -> Option<HookResult> {
        let hook_path = self.hook_path(point);

        if !hook_path.is_file() {
            return None;
        }

        tracing::info!(hook = point.filename(), path = %hook_path.display(), "running hook");

        let output = Command::new(&hook_path)
            .envs(context.to_env())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await;

        let result = match output {
            Ok(output) => HookResult {
                success: output.status.success(),
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            },
            Err(e) => {
                tracing::error!(hook = point.filename(), error = %e, "failed to execute hook");
                HookResult {
                    success: false,
                    exit_code: None,
                    stdout: String::new(),
                    stderr: e.to_string(),
                }
            }
        };

        if result.success {
            tracing::debug!(hook = point.filename(), "hook completed");
        } else {
            tracing::warn!(
                hook = point.filename(),
                exit_code = ?result.exit_code,
                "hook failed"
            );
        }

        Some(result)
    }
}
