// ABOUTME: Diagnostics accumulator for non-fatal warnings during a command.
// ABOUTME: Collects warnings that shouldn't fail a shift but should be shown to users.

/// Collects non-fatal warnings.
#[derive(Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn hook(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Hook,
            message: message.into(),
        }
    }

    pub fn invalid_task_set(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::InvalidTaskSet,
            message: message.into(),
        }
    }

    pub fn stale_release(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::StaleRelease,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// A post-shift or on-error hook failed.
    Hook,
    /// A task set violates the validity invariant (foreign group or unreleased revision).
    InvalidTaskSet,
    /// Production serves a revision older than the latest release.
    StaleRelease,
}
