// ABOUTME: Source stage of the release pipeline: a push to a tracked repository branch.

use serde::Serialize;

use crate::config::PipelineConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceEvent {
    pub repository: String,
    pub branch: String,
    pub commit: String,
}

impl SourceEvent {
    pub fn new(
        repository: impl Into<String>,
        branch: impl Into<String>,
        commit: impl Into<String>,
    ) -> Self {
        Self {
            repository: repository.into(),
            branch: branch.into(),
            commit: commit.into(),
        }
    }

    /// Only pushes to the tracked branch of the tracked repository start a
    /// release.
    pub fn accepts(&self, pipeline: &PipelineConfig) -> bool {
        self.repository == pipeline.repository && self.branch == pipeline.branch
    }

    /// Abbreviated commit, used as the image tag suffix in logs.
    pub fn short_commit(&self) -> &str {
        self.commit.get(..7).unwrap_or(&self.commit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nonempty::NonEmpty;

    fn pipeline() -> PipelineConfig {
        PipelineConfig {
            repository: "ApplicationRepository".to_string(),
            branch: "develop".to_string(),
            builds: NonEmpty::new(crate::config::BuildConfig {
                name: "app".to_string(),
                buildspec: None,
                container: None,
                command: "true".to_string(),
            }),
            env: Default::default(),
        }
    }

    #[test]
    fn pushes_to_other_branches_are_ignored() {
        let config = pipeline();
        assert!(SourceEvent::new("ApplicationRepository", "develop", "abc").accepts(&config));
        assert!(!SourceEvent::new("ApplicationRepository", "main", "abc").accepts(&config));
        assert!(!SourceEvent::new("Other", "develop", "abc").accepts(&config));
    }

    #[test]
    fn short_commit_handles_short_input() {
        assert_eq!(SourceEvent::new("r", "b", "0123456789").short_commit(), "0123456");
        assert_eq!(SourceEvent::new("r", "b", "abc").short_commit(), "abc");
    }
}
