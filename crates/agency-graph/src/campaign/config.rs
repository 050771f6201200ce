//! Campaign pipeline configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::GraphError;

/// Shape of the campaign graph and the thresholds its nodes apply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Revise cycles allowed before escalation
    pub max_revisions: u64,

    /// Insert the A/B simulator after copywriting
    pub ab_testing: bool,

    /// Pause for a human decision after an accepted review
    pub human_approval: bool,

    /// Insert the designer before review
    pub design_stage: bool,

    /// Channels used when the brief names none
    pub channels: Vec<String>,

    /// Minimum review score (0-10) for an accept
    pub approval_threshold: u8,

    /// Bound on every collaborator call
    #[serde(with = "humantime_serde")]
    pub collaborator_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_revisions: 3,
            ab_testing: false,
            human_approval: false,
            design_stage: true,
            channels: vec!["blog".to_string()],
            approval_threshold: 7,
            collaborator_timeout: Duration::from_secs(30),
        }
    }
}

impl PipelineConfig {
    pub fn with_max_revisions(mut self, max: u64) -> Self {
        self.max_revisions = max;
        self
    }

    pub fn with_ab_testing(mut self, enabled: bool) -> Self {
        self.ab_testing = enabled;
        self
    }

    pub fn with_human_approval(mut self, enabled: bool) -> Self {
        self.human_approval = enabled;
        self
    }

    pub fn with_design_stage(mut self, enabled: bool) -> Self {
        self.design_stage = enabled;
        self
    }

    pub fn with_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = channels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_approval_threshold(mut self, threshold: u8) -> Self {
        self.approval_threshold = threshold;
        self
    }

    pub fn with_collaborator_timeout(mut self, timeout: Duration) -> Self {
        self.collaborator_timeout = timeout;
        self
    }

    /// Steps on the longest path to a terminal: intake, the research fan-out,
    /// one pass through the optional stages, review and human approval for
    /// each of the `max_revisions + 1` drafts, then finalize or escalate.
    pub fn required_steps(&self) -> usize {
        let per_draft = 2 + [self.ab_testing, self.design_stage, self.human_approval]
            .iter()
            .filter(|enabled| **enabled)
            .count();
        let drafts = usize::try_from(self.max_revisions).unwrap_or(usize::MAX).saturating_add(1);
        drafts.saturating_mul(per_draft).saturating_add(3)
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        if self.max_revisions == 0 {
            return Err(GraphError::config_error("max_revisions must be at least 1"));
        }
        if self.approval_threshold > 10 {
            return Err(GraphError::config_error(format!(
                "approval_threshold must be 0-10, got {}",
                self.approval_threshold
            )));
        }
        if self.collaborator_timeout.is_zero() {
            return Err(GraphError::config_error("collaborator_timeout must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_revisions, 3);
        assert!(config.design_stage);
        assert!(!config.ab_testing);
        assert!(!config.human_approval);
        assert_eq!(config.channels, vec!["blog"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        assert!(PipelineConfig::default().with_max_revisions(0).validate().is_err());
        assert!(PipelineConfig::default().with_approval_threshold(11).validate().is_err());
        assert!(PipelineConfig::default()
            .with_collaborator_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_required_steps() {
        // 2 + 3 drafts of copywriting, designer, review + escalate
        assert_eq!(PipelineConfig::default().with_max_revisions(2).required_steps(), 12);
        assert_eq!(PipelineConfig::default().required_steps(), 15);

        let everything = PipelineConfig::default()
            .with_ab_testing(true)
            .with_human_approval(true)
            .with_max_revisions(6);
        assert_eq!(everything.required_steps(), 3 + 7 * 5);
        assert_eq!(
            PipelineConfig::default().with_max_revisions(u64::MAX).required_steps(),
            usize::MAX
        );
    }

    #[test]
    fn test_partial_deserialize() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"max_revisions": 2, "collaborator_timeout": "5s"}"#).unwrap();
        assert_eq!(config.max_revisions, 2);
        assert_eq!(config.collaborator_timeout, Duration::from_secs(5));
        assert_eq!(config.approval_threshold, 7);
    }
}
