use std::time::Duration;

use crate::collaborators::ENVIRONMENT_SWAP_TOKEN;
use crate::plan::ChangeMode;

pub const IN_PLACE_QA_TAG: &str = "InPlace/QA";
pub const IN_PLACE_DEV_TAG: &str = "InPlace/Dev";

#[derive(Debug, Clone)]
pub struct FlowConfig {
    pub default_change_mode: ChangeMode,
    pub swap_token_id: String,
    pub token_release_timeout: Duration,
    pub token_poll_interval: Duration,
    pub ready_grace: Duration,
    pub ready_timeout: Duration,
    pub ready_poll_interval: Duration,
    pub suppressed_intro_tags: Vec<String>,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            default_change_mode: ChangeMode::InPlace,
            swap_token_id: ENVIRONMENT_SWAP_TOKEN.to_string(),
            token_release_timeout: Duration::from_millis(1_500),
            token_poll_interval: Duration::from_millis(16),
            ready_grace: Duration::from_millis(250),
            ready_timeout: Duration::from_secs(5),
            ready_poll_interval: Duration::from_millis(16),
            suppressed_intro_tags: vec![IN_PLACE_QA_TAG.to_string(), IN_PLACE_DEV_TAG.to_string()],
        }
    }
}

impl FlowConfig {
    pub fn suppresses_intro(&self, reason: &str) -> bool {
        self.suppressed_intro_tags
            .iter()
            .any(|tag| !tag.is_empty() && reason.contains(tag.as_str()))
    }

    pub(crate) fn normalized(mut self) -> Self {
        self.token_poll_interval = non_zero(self.token_poll_interval, Duration::from_millis(16));
        self.ready_poll_interval = non_zero(self.ready_poll_interval, Duration::from_millis(16));
        if self.ready_timeout < self.ready_grace {
            self.ready_timeout = self.ready_grace;
        }
        self
    }
}

fn non_zero(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tags_suppress_diagnostic_reasons_only() {
        let config = FlowConfig::default();
        assert!(config.suppresses_intro("PhaseFlow/InPlace/QA/NextPhase"));
        assert!(config.suppresses_intro("LevelFlow/InPlace/Dev/Reload"));
        assert!(!config.suppresses_intro("LevelFlow/Menu/Start"));
    }

    #[test]
    fn normalized_repairs_zero_intervals_and_short_timeout() {
        let config = FlowConfig {
            token_poll_interval: Duration::ZERO,
            ready_grace: Duration::from_secs(2),
            ready_timeout: Duration::from_secs(1),
            ..FlowConfig::default()
        }
        .normalized();

        assert_eq!(config.token_poll_interval, Duration::from_millis(16));
        assert_eq!(config.ready_timeout, Duration::from_secs(2));
    }
}
