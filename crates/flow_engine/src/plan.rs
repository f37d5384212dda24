use std::fmt;

pub const LEVEL_REASON_PREFIX: &str = "LevelFlow/";
pub const PHASE_REASON_PREFIX: &str = "PhaseFlow/";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ContentStatePlan {
    state_id: String,
    content_id: String,
    content_signature: String,
}

impl ContentStatePlan {
    pub const NONE: ContentStatePlan = ContentStatePlan {
        state_id: String::new(),
        content_id: String::new(),
        content_signature: String::new(),
    };

    pub fn new(
        state_id: impl AsRef<str>,
        content_id: impl AsRef<str>,
        content_signature: impl AsRef<str>,
    ) -> Self {
        Self {
            state_id: state_id.as_ref().trim().to_string(),
            content_id: content_id.as_ref().trim().to_string(),
            content_signature: content_signature.as_ref().trim().to_string(),
        }
    }

    pub fn for_state(state_id: impl AsRef<str>) -> Self {
        Self::new(state_id, "", "")
    }

    pub fn state_id(&self) -> &str {
        &self.state_id
    }

    pub fn content_id(&self) -> &str {
        &self.content_id
    }

    pub fn content_signature(&self) -> &str {
        &self.content_signature
    }

    pub fn is_valid(&self) -> bool {
        !self.state_id.is_empty()
    }

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }
}

impl fmt::Display for ContentStatePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return f.write_str("<none>");
        }
        write!(f, "{}", self.state_id)?;
        if !self.content_id.is_empty() {
            write!(f, "/{}", self.content_id)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeMode {
    #[default]
    InPlace,
    SwapRequired,
}

/// Granularity a flow operates at. Each scope owns its own store, gate and
/// correlation bridge, and tags every commit reason with its prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowScope {
    Level,
    Phase,
}

impl FlowScope {
    pub fn reason_prefix(self) -> &'static str {
        match self {
            FlowScope::Level => LEVEL_REASON_PREFIX,
            FlowScope::Phase => PHASE_REASON_PREFIX,
        }
    }

    pub fn scoped_reason(self, reason: &str) -> String {
        let prefix = self.reason_prefix();
        let trimmed = reason.trim();
        if trimmed.starts_with(prefix) {
            trimmed.to_string()
        } else {
            format!("{prefix}{trimmed}")
        }
    }

    pub fn owns_reason(self, reason: &str) -> bool {
        reason.starts_with(self.reason_prefix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_trims_all_fields() {
        let plan = ContentStatePlan::new("  S1 ", "\tcontent.a ", " sig ");
        assert_eq!(plan.state_id(), "S1");
        assert_eq!(plan.content_id(), "content.a");
        assert_eq!(plan.content_signature(), "sig");
    }

    #[test]
    fn blank_state_id_is_invalid() {
        assert!(!ContentStatePlan::NONE.is_valid());
        assert!(!ContentStatePlan::new("   ", "content", "sig").is_valid());
        assert!(ContentStatePlan::for_state("S1").is_valid());
    }

    #[test]
    fn plans_compare_by_value() {
        assert_eq!(
            ContentStatePlan::new("S1", "c", ""),
            ContentStatePlan::new(" S1", "c ", "")
        );
        assert_ne!(
            ContentStatePlan::new("S1", "c", ""),
            ContentStatePlan::new("S1", "d", "")
        );
    }

    #[test]
    fn scoped_reason_adds_prefix_once() {
        assert_eq!(FlowScope::Level.scoped_reason("Menu/Start"), "LevelFlow/Menu/Start");
        assert_eq!(
            FlowScope::Phase.scoped_reason("PhaseFlow/Retry"),
            "PhaseFlow/Retry"
        );
        assert!(FlowScope::Phase.owns_reason("PhaseFlow/Retry"));
        assert!(!FlowScope::Level.owns_reason("PhaseFlow/Retry"));
    }
}
