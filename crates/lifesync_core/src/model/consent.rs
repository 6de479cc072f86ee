//! Consent state for progress persistence.

use serde::{Deserialize, Serialize};

/// User decision on whether progress events may be persisted server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentState {
    /// No decision recorded yet; delivery is allowed.
    #[default]
    Unset,
    Declined,
    Enabled,
}

impl ConsentState {
    /// Whether the submission client and flush scheduler may run.
    pub fn allows_delivery(self) -> bool {
        !matches!(self, Self::Declined)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Declined => "declined",
            Self::Enabled => "enabled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ConsentState;

    #[test]
    fn only_declined_blocks_delivery() {
        assert!(ConsentState::Unset.allows_delivery());
        assert!(ConsentState::Enabled.allows_delivery());
        assert!(!ConsentState::Declined.allows_delivery());
    }
}
