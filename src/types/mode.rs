use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating mode of a session. Selects the tool subset offered to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Onboarding,
    Integration,
    Plan,
    Act,
}

impl Mode {
    pub const ALL: [Self; 4] = [Self::Onboarding, Self::Integration, Self::Plan, Self::Act];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Onboarding => "onboarding",
            Self::Integration => "integration",
            Self::Plan => "plan",
            Self::Act => "act",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for Mode {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "onboarding" => Ok(Self::Onboarding),
            "integration" => Ok(Self::Integration),
            "plan" => Ok(Self::Plan),
            "act" => Ok(Self::Act),
            _ => Err(format!("Unknown mode: {s}")),
        }
    }
}
