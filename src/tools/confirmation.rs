use super::catalog::requires_confirmation;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationDecision {
    Approve,
    Deny,
}

impl ConfirmationDecision {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Deny => "deny",
        }
    }
}

impl fmt::Display for ConfirmationDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for ConfirmationDecision {
    type Error = String;

    fn try_from(s: &str) -> Result<Self, String> {
        match s {
            "approve" => Ok(Self::Approve),
            "deny" => Ok(Self::Deny),
            _ => Err(format!("Unknown decision: {s}")),
        }
    }
}

/// How a suspended call was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Decided(ConfirmationDecision),
    /// The last viewer left before anyone answered.
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Immediate,
    AwaitConfirmation,
}

#[must_use]
pub fn gate_for(tool_name: &str) -> Gate {
    if requires_confirmation(tool_name) {
        Gate::AwaitConfirmation
    } else {
        Gate::Immediate
    }
}

#[cfg(test)]
mod tests {
    use super::{gate_for, ConfirmationDecision, Gate};

    #[test]
    fn sensitive_tools_are_gated() {
        assert_eq!(gate_for("delete_idea"), Gate::AwaitConfirmation);
        assert_eq!(gate_for("get_scores"), Gate::Immediate);
    }

    #[test]
    fn decisions_parse_from_wire_names() {
        assert_eq!(
            ConfirmationDecision::try_from("approve"),
            Ok(ConfirmationDecision::Approve)
        );
        assert!(ConfirmationDecision::try_from("maybe").is_err());
    }
}
