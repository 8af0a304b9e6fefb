use super::identifiers::{CallId, MessageId};
use super::mode::Mode;
use super::tool_outcome::ToolOutcome;
use crate::error::{Result, SessionError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, String> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            _ => Err(format!("Unknown role: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvocationState {
    Proposed,
    AwaitingConfirmation,
    Approved,
    Denied,
    Executed,
}

impl InvocationState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::AwaitingConfirmation => "awaiting-confirmation",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::Executed => "executed",
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Denied | Self::Executed)
    }
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One proposed tool call and, once settled, its result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInvocation {
    pub call_id: CallId,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Value,
    pub state: InvocationState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolOutcome>,
}

impl ToolInvocation {
    #[must_use]
    pub const fn proposed(call_id: CallId, tool_name: String, arguments: Value) -> Self {
        Self {
            call_id,
            tool_name,
            arguments,
            state: InvocationState::Proposed,
            result: None,
        }
    }

    fn advance(&mut self, allowed_from: &[InvocationState], to: InvocationState) -> Result<()> {
        if allowed_from.contains(&self.state) {
            self.state = to;
            Ok(())
        } else {
            Err(SessionError::Conflict(format!(
                "tool call {} cannot move from {} to {}",
                self.call_id, self.state, to
            )))
        }
    }

    /// # Errors
    /// Returns a conflict unless the call is still `proposed`.
    pub fn await_confirmation(&mut self) -> Result<()> {
        self.advance(
            &[InvocationState::Proposed],
            InvocationState::AwaitingConfirmation,
        )
    }

    /// # Errors
    /// Returns a conflict unless the call is awaiting confirmation.
    pub fn approve(&mut self) -> Result<()> {
        self.advance(
            &[InvocationState::AwaitingConfirmation],
            InvocationState::Approved,
        )
    }

    /// # Errors
    /// Returns a conflict unless the call is awaiting confirmation.
    pub fn deny(&mut self, outcome: ToolOutcome) -> Result<()> {
        self.advance(
            &[InvocationState::AwaitingConfirmation],
            InvocationState::Denied,
        )?;
        self.result = Some(outcome);
        Ok(())
    }

    /// # Errors
    /// Returns a conflict if the call already settled or still awaits a decision.
    pub fn complete(&mut self, outcome: ToolOutcome) -> Result<()> {
        self.advance(
            &[InvocationState::Proposed, InvocationState::Approved],
            InvocationState::Executed,
        )?;
        self.result = Some(outcome);
        Ok(())
    }
}

/// Retryable error card shown in place of a settled reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnErrorCard {
    pub summary: String,
    #[serde(default)]
    pub detail: Value,
    pub timestamp: DateTime<Utc>,
    pub retryable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    Text { text: String },
    ToolCall(ToolInvocation),
    Notice { mode: Mode, text: String },
    Error(TurnErrorCard),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub role: Role,
    pub parts: Vec<MessagePart>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: Role, parts: Vec<MessagePart>, now: DateTime<Utc>) -> Self {
        Self {
            id: MessageId::generate(),
            role,
            parts,
            created_at: now,
        }
    }

    #[must_use]
    pub fn user_text(text: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self::new(Role::User, vec![MessagePart::Text { text: text.into() }], now)
    }

    #[must_use]
    pub fn notice(mode: Mode, text: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self::new(
            Role::System,
            vec![MessagePart::Notice {
                mode,
                text: text.into(),
            }],
            now,
        )
    }

    #[must_use]
    pub fn error_card(card: TurnErrorCard, now: DateTime<Utc>) -> Self {
        Self::new(Role::Assistant, vec![MessagePart::Error(card)], now)
    }

    #[must_use]
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                MessagePart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn invocations(&self) -> impl Iterator<Item = &ToolInvocation> {
        self.parts.iter().filter_map(|part| match part {
            MessagePart::ToolCall(invocation) => Some(invocation),
            _ => None,
        })
    }

    #[must_use]
    pub fn is_error_card(&self) -> bool {
        !self.parts.is_empty()
            && self
                .parts
                .iter()
                .all(|part| matches!(part, MessagePart::Error(_)))
    }
}
