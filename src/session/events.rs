use crate::domain::StateDelta;
use crate::orchestrator_service::TurnOutcome;
use crate::transfer::ImportReport;
use crate::types::{CallId, InvocationState, MessageId, Mode, SessionId, ToolOutcome, TurnErrorCard};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionReady {
    pub session_id: SessionId,
    pub mode: Mode,
    pub state: StateDelta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResultEvent {
    pub message_id: MessageId,
    pub call_id: CallId,
    pub tool_name: String,
    pub state: InvocationState,
    pub result: ToolOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationRequestEvent {
    pub message_id: MessageId,
    pub call_id: CallId,
    pub tool_name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextDeltaEvent {
    pub message_id: MessageId,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnCompleteEvent {
    pub outcome: TurnOutcome,
    pub steps: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeEvent {
    pub message_id: MessageId,
    pub mode: Mode,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandErrorEvent {
    pub code: String,
    pub message: String,
}

/// Everything pushed to the viewers of one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum ServerEvent {
    ConnectionReady(ConnectionReady),
    StateDelta(StateDelta),
    ToolResult(ToolResultEvent),
    ConfirmationRequest(ConfirmationRequestEvent),
    TextDelta(TextDeltaEvent),
    TurnComplete(TurnCompleteEvent),
    TurnError(TurnErrorCard),
    Notice(NoticeEvent),
    ExportReady(Value),
    ImportComplete(ImportReport),
    CommandError(CommandErrorEvent),
}

impl ServerEvent {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionReady(_) => "connection-ready",
            Self::StateDelta(_) => "state-delta",
            Self::ToolResult(_) => "tool-result",
            Self::ConfirmationRequest(_) => "confirmation-request",
            Self::TextDelta(_) => "text-delta",
            Self::TurnComplete(_) => "turn-complete",
            Self::TurnError(_) => "turn-error",
            Self::Notice(_) => "notice",
            Self::ExportReady(_) => "export-ready",
            Self::ImportComplete(_) => "import-complete",
            Self::CommandError(_) => "command-error",
        }
    }
}
