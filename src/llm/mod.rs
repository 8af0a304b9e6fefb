#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Boundary to the language-model completion service.

pub mod http;
pub mod scripted;

use crate::identity::BearerToken;
use crate::orchestrator_service::PortFuture;
use crate::types::{CallId, ChatMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

pub use http::HttpModelService;
pub use scripted::{ScriptedModel, ScriptedStep};

/// Capacity of the channel between a model adapter and the turn loop.
pub const MODEL_EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub max_steps: usize,
    pub auth_token: BearerToken,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallProposal {
    pub call_id: CallId,
    pub tool_name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelEvent {
    TextDelta(String),
    ToolCall(ToolCallProposal),
    Finished { reason: String },
}

pub trait ModelService: Send + Sync {
    /// Streams one completion step into `events`. Returns once the step is
    /// complete or the receiver is gone. Non-success responses surface as
    /// `SessionError::ModelStatus`.
    fn stream<'a>(
        &'a self,
        request: ModelRequest,
        events: mpsc::Sender<ModelEvent>,
    ) -> PortFuture<'a, ()>;
}
