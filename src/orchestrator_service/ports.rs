use crate::domain::ModeTransition;
use crate::error::Result;
use crate::identity::BearerToken;
use crate::llm::{ModelEvent, ModelRequest, ToolCallProposal};
use crate::session::ServerEvent;
use crate::tools::ConfirmationOutcome;
use crate::types::{CallId, ChatMessage, CredentialProfile, Mode, SessionState, ToolOutcome};
use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;

pub type PortFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Settled tool call: the working state after the tool ran, what it returned
/// and any mode transitions it applied.
#[derive(Debug, Clone)]
pub struct ToolRun {
    pub state: SessionState,
    pub outcome: ToolOutcome,
    pub transitions: Vec<ModeTransition>,
}

pub trait ModelGateway {
    fn stream_model(
        &self,
        request: ModelRequest,
        events: mpsc::Sender<ModelEvent>,
    ) -> PortFuture<'_, ()>;
}

pub trait CredentialRefresher {
    /// Re-verifies `token` and returns the fresh profile.
    fn refresh_credential<'a>(
        &'a self,
        token: &'a BearerToken,
    ) -> PortFuture<'a, CredentialProfile>;
}

pub trait ConfirmationGate {
    /// Suspends until the call is approved, denied or abandoned.
    fn await_decision<'a>(&'a self, call_id: &'a CallId) -> PortFuture<'a, ConfirmationOutcome>;
}

pub trait ToolExecutor {
    fn execute_tool(
        &self,
        state: SessionState,
        mode: Mode,
        proposal: ToolCallProposal,
    ) -> PortFuture<'_, ToolRun>;
}

pub trait MessageStore {
    fn save_message<'a>(&'a self, message: &'a ChatMessage) -> PortFuture<'a, ()>;

    fn update_message<'a>(&'a self, message: &'a ChatMessage) -> PortFuture<'a, ()>;
}

pub trait StateSink {
    /// Persists the state and publishes its delta to viewers.
    fn commit_state<'a>(&'a self, state: &'a SessionState) -> PortFuture<'a, ()>;
}

pub trait EventSink {
    fn emit(&self, event: ServerEvent) -> PortFuture<'_, ()>;
}

pub trait TurnPorts:
    ModelGateway
    + CredentialRefresher
    + ConfirmationGate
    + ToolExecutor
    + MessageStore
    + StateSink
    + EventSink
{
}

impl<T> TurnPorts for T where
    T: ModelGateway
        + CredentialRefresher
        + ConfirmationGate
        + ToolExecutor
        + MessageStore
        + StateSink
        + EventSink
{
}
