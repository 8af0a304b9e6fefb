#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Named tools the model may call, and the contract that turns every call
//! into a `ToolOutcome`.

mod builtin;
pub mod catalog;
pub mod confirmation;
pub mod contract;

use crate::context::SessionContext;
use crate::db::SessionDb;
use crate::domain::{ModeTransition, SessionPatch};
use crate::error::SessionError;
use crate::types::{Mode, SessionId, SessionState};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

pub use catalog::{
    requires_confirmation, tool_names_for_mode, ToolCatalog, ToolName, ToolRegistry,
    COMMON_TOOLS, CONFIRMATION_REQUIRED,
};
pub use confirmation::{gate_for, ConfirmationDecision, ConfirmationOutcome, Gate};
pub use contract::{invoke_tool, wrap};

/// Failure a tool reports back to the model. Never escapes the contract layer.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Storage failure: {0}")]
    Storage(String),
}

impl ToolError {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArguments(_) => "invalid_arguments",
            Self::NotFound(_) => "not_found",
            Self::Precondition(_) => "precondition",
            Self::Storage(_) => "storage",
        }
    }

    #[must_use]
    pub fn details(&self) -> Value {
        json!({ "kind": self.kind() })
    }
}

impl From<SessionError> for ToolError {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::Validation(message) => Self::InvalidArguments(message),
            SessionError::NotFound(message) => Self::NotFound(message),
            SessionError::Conflict(message) => Self::Precondition(message),
            other => Self::Storage(other.to_string()),
        }
    }
}

pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + 'a>>;

pub trait Tool: Send + Sync {
    fn name(&self) -> ToolName;

    fn description(&self) -> &'static str;

    /// JSON schema of the arguments object.
    fn parameters(&self) -> Value;

    fn execute<'a>(&'a self, ctx: &'a mut ToolContext, args: Value) -> ToolFuture<'a>;
}

/// Working copy of the session a tool mutates, plus the collaborators it may
/// touch. Mode changes are recorded so the caller can emit notices.
#[derive(Debug)]
pub struct ToolContext {
    state: SessionState,
    db: SessionDb,
    context: SessionContext,
    transitions: Vec<ModeTransition>,
}

impl ToolContext {
    #[must_use]
    pub const fn new(state: SessionState, db: SessionDb, context: SessionContext) -> Self {
        Self {
            state,
            db,
            context,
            transitions: Vec::new(),
        }
    }

    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub const fn db(&self) -> &SessionDb {
        &self.db
    }

    #[must_use]
    pub const fn session_id(&self) -> &SessionId {
        self.context.session_id()
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.context.now()
    }

    /// # Errors
    /// Returns the validation failure; the working state is left untouched.
    pub fn apply_patch(&mut self, patch: SessionPatch) -> Result<(), ToolError> {
        let now = self.now();
        self.state.apply_patch(patch, now).map_err(ToolError::from)
    }

    pub fn set_mode(&mut self, target: Mode, force: bool) -> ModeTransition {
        let now = self.now();
        let transition = self.state.set_mode(target, force, now);
        if transition.is_applied() {
            self.transitions.push(transition);
        }
        transition
    }

    #[must_use]
    pub fn into_parts(self) -> (SessionState, Vec<ModeTransition>) {
        (self.state, self.transitions)
    }
}

/// Decodes a tool's argument object, treating a missing object as empty.
///
/// # Errors
/// Returns `InvalidArguments` with the decoder's message.
pub fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}
