use super::cancel::CancelSignal;
use super::ports::{ToolRun, TurnPorts};
use super::timing::elapsed_ms;
use crate::context::SessionContext;
use crate::domain::{ModeTransition, SessionPatch};
use crate::error::{code, Result, SessionError};
use crate::identity::BearerToken;
use crate::llm::{ModelEvent, ModelRequest, ToolCallProposal, MODEL_EVENT_BUFFER};
use crate::prompts::{system_prompt, welcome_notice};
use crate::session::events::{
    ConfirmationRequestEvent, NoticeEvent, TextDeltaEvent, ToolResultEvent, TurnCompleteEvent,
};
use crate::session::ServerEvent;
use crate::tools::{gate_for, ConfirmationDecision, ConfirmationOutcome, Gate, ToolCatalog};
use crate::types::{
    ChatMessage, MessageId, MessagePart, Role, SessionState, ToolInvocation, ToolOutcome,
    TurnErrorCard,
};
use itertools::{Either, Itertools};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TurnOutcome {
    /// The model answered without proposing further tool calls.
    Completed,
    StepLimit,
    /// The last viewer left while a call awaited confirmation.
    Abandoned,
    Aborted,
    Failed,
}

impl TurnOutcome {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::StepLimit => "step-limit",
            Self::Abandoned => "abandoned",
            Self::Aborted => "aborted",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for TurnOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnSettings {
    pub max_steps: usize,
}

impl TurnSettings {
    pub const DEFAULT_MAX_STEPS: usize = 8;
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            max_steps: Self::DEFAULT_MAX_STEPS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TurnRequest {
    /// Snapshot taken when the turn starts.
    pub state: SessionState,
    pub history: Vec<ChatMessage>,
    pub user_text: String,
    pub token: BearerToken,
}

#[derive(Debug, Clone)]
pub struct TurnReport {
    pub outcome: TurnOutcome,
    pub state: SessionState,
    pub steps: usize,
    pub elapsed_ms: u64,
}

/// History as the model sees it: no error cards and no calls that never settled.
#[must_use]
pub fn model_history(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    messages
        .iter()
        .filter(|message| !message.is_error_card())
        .map(|message| ChatMessage {
            parts: message
                .parts
                .iter()
                .filter(|part| match part {
                    MessagePart::Error(_) => false,
                    MessagePart::ToolCall(invocation) => invocation.result.is_some(),
                    MessagePart::Text { .. } | MessagePart::Notice { .. } => true,
                })
                .cloned()
                .collect(),
            ..message.clone()
        })
        .filter(|message| !message.parts.is_empty())
        .collect()
}

struct StepOutput {
    text: String,
    proposals: Vec<ToolCallProposal>,
}

struct TurnRun {
    state: SessionState,
    history: Vec<ChatMessage>,
    notices: Vec<ChatMessage>,
    catalog: ToolCatalog,
    token: BearerToken,
    steps: usize,
    refreshed: bool,
}

impl TurnRun {
    /// Tools outside this turn's catalog fail on execution, so they never wait.
    fn gate(&self, tool_name: &str) -> Gate {
        if self.catalog.contains(tool_name) {
            gate_for(tool_name)
        } else {
            Gate::Immediate
        }
    }
}

enum CallSettled {
    Settled,
    Abandoned,
}

fn aborted(reason: &str) -> SessionError {
    SessionError::TurnAborted(reason.to_string())
}

fn replace_call(message: &mut ChatMessage, index: usize, invocation: ToolInvocation) {
    if let Some(slot) = message.parts.get_mut(index) {
        *slot = MessagePart::ToolCall(invocation);
    }
}

fn failure_summary(error: &SessionError) -> &'static str {
    match error {
        SessionError::ModelStatus { status: 401 | 403, .. } => {
            "The assistant could not authorize this request. Sign in again and retry."
        }
        SessionError::ModelStatus { .. } | SessionError::ModelError(_) => {
            "The assistant service is unavailable right now. Please retry."
        }
        SessionError::IdentityError(_) | SessionError::Unauthorized(_) => {
            "Your credentials could not be verified. Please retry."
        }
        _ => "Something went wrong while answering. Please retry.",
    }
}

pub struct TurnService<P> {
    ports: P,
    context: SessionContext,
    settings: TurnSettings,
}

impl<P> TurnService<P>
where
    P: TurnPorts + Send + Sync,
{
    #[must_use]
    pub const fn new(ports: P, context: SessionContext, settings: TurnSettings) -> Self {
        Self {
            ports,
            context,
            settings,
        }
    }

    #[must_use]
    pub const fn ports(&self) -> &P {
        &self.ports
    }

    #[must_use]
    pub const fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Runs one turn for `request.user_text`.
    ///
    /// Unexpected failures are recorded as an error card and reported as
    /// `TurnOutcome::Failed`; mutations already applied stay applied.
    ///
    /// # Errors
    /// Returns an error only when the failure itself cannot be recorded.
    pub async fn run(&self, request: TurnRequest, cancel: CancelSignal) -> Result<TurnReport> {
        let started = Instant::now();
        let TurnRequest {
            state,
            history,
            user_text,
            token,
        } = request;
        let mut run = TurnRun {
            catalog: ToolCatalog::for_mode(state.mode),
            state,
            history,
            notices: Vec::new(),
            token,
            steps: 0,
            refreshed: false,
        };
        info!(mode = %run.catalog.mode(), "Turn started");

        let outcome = match self.drive(&mut run, user_text, &cancel).await {
            Ok(outcome) => outcome,
            Err(SessionError::TurnAborted(reason)) => {
                warn!(%reason, steps = run.steps, "Turn aborted");
                TurnOutcome::Aborted
            }
            Err(failure) => {
                self.record_failure(&failure).await?;
                TurnOutcome::Failed
            }
        };

        self.ports
            .emit(ServerEvent::TurnComplete(TurnCompleteEvent {
                outcome,
                steps: run.steps,
            }))
            .await?;
        let elapsed_ms = elapsed_ms(started);
        info!(%outcome, steps = run.steps, elapsed_ms, "Turn finished");

        Ok(TurnReport {
            outcome,
            state: run.state,
            steps: run.steps,
            elapsed_ms,
        })
    }

    async fn drive(
        &self,
        run: &mut TurnRun,
        user_text: String,
        cancel: &CancelSignal,
    ) -> Result<TurnOutcome> {
        let user = ChatMessage::user_text(user_text, self.context.now());
        self.ports.save_message(&user).await?;
        run.history.push(user);

        while run.steps < self.settings.max_steps {
            if cancel.is_cancelled() {
                return Err(aborted("cancelled between steps"));
            }
            run.steps += 1;

            let message_id = MessageId::generate();
            let step = self.stream_with_refresh(run, &message_id, cancel).await?;
            let mut message = self.assistant_message(message_id, step);

            if message.invocations().next().is_none() {
                if !message.parts.is_empty() {
                    self.ports.save_message(&message).await?;
                    run.history.push(message);
                }
                return Ok(TurnOutcome::Completed);
            }

            self.ports.save_message(&message).await?;
            // Ungated calls run at proposal time; gated ones wait afterwards.
            let (immediate, gated): (Vec<usize>, Vec<usize>) = message
                .parts
                .iter()
                .enumerate()
                .filter_map(|(index, part)| match part {
                    MessagePart::ToolCall(invocation) => Some((index, invocation)),
                    _ => None,
                })
                .partition_map(|(index, invocation)| match run.gate(&invocation.tool_name) {
                    Gate::Immediate => Either::Left(index),
                    Gate::AwaitConfirmation => Either::Right(index),
                });
            for index in immediate.into_iter().chain(gated) {
                if let CallSettled::Abandoned =
                    self.settle_call(run, &mut message, index, cancel).await?
                {
                    return Ok(TurnOutcome::Abandoned);
                }
            }
            run.history.push(message);
            run.history.append(&mut run.notices);
        }

        warn!(max_steps = self.settings.max_steps, "Turn reached its step limit");
        Ok(TurnOutcome::StepLimit)
    }

    fn assistant_message(&self, id: MessageId, step: StepOutput) -> ChatMessage {
        let mut parts = Vec::with_capacity(step.proposals.len() + 1);
        if !step.text.is_empty() {
            parts.push(MessagePart::Text { text: step.text });
        }
        parts.extend(step.proposals.into_iter().map(|proposal| {
            MessagePart::ToolCall(ToolInvocation::proposed(
                proposal.call_id,
                proposal.tool_name,
                proposal.arguments,
            ))
        }));
        ChatMessage {
            id,
            role: Role::Assistant,
            parts,
            created_at: self.context.now(),
        }
    }

    async fn stream_with_refresh(
        &self,
        run: &mut TurnRun,
        message_id: &MessageId,
        cancel: &CancelSignal,
    ) -> Result<StepOutput> {
        loop {
            let request = ModelRequest {
                system_prompt: system_prompt(&run.state),
                messages: model_history(&run.history),
                tools: run.catalog.definitions(),
                max_steps: self.settings.max_steps,
                auth_token: run.token.clone(),
            };
            match self.stream_step(request, message_id, cancel).await {
                Err(failure) if failure.is_model_forbidden() && !run.refreshed => {
                    run.refreshed = true;
                    warn!("Model service refused the credential; refreshing once");
                    let profile = self.ports.refresh_credential(&run.token).await?;
                    run.state.apply_patch(
                        SessionPatch {
                            credential: Some(Some(profile)),
                            ..SessionPatch::default()
                        },
                        self.context.now(),
                    )?;
                    self.ports.commit_state(&run.state).await?;
                }
                other => return other,
            }
        }
    }

    async fn stream_step(
        &self,
        request: ModelRequest,
        message_id: &MessageId,
        cancel: &CancelSignal,
    ) -> Result<StepOutput> {
        let (events, mut inbox) = mpsc::channel(MODEL_EVENT_BUFFER);
        let producer = self.ports.stream_model(request, events);
        let consumer = async {
            let mut output = StepOutput {
                text: String::new(),
                proposals: Vec::new(),
            };
            while let Some(event) = inbox.recv().await {
                match event {
                    ModelEvent::TextDelta(text) => {
                        output.text.push_str(&text);
                        self.ports
                            .emit(ServerEvent::TextDelta(TextDeltaEvent {
                                message_id: message_id.clone(),
                                text,
                            }))
                            .await?;
                    }
                    ModelEvent::ToolCall(proposal) => output.proposals.push(proposal),
                    ModelEvent::Finished { reason } => debug!(%reason, "Model step finished"),
                }
            }
            Ok::<_, SessionError>(output)
        };

        tokio::select! {
            (streamed, collected) = async { tokio::join!(producer, consumer) } => {
                streamed?;
                collected
            }
            () = cancel.cancelled() => Err(aborted("cancelled while streaming")),
        }
    }

    async fn settle_call(
        &self,
        run: &mut TurnRun,
        message: &mut ChatMessage,
        index: usize,
        cancel: &CancelSignal,
    ) -> Result<CallSettled> {
        let Some(MessagePart::ToolCall(mut invocation)) = message.parts.get(index).cloned() else {
            return Ok(CallSettled::Settled);
        };
        let proposal = ToolCallProposal {
            call_id: invocation.call_id.clone(),
            tool_name: invocation.tool_name.clone(),
            arguments: invocation.arguments.clone(),
        };

        match run.gate(&invocation.tool_name) {
            Gate::Immediate => {
                let outcome = self.execute(run, proposal).await?;
                invocation.complete(outcome)?;
            }
            Gate::AwaitConfirmation => {
                invocation.await_confirmation()?;
                replace_call(message, index, invocation.clone());
                self.ports.update_message(message).await?;
                self.ports
                    .emit(ServerEvent::ConfirmationRequest(ConfirmationRequestEvent {
                        message_id: message.id.clone(),
                        call_id: invocation.call_id.clone(),
                        tool_name: invocation.tool_name.clone(),
                        arguments: invocation.arguments.clone(),
                    }))
                    .await?;
                info!(call_id = %invocation.call_id, tool = %invocation.tool_name, "Awaiting confirmation");

                let decision = tokio::select! {
                    decision = self.ports.await_decision(&invocation.call_id) => decision?,
                    () = cancel.cancelled() => return Err(aborted("cancelled while awaiting confirmation")),
                };
                match decision {
                    ConfirmationOutcome::Abandoned => {
                        warn!(call_id = %invocation.call_id, "Confirmation abandoned; turn closed");
                        return Ok(CallSettled::Abandoned);
                    }
                    ConfirmationOutcome::Decided(ConfirmationDecision::Approve) => {
                        invocation.approve()?;
                        let outcome = self.execute(run, proposal).await?;
                        invocation.complete(outcome)?;
                    }
                    ConfirmationOutcome::Decided(ConfirmationDecision::Deny) => {
                        let denial = ToolOutcome::denied(&invocation.tool_name, self.context.now());
                        invocation.deny(denial)?;
                    }
                }
            }
        }

        let result = invocation
            .result
            .clone()
            .ok_or_else(|| SessionError::Internal("settled call has no result".to_string()))?;
        let event = ToolResultEvent {
            message_id: message.id.clone(),
            call_id: invocation.call_id.clone(),
            tool_name: invocation.tool_name.clone(),
            state: invocation.state,
            result,
        };
        replace_call(message, index, invocation);
        self.ports.update_message(message).await?;
        self.ports.emit(ServerEvent::ToolResult(event)).await?;
        Ok(CallSettled::Settled)
    }

    async fn execute(&self, run: &mut TurnRun, proposal: ToolCallProposal) -> Result<ToolOutcome> {
        let tool_name = proposal.tool_name.clone();
        let ToolRun {
            state,
            outcome,
            transitions,
        } = self
            .ports
            .execute_tool(run.state.clone(), run.catalog.mode(), proposal)
            .await?;
        debug!(tool = %tool_name, success = outcome.success, "Tool settled");

        if state != run.state {
            run.state = state;
            self.ports.commit_state(&run.state).await?;
        }
        for transition in transitions {
            self.announce(run, transition).await?;
        }
        Ok(outcome)
    }

    async fn announce(&self, run: &mut TurnRun, transition: ModeTransition) -> Result<()> {
        info!(
            from = %transition.from(),
            to = %transition.to(),
            reason = transition.reason().code(),
            "Mode transition applied"
        );
        let mode = transition.to();
        let notice = ChatMessage::notice(mode, welcome_notice(mode), self.context.now());
        self.ports.save_message(&notice).await?;
        self.ports
            .emit(ServerEvent::Notice(NoticeEvent {
                message_id: notice.id.clone(),
                mode,
                text: welcome_notice(mode).to_string(),
            }))
            .await?;
        run.notices.push(notice);
        Ok(())
    }

    async fn record_failure(&self, failure: &SessionError) -> Result<()> {
        error!(code = failure.code(), error = %failure, "Turn failed");
        let card = TurnErrorCard {
            summary: failure_summary(failure).to_string(),
            detail: json!({ "code": failure.code(), "message": failure.to_string() }),
            timestamp: self.context.now(),
            retryable: failure.code() != code::INVALID,
        };
        let message = ChatMessage::error_card(card.clone(), self.context.now());
        self.ports.save_message(&message).await?;
        self.ports.emit(ServerEvent::TurnError(card)).await
    }
}
