use super::commands::{Reply, SessionCommand};
use super::events::{CommandErrorEvent, NoticeEvent, ServerEvent};
use crate::context::SessionContext;
use crate::db::SessionDb;
use crate::domain::{state_delta, ModeTransition, SessionPatch};
use crate::error::{Result, SessionError};
use crate::identity::{BearerToken, IdentityVerifier};
use crate::llm::{ModelEvent, ModelRequest, ModelService, ToolCallProposal};
use crate::orchestrator_service::{
    cancel_pair, CancelTrigger, ConfirmationGate, CredentialRefresher, EventSink, MessageStore,
    ModelGateway, PortFuture, StateSink, ToolExecutor, ToolRun, TurnReport, TurnRequest,
    TurnService, TurnSettings,
};
use crate::prompts::welcome_notice;
use crate::tools::{ConfirmationOutcome, ToolCatalog, ToolContext};
use crate::transfer::{export_session, import_session, ImportOptions, ImportReport};
use crate::types::{CallId, ChatMessage, CredentialProfile, Mode, SessionId, SessionState};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tracing::{debug, info, warn};

/// State the actor shares with every handle. Reads never touch the queue.
#[derive(Debug)]
pub struct SessionShared {
    pub(crate) session_id: SessionId,
    pub(crate) db: SessionDb,
    pub(crate) snapshot: watch::Sender<SessionState>,
    pub(crate) events: broadcast::Sender<ServerEvent>,
    pub(crate) viewers: watch::Sender<usize>,
    pub(crate) cancel: StdMutex<Option<CancelTrigger>>,
    /// Fingerprint of the last verified bearer token.
    pub(crate) verified: StdMutex<Option<String>>,
}

impl SessionShared {
    pub(crate) fn new(
        session_id: SessionId,
        db: SessionDb,
        state: SessionState,
        event_buffer: usize,
        verified: Option<String>,
    ) -> Self {
        let (snapshot, _) = watch::channel(state);
        let (events, _) = broadcast::channel(event_buffer.max(1));
        let (viewers, _) = watch::channel(0);
        Self {
            session_id,
            db,
            snapshot,
            events,
            viewers,
            cancel: StdMutex::new(None),
            verified: StdMutex::new(verified),
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn broadcast(&self, event: ServerEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    pub(crate) fn verified_fingerprint(&self) -> Option<String> {
        self.verified.lock().ok().and_then(|guard| guard.clone())
    }

    pub(crate) fn set_verified_fingerprint(&self, fingerprint: Option<String>) {
        if let Ok(mut guard) = self.verified.lock() {
            *guard = fingerprint;
        }
    }
}

/// Collaborators of the actor, exposed to the turn loop as its ports.
pub struct ActorPorts {
    context: SessionContext,
    shared: Arc<SessionShared>,
    model: Arc<dyn ModelService>,
    identity: Arc<dyn IdentityVerifier>,
    inbox: Mutex<mpsc::Receiver<SessionCommand>>,
    backlog: Mutex<VecDeque<SessionCommand>>,
}

impl ActorPorts {
    fn db(&self) -> &SessionDb {
        &self.shared.db
    }

    /// Persists `state`, replaces the snapshot and pushes the delta.
    async fn publish_state(&self, state: &SessionState) -> Result<()> {
        let before = self.shared.state();
        self.db().save_state(state).await?;
        self.shared.snapshot.send_replace(state.clone());
        if let Some(delta) = state_delta(&before, state) {
            self.shared.broadcast(ServerEvent::StateDelta(delta));
        }
        Ok(())
    }

    async fn next_command(&self) -> Option<SessionCommand> {
        if let Some(command) = self.backlog.lock().await.pop_front() {
            return Some(command);
        }
        self.inbox.lock().await.recv().await
    }
}

impl ModelGateway for ActorPorts {
    fn stream_model(
        &self,
        request: ModelRequest,
        events: mpsc::Sender<ModelEvent>,
    ) -> PortFuture<'_, ()> {
        self.model.stream(request, events)
    }
}

impl CredentialRefresher for ActorPorts {
    fn refresh_credential<'a>(
        &'a self,
        token: &'a BearerToken,
    ) -> PortFuture<'a, CredentialProfile> {
        Box::pin(async move {
            let identity = self.identity.verify(token).await?;
            if identity.id != self.shared.session_id.value() {
                return Err(SessionError::Forbidden(format!(
                    "credential belongs to {}, not session {}",
                    identity.id, self.shared.session_id
                )));
            }
            let profile = identity.into_profile(token, self.context.now());
            self.db()
                .save_credential(&self.shared.session_id, &profile)
                .await?;
            self.shared
                .set_verified_fingerprint(Some(profile.token_fingerprint.clone()));
            Ok(profile)
        })
    }
}

impl ConfirmationGate for ActorPorts {
    fn await_decision<'a>(&'a self, call_id: &'a CallId) -> PortFuture<'a, ConfirmationOutcome> {
        Box::pin(async move {
            let mut inbox = self.inbox.lock().await;
            let mut viewers = self.shared.viewers.subscribe();
            loop {
                let watched = *viewers.borrow_and_update();
                if watched == 0 {
                    return Ok(ConfirmationOutcome::Abandoned);
                }
                tokio::select! {
                    command = inbox.recv() => match command {
                        None => return Ok(ConfirmationOutcome::Abandoned),
                        Some(SessionCommand::Confirm { call_id: answered, decision, reply }) => {
                            if &answered == call_id {
                                respond(reply, Ok(()));
                                return Ok(ConfirmationOutcome::Decided(decision));
                            }
                            respond(reply, Err(SessionError::Conflict(format!(
                                "call {answered} is not awaiting confirmation"
                            ))));
                        }
                        Some(other) => {
                            debug!(command = other.kind(), "Queued behind pending confirmation");
                            self.backlog.lock().await.push_back(other);
                        }
                    },
                    changed = viewers.changed() => {
                        if changed.is_err() {
                            return Ok(ConfirmationOutcome::Abandoned);
                        }
                    }
                }
            }
        })
    }
}

impl ToolExecutor for ActorPorts {
    fn execute_tool(
        &self,
        state: SessionState,
        mode: Mode,
        proposal: ToolCallProposal,
    ) -> PortFuture<'_, ToolRun> {
        Box::pin(async move {
            let mut ctx = ToolContext::new(state, self.db().clone(), self.context.clone());
            let outcome = ToolCatalog::for_mode(mode)
                .invoke(&mut ctx, &proposal.tool_name, proposal.arguments)
                .await;
            let (state, transitions) = ctx.into_parts();
            Ok(ToolRun {
                state,
                outcome,
                transitions,
            })
        })
    }
}

impl MessageStore for ActorPorts {
    fn save_message<'a>(&'a self, message: &'a ChatMessage) -> PortFuture<'a, ()> {
        Box::pin(async move {
            self.db()
                .append_message(&self.shared.session_id, message)
                .await
                .map(|_position| ())
        })
    }

    fn update_message<'a>(&'a self, message: &'a ChatMessage) -> PortFuture<'a, ()> {
        Box::pin(self.db().update_message(&self.shared.session_id, message))
    }
}

impl StateSink for ActorPorts {
    fn commit_state<'a>(&'a self, state: &'a SessionState) -> PortFuture<'a, ()> {
        Box::pin(self.publish_state(state))
    }
}

impl EventSink for ActorPorts {
    fn emit(&self, event: ServerEvent) -> PortFuture<'_, ()> {
        self.shared.broadcast(event);
        Box::pin(async { Ok(()) })
    }
}

/// Single writer of one session.
pub struct SessionActor {
    turns: TurnService<ActorPorts>,
}

fn respond<T>(reply: Reply<T>, result: Result<T>) {
    if reply.send(result).is_err() {
        debug!("Requester went away before the reply");
    }
}

impl SessionActor {
    pub(crate) fn new(
        context: SessionContext,
        shared: Arc<SessionShared>,
        model: Arc<dyn ModelService>,
        identity: Arc<dyn IdentityVerifier>,
        inbox: mpsc::Receiver<SessionCommand>,
        settings: TurnSettings,
    ) -> Self {
        let ports = ActorPorts {
            context: context.clone(),
            shared,
            model,
            identity,
            inbox: Mutex::new(inbox),
            backlog: Mutex::new(VecDeque::new()),
        };
        Self {
            turns: TurnService::new(ports, context, settings),
        }
    }

    fn ports(&self) -> &ActorPorts {
        self.turns.ports()
    }

    fn now(&self) -> DateTime<Utc> {
        self.turns.context().now()
    }

    pub async fn run(self) {
        info!("Session actor started");
        while let Some(command) = self.ports().next_command().await {
            debug!(command = command.kind(), "Handling command");
            if matches!(command, SessionCommand::Shutdown) {
                break;
            }
            self.handle(command).await;
        }
        info!("Session actor stopped");
    }

    async fn handle(&self, command: SessionCommand) {
        match command {
            SessionCommand::Chat { text, token, reply } => {
                respond(reply, self.chat(text, token).await);
            }
            SessionCommand::Confirm { call_id, reply, .. } => {
                respond(
                    reply,
                    Err(SessionError::Conflict(format!(
                        "call {call_id} is not awaiting confirmation"
                    ))),
                );
            }
            SessionCommand::SetMode {
                target,
                force,
                reply,
            } => respond(reply, self.set_mode(target, force).await),
            SessionCommand::StoreUserInfo { profile, reply } => {
                respond(reply, self.store_credential(profile).await);
            }
            SessionCommand::ClearUserInfo { reply } => {
                respond(reply, self.clear_credential().await);
            }
            SessionCommand::RecordCredential { profile } => {
                if let Err(error) = self.store_credential(profile).await {
                    warn!(%error, "Failed to record verified credential");
                    self.report_error(&error);
                }
            }
            SessionCommand::ClearHistory { reply } => {
                let cleared = self
                    .ports()
                    .db()
                    .clear_messages(&self.ports().shared.session_id)
                    .await;
                if let Ok(count) = &cleared {
                    info!(messages = count, "History cleared");
                }
                respond(reply, cleared);
            }
            SessionCommand::Export { reply } => {
                let state = self.ports().shared.state();
                respond(
                    reply,
                    Ok(export_session(self.ports().db(), &state, self.now()).await),
                );
            }
            SessionCommand::Import {
                document,
                options,
                reply,
            } => respond(reply, self.import(document, options).await),
            SessionCommand::Shutdown => {}
        }
    }

    fn report_error(&self, error: &SessionError) {
        self.ports()
            .shared
            .broadcast(ServerEvent::CommandError(CommandErrorEvent {
                code: error.code().to_string(),
                message: error.to_string(),
            }));
    }

    async fn chat(
        &self,
        text: String,
        token: BearerToken,
    ) -> Result<TurnReport> {
        if text.trim().is_empty() {
            return Err(SessionError::Validation(
                "chat message must not be empty".to_string(),
            ));
        }
        let shared = &self.ports().shared;
        let history = self.ports().db().list_messages(&shared.session_id).await?;
        let (trigger, signal) = cancel_pair();
        if let Ok(mut slot) = shared.cancel.lock() {
            *slot = Some(trigger);
        }

        let report = self
            .turns
            .run(
                TurnRequest {
                    state: shared.state(),
                    history,
                    user_text: text,
                    token,
                },
                signal,
            )
            .await;

        if let Ok(mut slot) = shared.cancel.lock() {
            *slot = None;
        }
        report
    }

    async fn set_mode(&self, target: Mode, force: bool) -> Result<ModeTransition> {
        let mut state = self.ports().shared.state();
        let transition = state.set_mode(target, force, self.now());
        if !transition.is_applied() {
            debug!(mode = %target, "Mode already active");
            return Ok(transition);
        }

        self.ports().publish_state(&state).await?;
        info!(
            from = %transition.from(),
            to = %transition.to(),
            reason = transition.reason().code(),
            "Mode transition applied"
        );
        let text = welcome_notice(target);
        let notice = ChatMessage::notice(target, text, self.now());
        self.ports().save_message(&notice).await?;
        self.ports().shared.broadcast(ServerEvent::Notice(NoticeEvent {
            message_id: notice.id.clone(),
            mode: target,
            text: text.to_string(),
        }));
        Ok(transition)
    }

    async fn store_credential(&self, profile: CredentialProfile) -> Result<SessionState> {
        let shared = &self.ports().shared;
        let mut state = shared.state();
        if state.credential.as_ref() == Some(&profile) {
            return Ok(state);
        }
        self.ports()
            .db()
            .save_credential(&shared.session_id, &profile)
            .await?;
        shared.set_verified_fingerprint(Some(profile.token_fingerprint.clone()));
        state.apply_patch(
            SessionPatch {
                credential: Some(Some(profile)),
                ..SessionPatch::default()
            },
            self.now(),
        )?;
        self.ports().publish_state(&state).await?;
        Ok(state)
    }

    async fn clear_credential(&self) -> Result<SessionState> {
        let shared = &self.ports().shared;
        let mut state = shared.state();
        self.ports().db().clear_credential(&shared.session_id).await?;
        shared.set_verified_fingerprint(None);
        state.apply_patch(
            SessionPatch {
                credential: Some(None),
                ..SessionPatch::default()
            },
            self.now(),
        )?;
        self.ports().publish_state(&state).await?;
        Ok(state)
    }

    async fn import(
        &self,
        document: Value,
        options: ImportOptions,
    ) -> Result<ImportReport> {
        let shared = &self.ports().shared;
        let report = import_session(
            self.ports().db(),
            self.ports(),
            &shared.session_id,
            document,
            options,
            self.now(),
        )
        .await?;
        shared.set_verified_fingerprint(
            self.ports()
                .db()
                .load_credential(&shared.session_id)
                .await?
                .map(|profile| profile.token_fingerprint),
        );
        shared.broadcast(ServerEvent::ImportComplete(report.clone()));
        Ok(report)
    }
}
