use super::actor::{SessionActor, SessionShared};
use super::handle::{verify_owner, SessionHandle};
use crate::context::{Clock, SessionContext};
use crate::db::SessionDb;
use crate::error::{Result, SessionError};
use crate::identity::{BearerToken, IdentityVerifier};
use crate::llm::ModelService;
use crate::orchestrator_service::TurnSettings;
use crate::types::SessionId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub turn: TurnSettings,
    pub command_queue_depth: usize,
    pub event_buffer: usize,
}

impl SessionSettings {
    pub const DEFAULT_COMMAND_QUEUE_DEPTH: usize = 64;
    pub const DEFAULT_EVENT_BUFFER: usize = 256;
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            turn: TurnSettings::default(),
            command_queue_depth: Self::DEFAULT_COMMAND_QUEUE_DEPTH,
            event_buffer: Self::DEFAULT_EVENT_BUFFER,
        }
    }
}

/// Shared collaborators every session actor is built from.
#[derive(Clone)]
pub struct SessionDeps {
    pub db: SessionDb,
    pub model: Arc<dyn ModelService>,
    pub identity: Arc<dyn IdentityVerifier>,
    pub clock: Arc<dyn Clock>,
    pub settings: SessionSettings,
}

fn ensure_well_formed(session_id: &SessionId) -> Result<()> {
    if session_id.is_well_formed() {
        Ok(())
    } else {
        Err(SessionError::Validation(format!(
            "malformed session id `{session_id}`"
        )))
    }
}

/// One actor per session id, spawned on first contact.
pub struct SessionRegistry {
    deps: SessionDeps,
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(deps: SessionDeps) -> Self {
        Self {
            deps,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub const fn db(&self) -> &SessionDb {
        &self.deps.db
    }

    /// Session for a request carrying `token`. A running session is returned
    /// as is and authenticates the token itself; a session that is not
    /// running is only spawned once `token` is verified as its owner.
    ///
    /// # Errors
    /// Returns a validation error for a malformed id, `Unauthorized` or
    /// `Forbidden` for a credential that does not own the session, or the
    /// failure to load or create it.
    pub async fn open(&self, session_id: &SessionId, token: &BearerToken) -> Result<SessionHandle> {
        ensure_well_formed(session_id)?;
        if let Some(handle) = self.running(session_id).await {
            return Ok(handle);
        }

        let profile = verify_owner(
            self.deps.identity.as_ref(),
            self.deps.clock.as_ref(),
            session_id,
            token,
        )
        .await?;
        let handle = self.get_or_spawn(session_id).await?;
        handle.record_verified(profile).await;
        Ok(handle)
    }

    async fn running(&self, session_id: &SessionId) -> Option<SessionHandle> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .filter(|handle| !handle.is_closed())
            .cloned()
    }

    /// # Errors
    /// Returns a validation error for a malformed id, or the failure to load
    /// or create the session.
    pub async fn get_or_spawn(&self, session_id: &SessionId) -> Result<SessionHandle> {
        ensure_well_formed(session_id)?;

        let mut sessions = self.sessions.lock().await;
        if let Some(handle) = sessions.get(session_id) {
            if !handle.is_closed() {
                return Ok(handle.clone());
            }
        }

        let before = sessions.len();
        sessions.retain(|_, handle| !handle.is_closed());
        if sessions.len() < before {
            debug!(evicted = before - sessions.len(), "Dropped stopped sessions");
        }

        let handle = self.spawn(session_id).await?;
        sessions.insert(session_id.clone(), handle.clone());
        Ok(handle)
    }

    async fn spawn(&self, session_id: &SessionId) -> Result<SessionHandle> {
        let deps = &self.deps;
        let context = SessionContext::new(session_id.clone(), Arc::clone(&deps.clock));
        let state = deps.db.load_or_create_state(session_id, context.now()).await?;
        let verified = deps
            .db
            .load_credential(session_id)
            .await?
            .map(|profile| profile.token_fingerprint);

        let shared = Arc::new(SessionShared::new(
            session_id.clone(),
            deps.db.clone(),
            state,
            deps.settings.event_buffer,
            verified,
        ));
        let (commands, inbox) = mpsc::channel(deps.settings.command_queue_depth.max(1));
        let span = context.span();
        let actor = SessionActor::new(
            context,
            Arc::clone(&shared),
            Arc::clone(&deps.model),
            Arc::clone(&deps.identity),
            inbox,
            deps.settings.turn,
        );
        tokio::spawn(actor.run().instrument(span));
        info!(%session_id, "Session spawned");

        Ok(SessionHandle::new(
            commands,
            shared,
            Arc::clone(&deps.identity),
            Arc::clone(&deps.clock),
        ))
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    pub async fn shutdown_all(&self) {
        let sessions: Vec<SessionHandle> = self
            .sessions
            .lock()
            .await
            .drain()
            .map(|(_, handle)| handle)
            .collect();
        for handle in sessions {
            handle.shutdown().await;
        }
    }
}
