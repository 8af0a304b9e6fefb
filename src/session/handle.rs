use super::actor::SessionShared;
use super::commands::{Reply, SessionCommand};
use super::events::ServerEvent;
use crate::context::Clock;
use crate::domain::ModeTransition;
use crate::error::{Result, SessionError};
use crate::identity::{BearerToken, IdentityVerifier};
use crate::orchestrator_service::TurnReport;
use crate::tools::ConfirmationDecision;
use crate::transfer::{ExportDocument, ImportOptions, ImportReport};
use crate::types::{CallId, ChatMessage, CredentialProfile, Mode, SessionId, SessionState};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info};

/// Resolves `token` and checks that its principal owns `session_id`.
pub(crate) async fn verify_owner(
    identity: &dyn IdentityVerifier,
    clock: &dyn Clock,
    session_id: &SessionId,
    token: &BearerToken,
) -> Result<CredentialProfile> {
    let principal = identity.verify(token).await?;
    if principal.id != session_id.value() {
        return Err(SessionError::Forbidden(format!(
            "credential does not own session {session_id}"
        )));
    }
    Ok(principal.into_profile(token, clock.now()))
}

/// Cheap, cloneable client of one session actor.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    shared: Arc<SessionShared>,
    identity: Arc<dyn IdentityVerifier>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session_id", &self.shared.session_id)
            .finish_non_exhaustive()
    }
}

/// Counts as one connected viewer while alive.
#[derive(Debug)]
pub struct ViewerGuard {
    shared: Arc<SessionShared>,
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        self.shared
            .viewers
            .send_modify(|count| *count = count.saturating_sub(1));
    }
}

impl SessionHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<SessionCommand>,
        shared: Arc<SessionShared>,
        identity: Arc<dyn IdentityVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            commands,
            shared,
            identity,
            clock,
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.shared.session_id
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Latest committed state. Never waits for a running turn.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.shared.events.subscribe()
    }

    #[must_use]
    pub fn viewer(&self) -> ViewerGuard {
        self.shared.viewers.send_modify(|count| *count += 1);
        ViewerGuard {
            shared: Arc::clone(&self.shared),
        }
    }

    #[must_use]
    pub fn viewer_count(&self) -> usize {
        *self.shared.viewers.borrow()
    }

    /// # Errors
    /// Returns an error if the history cannot be read.
    pub async fn messages(&self) -> Result<Vec<ChatMessage>> {
        self.shared.db.list_messages(&self.shared.session_id).await
    }

    async fn verify(&self, token: &BearerToken) -> Result<CredentialProfile> {
        verify_owner(
            self.identity.as_ref(),
            self.clock.as_ref(),
            &self.shared.session_id,
            token,
        )
        .await
    }

    /// Checks that `token` belongs to this session's principal. Only a token
    /// whose fingerprint differs from the cached one reaches the verifier.
    ///
    /// # Errors
    /// Returns `Unauthorized` for a rejected token and `Forbidden` when the
    /// token belongs to another principal.
    pub async fn authenticate(&self, token: &BearerToken) -> Result<()> {
        let fingerprint = token.fingerprint();
        if self.shared.verified_fingerprint().as_deref() == Some(fingerprint.as_str()) {
            return Ok(());
        }

        info!(session_id = %self.shared.session_id, "Credential mismatch; verifying");
        let profile = self.verify(token).await?;
        self.record_verified(profile).await;
        Ok(())
    }

    /// Caches the fingerprint of a credential checked by `verify_owner`.
    pub(crate) async fn record_verified(&self, profile: CredentialProfile) {
        self.shared
            .set_verified_fingerprint(Some(profile.token_fingerprint.clone()));
        if self
            .commands
            .send(SessionCommand::RecordCredential { profile })
            .await
            .is_err()
        {
            debug!("Session actor stopped before recording the credential");
        }
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> SessionCommand) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| SessionError::Internal("session actor is not running".to_string()))?;
        response
            .await
            .map_err(|_| SessionError::Internal("session actor dropped the request".to_string()))?
    }

    /// Runs one turn and waits for it to settle.
    ///
    /// # Errors
    /// Returns a validation error for empty input, or an actor failure.
    pub async fn chat(&self, text: impl Into<String>, token: BearerToken) -> Result<TurnReport> {
        let text = text.into();
        self.request(|reply| SessionCommand::Chat { text, token, reply })
            .await
    }

    /// # Errors
    /// Returns `Conflict` when the call is not awaiting confirmation.
    pub async fn confirm(&self, call_id: CallId, decision: ConfirmationDecision) -> Result<()> {
        self.request(|reply| SessionCommand::Confirm {
            call_id,
            decision,
            reply,
        })
        .await
    }

    /// # Errors
    /// Returns an error if the new state cannot be persisted.
    pub async fn set_mode(&self, target: Mode, force: bool) -> Result<ModeTransition> {
        self.request(|reply| SessionCommand::SetMode {
            target,
            force,
            reply,
        })
        .await
    }

    /// Verifies `token` afresh and caches the resulting profile.
    ///
    /// # Errors
    /// Returns the verification failure or a persistence error.
    pub async fn store_user_info(&self, token: &BearerToken) -> Result<SessionState> {
        let profile = self.verify(token).await?;
        self.request(|reply| SessionCommand::StoreUserInfo { profile, reply })
            .await
    }

    /// # Errors
    /// Returns an error if the credential cannot be removed.
    pub async fn clear_user_info(&self) -> Result<SessionState> {
        self.request(|reply| SessionCommand::ClearUserInfo { reply })
            .await
    }

    /// # Errors
    /// Returns an error if the history cannot be removed.
    pub async fn clear_history(&self) -> Result<u64> {
        self.request(|reply| SessionCommand::ClearHistory { reply })
            .await
    }

    /// # Errors
    /// Returns an error only if the actor is gone.
    pub async fn export(&self) -> Result<ExportDocument> {
        self.request(|reply| SessionCommand::Export { reply }).await
    }

    /// # Errors
    /// Returns a validation error for a malformed document.
    pub async fn import(&self, document: Value, options: ImportOptions) -> Result<ImportReport> {
        self.request(|reply| SessionCommand::Import {
            document,
            options,
            reply,
        })
        .await
    }

    /// Raises the abort flag of the running turn. Returns whether one was running.
    #[must_use]
    pub fn cancel(&self) -> bool {
        self.shared
            .cancel
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|trigger| trigger.cancel()))
            .is_some()
    }

    pub async fn shutdown(&self) {
        if self.commands.send(SessionCommand::Shutdown).await.is_err() {
            debug!("Session actor already stopped");
        }
    }
}
