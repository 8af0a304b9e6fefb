use super::mappers::to_db_time;
use super::SessionDb;
use crate::canonical_schema::STATE_SCHEMA_VERSION;
use crate::error::{Result, SessionError};
use crate::orchestrator_service::{PortFuture, StateSink};
use crate::types::{SessionId, SessionState};
use chrono::{DateTime, Utc};

impl SessionDb {
    /// # Errors
    /// Returns an error if the query fails or the stored blob does not parse.
    pub async fn load_state(&self, session_id: &SessionId) -> Result<Option<SessionState>> {
        let stored = sqlx::query_scalar::<_, String>(
            "SELECT state_json FROM session_state WHERE session_id = ?1",
        )
        .bind(session_id.value())
        .fetch_optional(self.pool())
        .await
        .map_err(|e| SessionError::DatabaseError(format!("Failed to load session state: {e}")))?;

        stored
            .map(|json| {
                serde_json::from_str::<SessionState>(&json).map_err(|e| {
                    SessionError::DatabaseError(format!(
                        "Stored state for session {session_id} is unreadable: {e}"
                    ))
                })
            })
            .transpose()
    }

    /// # Errors
    /// Returns an error if serialization or the upsert fails.
    pub async fn save_state(&self, state: &SessionState) -> Result<()> {
        let state_json = serde_json::to_string(state)?;
        sqlx::query(
            "INSERT INTO session_state (session_id, state_json, schema_version, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(session_id) DO UPDATE SET
                state_json = excluded.state_json,
                schema_version = excluded.schema_version,
                updated_at = excluded.updated_at",
        )
        .bind(state.session_id.value())
        .bind(state_json)
        .bind(STATE_SCHEMA_VERSION)
        .bind(to_db_time(state.updated_at))
        .execute(self.pool())
        .await
        .map(|_result| ())
        .map_err(|e| SessionError::DatabaseError(format!("Failed to save session state: {e}")))
    }

    /// Loads the session, normalizing whatever was stored, or creates it with
    /// defaults on first contact.
    ///
    /// # Errors
    /// Returns an error if loading or the initial save fails.
    pub async fn load_or_create_state(
        &self,
        session_id: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<SessionState> {
        if let Some(stored) = self.load_state(session_id).await? {
            return Ok(stored.normalize(session_id, now));
        }
        let state = SessionState::new(session_id.clone(), now).normalize(session_id, now);
        self.save_state(&state).await?;
        Ok(state)
    }
}

/// Plain persistence without any viewer fan-out, for offline callers.
impl StateSink for SessionDb {
    fn commit_state<'a>(&'a self, state: &'a SessionState) -> PortFuture<'a, ()> {
        Box::pin(self.save_state(state))
    }
}
