use super::mappers::{from_db_time, to_db_time};
use super::SessionDb;
use crate::error::{Result, SessionError};
use crate::types::{ChatMessage, MessageId, MessagePart, Role, SessionId};

type MessageRow = (String, String, String, String);

fn message_from_row((id, role, content_json, created_at): MessageRow) -> Result<ChatMessage> {
    let role = Role::try_from(role.as_str()).map_err(SessionError::DatabaseError)?;
    let parts = serde_json::from_str::<Vec<MessagePart>>(&content_json).map_err(|e| {
        SessionError::DatabaseError(format!("Stored message {id} is unreadable: {e}"))
    })?;
    Ok(ChatMessage {
        id: MessageId::new(id),
        role,
        parts,
        created_at: from_db_time("messages.created_at", &created_at)?,
    })
}

impl SessionDb {
    /// Appends `message` at the end of the session history.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn append_message(&self, session_id: &SessionId, message: &ChatMessage) -> Result<i64> {
        let position = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(MAX(position), -1) + 1 FROM messages WHERE session_id = ?1",
        )
        .bind(session_id.value())
        .fetch_one(self.pool())
        .await
        .map_err(|e| SessionError::DatabaseError(format!("Failed to read history length: {e}")))?;

        sqlx::query(
            "INSERT INTO messages (id, session_id, position, role, content_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(message.id.value())
        .bind(session_id.value())
        .bind(position)
        .bind(message.role.as_str())
        .bind(serde_json::to_string(&message.parts)?)
        .bind(to_db_time(message.created_at))
        .execute(self.pool())
        .await
        .map_err(|e| SessionError::DatabaseError(format!("Failed to append message: {e}")))?;

        Ok(position)
    }

    /// Rewrites the parts of an already stored message in place, keeping its
    /// position.
    ///
    /// # Errors
    /// Returns `NotFound` if the message does not belong to the session.
    pub async fn update_message(&self, session_id: &SessionId, message: &ChatMessage) -> Result<()> {
        let result = sqlx::query(
            "UPDATE messages SET content_json = ?1 WHERE id = ?2 AND session_id = ?3",
        )
        .bind(serde_json::to_string(&message.parts)?)
        .bind(message.id.value())
        .bind(session_id.value())
        .execute(self.pool())
        .await
        .map_err(|e| SessionError::DatabaseError(format!("Failed to update message: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(SessionError::NotFound(format!(
                "message {} in session {session_id}",
                message.id
            )));
        }
        Ok(())
    }

    /// # Errors
    /// Returns an error if the query fails or a stored row is unreadable.
    pub async fn list_messages(&self, session_id: &SessionId) -> Result<Vec<ChatMessage>> {
        sqlx::query_as::<_, MessageRow>(
            "SELECT id, role, content_json, created_at
             FROM messages
             WHERE session_id = ?1
             ORDER BY position ASC",
        )
        .bind(session_id.value())
        .fetch_all(self.pool())
        .await
        .map_err(|e| SessionError::DatabaseError(format!("Failed to list messages: {e}")))?
        .into_iter()
        .map(message_from_row)
        .collect()
    }

    /// # Errors
    /// Returns an error if the delete fails.
    pub async fn clear_messages(&self, session_id: &SessionId) -> Result<u64> {
        sqlx::query("DELETE FROM messages WHERE session_id = ?1")
            .bind(session_id.value())
            .execute(self.pool())
            .await
            .map(|result| result.rows_affected())
            .map_err(|e| SessionError::DatabaseError(format!("Failed to clear messages: {e}")))
    }
}
