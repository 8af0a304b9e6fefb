use super::mappers::{from_db_time, to_db_time};
use super::SessionDb;
use crate::error::{Result, SessionError};
use crate::types::{CredentialProfile, SessionId};

type CredentialRow = (String, String, f64, Option<String>, String, String);

impl SessionDb {
    /// # Errors
    /// Returns an error if the upsert fails.
    pub async fn save_credential(
        &self,
        session_id: &SessionId,
        profile: &CredentialProfile,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO credential_cache
                (session_id, user_id, email, credits, payment_method, token_fingerprint, verified_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(session_id) DO UPDATE SET
                user_id = excluded.user_id,
                email = excluded.email,
                credits = excluded.credits,
                payment_method = excluded.payment_method,
                token_fingerprint = excluded.token_fingerprint,
                verified_at = excluded.verified_at",
        )
        .bind(session_id.value())
        .bind(&profile.user_id)
        .bind(&profile.email)
        .bind(profile.credits)
        .bind(profile.payment_method.as_deref())
        .bind(&profile.token_fingerprint)
        .bind(to_db_time(profile.verified_at))
        .execute(self.pool())
        .await
        .map(|_result| ())
        .map_err(|e| SessionError::DatabaseError(format!("Failed to cache credential: {e}")))
    }

    /// # Errors
    /// Returns an error if the query fails.
    pub async fn load_credential(&self, session_id: &SessionId) -> Result<Option<CredentialProfile>> {
        sqlx::query_as::<_, CredentialRow>(
            "SELECT user_id, email, credits, payment_method, token_fingerprint, verified_at
             FROM credential_cache WHERE session_id = ?1",
        )
        .bind(session_id.value())
        .fetch_optional(self.pool())
        .await
        .map_err(|e| SessionError::DatabaseError(format!("Failed to load credential: {e}")))?
        .map(
            |(user_id, email, credits, payment_method, token_fingerprint, verified_at)|
             -> Result<CredentialProfile> {
                Ok(CredentialProfile {
                    user_id,
                    email,
                    credits,
                    payment_method,
                    token_fingerprint,
                    verified_at: from_db_time("credential_cache.verified_at", &verified_at)?,
                })
            },
        )
        .transpose()
    }

    /// # Errors
    /// Returns an error if the delete fails.
    pub async fn clear_credential(&self, session_id: &SessionId) -> Result<()> {
        sqlx::query("DELETE FROM credential_cache WHERE session_id = ?1")
            .bind(session_id.value())
            .execute(self.pool())
            .await
            .map(|_result| ())
            .map_err(|e| SessionError::DatabaseError(format!("Failed to clear credential: {e}")))
    }
}
