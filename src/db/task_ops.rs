use super::mappers::{from_db_time, to_db_time};
use super::SessionDb;
use crate::error::{Result, SessionError};
use crate::types::{ScheduledTask, SessionId, TaskId, TaskStatus};

type TaskRow = (String, String, String, String, String, String, String);

fn task_from_row(
    (id, session_id, description, payload_json, run_at, status, created_at): TaskRow,
) -> Result<ScheduledTask> {
    Ok(ScheduledTask {
        payload: serde_json::from_str(&payload_json).map_err(|e| {
            SessionError::DatabaseError(format!("Stored task {id} payload is unreadable: {e}"))
        })?,
        id: TaskId::new(id),
        session_id: SessionId::new(session_id),
        description,
        run_at: from_db_time("scheduled_tasks.run_at", &run_at)?,
        status: TaskStatus::try_from(status.as_str()).map_err(SessionError::DatabaseError)?,
        created_at: from_db_time("scheduled_tasks.created_at", &created_at)?,
    })
}

const TASK_COLUMNS: &str = "id, session_id, description, payload_json, run_at, status, created_at";

impl SessionDb {
    /// # Errors
    /// Returns an error if the insert fails.
    pub async fn insert_task(&self, task: &ScheduledTask) -> Result<()> {
        sqlx::query(
            "INSERT INTO scheduled_tasks
                (id, session_id, description, payload_json, run_at, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(task.id.value())
        .bind(task.session_id.value())
        .bind(&task.description)
        .bind(serde_json::to_string(&task.payload)?)
        .bind(to_db_time(task.run_at))
        .bind(task.status.as_str())
        .bind(to_db_time(task.created_at))
        .execute(self.pool())
        .await
        .map(|_result| ())
        .map_err(|e| SessionError::DatabaseError(format!("Failed to schedule task: {e}")))
    }

    /// Tasks for the session ordered by due time.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_tasks(&self, session_id: &SessionId) -> Result<Vec<ScheduledTask>> {
        sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM scheduled_tasks WHERE session_id = ?1 ORDER BY run_at ASC, id ASC"
        ))
        .bind(session_id.value())
        .fetch_all(self.pool())
        .await
        .map_err(|e| SessionError::DatabaseError(format!("Failed to list tasks: {e}")))?
        .into_iter()
        .map(task_from_row)
        .collect()
    }

    /// # Errors
    /// Returns an error if the query fails.
    pub async fn get_task(
        &self,
        session_id: &SessionId,
        task_id: &TaskId,
    ) -> Result<Option<ScheduledTask>> {
        sqlx::query_as::<_, TaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM scheduled_tasks WHERE session_id = ?1 AND id = ?2"
        ))
        .bind(session_id.value())
        .bind(task_id.value())
        .fetch_optional(self.pool())
        .await
        .map_err(|e| SessionError::DatabaseError(format!("Failed to load task: {e}")))?
        .map(task_from_row)
        .transpose()
    }

    /// Marks a pending task cancelled. Returns the updated task, or `None` when
    /// the session has no such task.
    ///
    /// # Errors
    /// Returns `Conflict` if the task was already cancelled.
    pub async fn cancel_task(
        &self,
        session_id: &SessionId,
        task_id: &TaskId,
    ) -> Result<Option<ScheduledTask>> {
        let Some(mut task) = self.get_task(session_id, task_id).await? else {
            return Ok(None);
        };
        if task.status == TaskStatus::Cancelled {
            return Err(SessionError::Conflict(format!(
                "task {task_id} is already cancelled"
            )));
        }

        sqlx::query("UPDATE scheduled_tasks SET status = ?1 WHERE session_id = ?2 AND id = ?3")
            .bind(TaskStatus::Cancelled.as_str())
            .bind(session_id.value())
            .bind(task_id.value())
            .execute(self.pool())
            .await
            .map_err(|e| SessionError::DatabaseError(format!("Failed to cancel task: {e}")))?;

        task.status = TaskStatus::Cancelled;
        Ok(Some(task))
    }
}
