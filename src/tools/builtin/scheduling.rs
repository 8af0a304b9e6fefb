use crate::tools::{parse_args, Tool, ToolContext, ToolError, ToolFuture, ToolName};
use crate::types::{ScheduledTask, TaskId, TaskStatus};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ScheduleTaskArgs {
    description: String,
    run_at: DateTime<Utc>,
    #[serde(default)]
    payload: Value,
}

pub struct ScheduleTask;

impl Tool for ScheduleTask {
    fn name(&self) -> ToolName {
        ToolName::ScheduleTask
    }

    fn description(&self) -> &'static str {
        "Record a follow-up for a later time (RFC 3339 timestamp)."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "description": { "type": "string" },
                "runAt": { "type": "string", "format": "date-time" },
                "payload": { "type": "object" }
            },
            "required": ["description", "runAt"],
            "additionalProperties": false
        })
    }

    fn execute<'a>(&'a self, ctx: &'a mut ToolContext, args: Value) -> ToolFuture<'a> {
        Box::pin(async move {
            let args: ScheduleTaskArgs = parse_args(args)?;
            if args.description.trim().is_empty() {
                return Err(ToolError::InvalidArguments(
                    "description must not be empty".to_string(),
                ));
            }
            let now = ctx.now();
            if args.run_at <= now {
                return Err(ToolError::InvalidArguments(format!(
                    "runAt {} is not in the future",
                    args.run_at.to_rfc3339()
                )));
            }

            let task = ScheduledTask {
                id: TaskId::generate(),
                session_id: ctx.session_id().clone(),
                description: args.description,
                payload: if args.payload.is_null() {
                    json!({})
                } else {
                    args.payload
                },
                run_at: args.run_at,
                status: TaskStatus::Pending,
                created_at: now,
            };
            ctx.db().insert_task(&task).await?;
            Ok(json!({ "task": task }))
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ListTasksArgs {
    #[serde(default)]
    include_cancelled: bool,
}

pub struct ListScheduledTasks;

impl Tool for ListScheduledTasks {
    fn name(&self) -> ToolName {
        ToolName::ListScheduledTasks
    }

    fn description(&self) -> &'static str {
        "List recorded follow-ups, soonest first."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "includeCancelled": { "type": "boolean" } },
            "additionalProperties": false
        })
    }

    fn execute<'a>(&'a self, ctx: &'a mut ToolContext, args: Value) -> ToolFuture<'a> {
        Box::pin(async move {
            let ListTasksArgs { include_cancelled } = parse_args(args)?;
            let tasks = ctx
                .db()
                .list_tasks(ctx.session_id())
                .await?
                .into_iter()
                .filter(|task| include_cancelled || task.status == TaskStatus::Pending)
                .collect::<Vec<_>>();
            Ok(json!({ "tasks": tasks }))
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CancelTaskArgs {
    task_id: TaskId,
}

pub struct CancelScheduledTask;

impl Tool for CancelScheduledTask {
    fn name(&self) -> ToolName {
        ToolName::CancelScheduledTask
    }

    fn description(&self) -> &'static str {
        "Cancel a recorded follow-up. Requires the user's approval."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "taskId": { "type": "string" } },
            "required": ["taskId"],
            "additionalProperties": false
        })
    }

    fn execute<'a>(&'a self, ctx: &'a mut ToolContext, args: Value) -> ToolFuture<'a> {
        Box::pin(async move {
            let CancelTaskArgs { task_id } = parse_args(args)?;
            let task = ctx
                .db()
                .cancel_task(ctx.session_id(), &task_id)
                .await?
                .ok_or_else(|| ToolError::NotFound(format!("task {task_id}")))?;
            Ok(json!({ "task": task }))
        })
    }
}
